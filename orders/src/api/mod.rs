//! HTTP handlers.
//!
//! - [`ingest`]: the single write endpoint, fire-and-forget into the router
//! - [`orders`]: read side over the projection store
//! - [`dead_letters`]: inspection of abandoned dispatches

pub mod dead_letters;
pub mod ingest;
pub mod orders;
