//! HTTP request handlers shared by orderbus services.

pub mod health;

// Re-export common handler utilities
pub use health::{health_check, readiness_check};
