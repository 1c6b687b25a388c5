//! Axum integration for orderbus.
//!
//! This crate holds the HTTP plumbing every orderbus service shares; the
//! service crate owns its routes and state.
//!
//! # Request Flow
//!
//! ```text
//! request ─▶ correlation_id_layer ─▶ handler ─┬─▶ Ok(Json(..))
//!            (X-Correlation-ID,               └─▶ Err(AppError) ─▶ {code, message}
//!             http_request span)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use orderbus_web::{correlation_id_layer, handlers, AppError};
//! use axum::{Router, routing::get};
//!
//! let app = Router::new()
//!     .route("/health", get(handlers::health_check))
//!     .route("/health/ready", get(handlers::readiness_check))
//!     .layer(correlation_id_layer())
//!     .with_state(router);
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::CorrelationId;
pub use middleware::{correlation_id_layer, CorrelationIdExt, CORRELATION_ID_HEADER};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
