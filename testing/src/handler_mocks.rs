//! Handler doubles for router tests.
//!
//! - [`RecordingHandler`]: succeeds and remembers every envelope
//! - [`FailingHandler`]: fails every attempt with a fixed error
//! - [`FlakyHandler`]: fails a fixed number of times, then succeeds
//! - [`PanickingHandler`]: panics on every attempt

#![allow(clippy::missing_panics_doc)]

use orderbus_core::envelope::Envelope;
use orderbus_core::handler::{EventHandler, HandlerError, HandlerFuture};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Succeeds and records every envelope it sees.
#[derive(Debug)]
pub struct RecordingHandler {
    name: String,
    delay: Option<Duration>,
    seen: Mutex<Vec<Envelope>>,
}

impl RecordingHandler {
    /// Create a handler with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `delay` before succeeding.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of invocations.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Envelopes received, in order.
    #[must_use]
    pub fn seen(&self) -> Vec<Envelope> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(&'a self, envelope: &'a Envelope) -> HandlerFuture<'a> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(envelope.clone());
            Ok(())
        })
    }
}

/// Fails every attempt with the same error.
#[derive(Debug)]
pub struct FailingHandler {
    name: String,
    error: HandlerError,
    attempts: AtomicU32,
}

impl FailingHandler {
    /// Fail with `error` on every attempt.
    #[must_use]
    pub fn new(name: impl Into<String>, error: HandlerError) -> Self {
        Self {
            name: name.into(),
            error,
            attempts: AtomicU32::new(0),
        }
    }

    /// Fail with a retryable store error.
    #[must_use]
    pub fn transient(name: impl Into<String>) -> Self {
        Self::new(name, HandlerError::TransientStore("store offline".into()))
    }

    /// Number of invocations.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventHandler for FailingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(&'a self, _envelope: &'a Envelope) -> HandlerFuture<'a> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let error = self.error.clone();
        Box::pin(async move { Err(error) })
    }
}

/// Fails with a retryable error `failures` times, then succeeds.
#[derive(Debug)]
pub struct FlakyHandler {
    name: String,
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyHandler {
    /// Fail the first `failures` attempts.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    /// Number of invocations.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventHandler for FlakyHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle<'a>(&'a self, _envelope: &'a Envelope) -> HandlerFuture<'a> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fail = attempt <= self.failures;
        Box::pin(async move {
            if fail {
                Err(HandlerError::TransientStore(format!("attempt {attempt} failed")))
            } else {
                Ok(())
            }
        })
    }
}

/// Panics on every attempt.
#[derive(Debug)]
pub struct PanickingHandler {
    name: String,
}

impl PanickingHandler {
    /// Create a handler with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl EventHandler for PanickingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::panic)]
    fn handle<'a>(&'a self, _envelope: &'a Envelope) -> HandlerFuture<'a> {
        panic!("handler {} blew up", self.name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flaky_handler_recovers() {
        let handler = FlakyHandler::new("flaky", 1);
        let envelope = Envelope::builder().build();

        assert!(handler.handle(&envelope).await.is_err());
        assert!(handler.handle(&envelope).await.is_ok());
        assert_eq!(handler.attempts(), 2);
    }

    #[tokio::test]
    async fn failing_handler_counts_attempts() {
        let handler = FailingHandler::transient("down");
        let envelope = Envelope::builder().build();

        let err = handler.handle(&envelope).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(handler.attempts(), 1);
    }
}
