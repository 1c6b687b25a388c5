//! Configuration management for the order service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! A `.env` file is honoured by the binary (via `dotenvy`) before this runs.

use orderbus_runtime::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration that parsed but cannot be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its allowed range
    #[error("Invalid value for {name}: {reason}")]
    Invalid {
        /// Environment variable name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Host and port do not form a socket address
    #[error("Invalid address {0}")]
    Address(String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Envelope stamping and routing configuration
    pub events: EventConfig,
    /// Per-target retry and dead letter configuration
    pub retry: RetryConfig,
    /// Projection store configuration
    pub store: StoreConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log filter (trace, debug, info, warn, error, or a full directive)
    pub log_level: String,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// How ingress stamps envelopes and which region the audit rule watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Bus name, used as the envelope detail type
    pub bus_name: String,
    /// Producer identifier stamped on ingress envelopes
    pub source: String,
    /// Region stamped on ingress envelopes
    pub region: String,
    /// Region the audit rule matches
    pub audit_region: String,
}

/// Retry and dead letter configuration shared by every target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per dispatch, including the first
    pub max_attempts: u32,
    /// Envelopes older than this many seconds are abandoned
    pub max_event_age_secs: u64,
    /// Backoff before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff ceiling, in milliseconds
    pub max_delay_ms: u64,
    /// Dead letter queue capacity
    pub dlq_max_size: usize,
}

/// Projection store configuration.
///
/// Without a `DATABASE_URL` the service keeps orders in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Order table name
    pub table_name: String,
    /// `PostgreSQL` connection URL
    pub database_url: Option<String>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unparseable numeric values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let string = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Self {
            server: ServerConfig {
                host: string("HOST", "0.0.0.0"),
                port: parsed(&lookup, "PORT", 8080),
                log_level: string("RUST_LOG", "info"),
                metrics_host: string("METRICS_HOST", "0.0.0.0"),
                metrics_port: parsed(&lookup, "METRICS_PORT", 9090),
                shutdown_timeout: parsed(&lookup, "SHUTDOWN_TIMEOUT", 30),
            },
            events: EventConfig {
                bus_name: string("EVENT_BUS_NAME", "event_sourcing_eventbridge"),
                source: string("EVENT_SOURCE", "WebApp"),
                region: string("EVENT_REGION", "ap-southeast-2"),
                audit_region: string("AUDIT_REGION", "ap-southeast-2"),
            },
            retry: RetryConfig {
                max_attempts: parsed(&lookup, "RETRY_MAX_ATTEMPTS", 3),
                max_event_age_secs: parsed(&lookup, "RETRY_MAX_EVENT_AGE_SECS", 7200),
                initial_delay_ms: parsed(&lookup, "RETRY_INITIAL_DELAY_MS", 100),
                max_delay_ms: parsed(&lookup, "RETRY_MAX_DELAY_MS", 30_000),
                dlq_max_size: parsed(&lookup, "DLQ_MAX_SIZE", 1000),
            },
            store: StoreConfig {
                table_name: string("TABLE_NAME", "orders"),
                database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
                max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10),
            },
        }
    }

    /// Reject values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for zero attempts, a zero-sized dead letter
    /// queue, a backoff ceiling below the initial delay, or an unusable
    /// bind address.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "RETRY_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.dlq_max_size == 0 {
            return Err(ConfigError::Invalid {
                name: "DLQ_MAX_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(ConfigError::Invalid {
                name: "RETRY_MAX_DELAY_MS",
                reason: format!(
                    "{} is below RETRY_INITIAL_DELAY_MS {}",
                    self.retry.max_delay_ms, self.retry.initial_delay_ms
                ),
            });
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "DATABASE_MAX_CONNECTIONS",
                reason: "must be at least 1".to_string(),
            });
        }
        self.server_addr()?;
        self.metrics_addr()?;
        Ok(())
    }

    /// Address the HTTP server binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Address`] if host and port don't parse.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.server.host, self.server.port)
    }

    /// Address the Prometheus scrape endpoint binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Address`] if host and port don't parse.
    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        socket_addr(&self.server.metrics_host, self.server.metrics_port)
    }

    /// Graceful shutdown budget.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    /// Retry policy applied to every business target.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.retry.max_attempts)
            .max_event_age(Duration::from_secs(self.retry.max_event_age_secs))
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .build()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    lookup(name)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    format!("{host}:{port}")
        .parse()
        .map_err(|_| ConfigError::Address(format!("{host}:{port}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_match_deployment() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.events.bus_name, "event_sourcing_eventbridge");
        assert_eq!(config.events.source, "WebApp");
        assert_eq!(config.events.audit_region, "ap-southeast-2");
        assert_eq!(config.retry.max_event_age_secs, 7200);
        assert_eq!(config.store.table_name, "orders");
        assert!(config.store.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "3000"),
            ("RETRY_MAX_ATTEMPTS", "2"),
            ("AUDIT_REGION", "us-east-1"),
            ("DATABASE_URL", "postgres://localhost/orders"),
        ]));
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.events.audit_region, "us-east-1");
        assert_eq!(
            config.store.database_url.as_deref(),
            Some("postgres://localhost/orders")
        );
        assert_eq!(config.retry_policy().max_attempts(), 2);
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = Config::from_lookup(lookup(&[("PORT", "eighty"), ("DLQ_MAX_SIZE", "-1")]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retry.dlq_max_size, 1000);
    }

    #[test]
    fn blank_database_url_means_memory() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "  ")]));
        assert!(config.store.database_url.is_none());
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let config = Config::from_lookup(lookup(&[("RETRY_MAX_ATTEMPTS", "0")]));
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::Invalid {
                name: "RETRY_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            }
        );
    }

    #[test]
    fn validate_rejects_zero_dead_letter_capacity() {
        let config = Config::from_lookup(lookup(&[("DLQ_MAX_SIZE", "0")]));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { name: "DLQ_MAX_SIZE", .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_host() {
        let config = Config::from_lookup(lookup(&[("HOST", "not a host")]));
        assert!(matches!(config.validate(), Err(ConfigError::Address(_))));
    }
}
