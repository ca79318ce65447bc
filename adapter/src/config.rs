//! Adapter configuration
//!
//! Tuning knobs for the consumption engine. Defaults suit tests and small
//! deployments; production overrides come from `VIRTA_*` environment
//! variables via [`AdapterConfig::from_env`].

use crate::error::{AdapterError, Result};
use std::time::Duration;

/// Engine tuning parameters
///
/// Settable on the adapter before `start()`; immutable afterwards, like the
/// rest of the configuration surface.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Delay between shard polls when the previous poll was drained
    pub poll_interval: Duration,

    /// Maximum records fetched per shard poll
    pub max_records_per_poll: usize,

    /// Initial backoff after a failed publish to the output channel
    pub publish_backoff: Duration,

    /// Upper bound for the publish backoff (exponential, capped)
    pub publish_backoff_cap: Duration,

    /// How long `stop()` waits for shard workers before aborting them
    pub shutdown_grace: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            max_records_per_poll: 1_000,
            publish_backoff: Duration::from_millis(50),
            publish_backoff_cap: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl AdapterConfig {
    /// Load configuration from environment variables
    ///
    /// Recognized variables (all optional, falling back to defaults):
    ///
    /// - `VIRTA_POLL_INTERVAL_MS`
    /// - `VIRTA_MAX_RECORDS_PER_POLL`
    /// - `VIRTA_PUBLISH_BACKOFF_MS`
    /// - `VIRTA_PUBLISH_BACKOFF_CAP_MS`
    /// - `VIRTA_SHUTDOWN_GRACE_MS`
    ///
    /// # Errors
    ///
    /// `AdapterError::Config` if a variable is present but not a valid
    /// integer.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            poll_interval: env_millis("VIRTA_POLL_INTERVAL_MS", defaults.poll_interval)?,
            max_records_per_poll: env_usize(
                "VIRTA_MAX_RECORDS_PER_POLL",
                defaults.max_records_per_poll,
            )?,
            publish_backoff: env_millis("VIRTA_PUBLISH_BACKOFF_MS", defaults.publish_backoff)?,
            publish_backoff_cap: env_millis(
                "VIRTA_PUBLISH_BACKOFF_CAP_MS",
                defaults.publish_backoff_cap,
            )?,
            shutdown_grace: env_millis("VIRTA_SHUTDOWN_GRACE_MS", defaults.shutdown_grace)?,
        })
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| AdapterError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|e| AdapterError::Config(format!("{name}: {e}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(20));
        assert_eq!(config.max_records_per_poll, 1_000);
        assert!(config.publish_backoff < config.publish_backoff_cap);
    }

    // Env vars are process-global and tests run in parallel, so every
    // from_env case lives in this single test.
    #[test]
    fn test_from_env() {
        std::env::set_var("VIRTA_POLL_INTERVAL_MS", "5");
        std::env::set_var("VIRTA_MAX_RECORDS_PER_POLL", "250");

        let config = AdapterConfig::from_env().unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.max_records_per_poll, 250);
        // Untouched variables keep their defaults
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));

        std::env::set_var("VIRTA_SHUTDOWN_GRACE_MS", "not-a-number");
        let result = AdapterConfig::from_env();
        assert!(matches!(result, Err(AdapterError::Config(_))));

        std::env::remove_var("VIRTA_POLL_INTERVAL_MS");
        std::env::remove_var("VIRTA_MAX_RECORDS_PER_POLL");
        std::env::remove_var("VIRTA_SHUTDOWN_GRACE_MS");
    }
}
