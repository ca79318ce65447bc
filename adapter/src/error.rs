//! Error types for the virta adapter

use thiserror::Error;

// Re-export PluginError from virta-core
pub use virta_core::PluginError;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Main error type for the virta adapter
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Configuration error (empty/duplicate stream set, blank consumer
    /// group, missing output channel, unparsable environment override)
    #[error("configuration error: {0}")]
    Config(String),

    /// Engine initialization failure; `start()` may be retried after
    /// remediation
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// Invalid lifecycle transition
    #[error("invalid lifecycle transition: {0}")]
    State(String),

    /// Stream-management collaborator failure
    #[error("stream service error: {0}")]
    Stream(String),

    /// Durable-state collaborator failure
    #[error("lease store error: {0}")]
    Lease(String),

    /// Error surfaced by a pluggable component (converter, output channel)
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Metrics registry error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Shutdown did not complete within the grace period
    #[error("shutdown error: {0}")]
    Shutdown(String),
}
