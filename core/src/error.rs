//! Error types for virta pluggable components

use thiserror::Error;

/// Error type for pluggable pipeline components
///
/// This is the standard error type returned by the caller-supplied pieces of
/// the pipeline: converters and output channels. It provides structured error
/// categories that help with debugging and error handling.
///
/// # Example
///
/// ```
/// use virta_core::PluginError;
///
/// fn open_sink() -> Result<(), PluginError> {
///     Err(PluginError::Connection("refused".to_string()))
/// }
///
/// match open_sink() {
///     Ok(_) => println!("Connected!"),
///     Err(PluginError::Connection(msg)) => println!("Connection failed: {}", msg),
///     Err(e) => println!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Initialization failed
    ///
    /// Returned when a component fails to initialize, typically during
    /// startup. Examples: invalid configuration, missing credentials.
    #[error("initialization failed: {0}")]
    Init(String),

    /// Conversion failed
    ///
    /// Returned when a [`Converter`](crate::Converter) rejects a record
    /// payload. Examples: invalid UTF-8, schema mismatch, truncated frame.
    #[error("conversion failed: {0}")]
    Convert(String),

    /// Publish failed
    ///
    /// Returned when an output channel rejects a message.
    /// Examples: channel closed, bounded sink unreachable.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Connection error
    ///
    /// Returned when a network-backed component loses connectivity.
    #[error("connection error: {0}")]
    Connection(String),

    /// Shutdown error
    ///
    /// Returned when graceful shutdown fails.
    /// Examples: failed to flush, timeout waiting for pending operations.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}
