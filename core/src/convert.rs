//! Converter trait for virta record conversion
//!
//! A [`Converter`] maps the raw byte payload of a consumed record to the
//! application-level payload delivered on the output channel. Converters are
//! the only per-record transformation hook in the pipeline.

use crate::error::PluginError;
use bytes::Bytes;

/// Converter trait - maps raw record bytes to the delivered payload
///
/// Invoked exactly once per consumed record, from whichever shard worker
/// read the record, so implementations must be stateless (or internally
/// synchronized) and `Send + Sync`.
///
/// A conversion error causes the record to be dropped and counted; it is
/// never retried and never affects other records or shards.
///
/// Plain closures work too:
///
/// ```
/// use bytes::Bytes;
/// use virta_core::{Converter, PluginError};
///
/// let upper = |data: Bytes| -> Result<Bytes, PluginError> {
///     Ok(Bytes::from(data.to_ascii_uppercase()))
/// };
/// assert_eq!(upper.convert(Bytes::from("x")).unwrap(), Bytes::from("X"));
/// ```
pub trait Converter: Send + Sync {
    /// Convert a raw payload
    ///
    /// # Errors
    ///
    /// `PluginError::Convert` if the payload cannot be converted. The
    /// record is dropped; the error is reported to the metrics collaborator.
    fn convert(&self, data: Bytes) -> Result<Bytes, PluginError>;
}

impl<F> Converter for F
where
    F: Fn(Bytes) -> Result<Bytes, PluginError> + Send + Sync,
{
    fn convert(&self, data: Bytes) -> Result<Bytes, PluginError> {
        self(data)
    }
}

/// Pass-through converter; the default when none is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl Converter for IdentityConverter {
    fn convert(&self, data: Bytes) -> Result<Bytes, PluginError> {
        Ok(data)
    }
}

/// Converter that accepts only valid UTF-8 payloads
///
/// The payload is passed through unchanged; invalid UTF-8 is rejected with
/// a typed error instead of surfacing later as garbage text downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Converter;

impl Converter for Utf8Converter {
    fn convert(&self, data: Bytes) -> Result<Bytes, PluginError> {
        match std::str::from_utf8(&data) {
            Ok(_) => Ok(data),
            Err(e) => Err(PluginError::Convert(format!("invalid UTF-8: {e}"))),
        }
    }
}
