//! Initial read position for uncheckpointed leases

use chrono::{DateTime, Utc};

/// Where a shard lease begins reading when no checkpoint exists
///
/// Applied uniformly to every stream the adapter is configured with. Once a
/// lease has a checkpoint, the checkpoint wins and the initial position is
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialPosition {
    /// Start from the oldest record still retained by the shard
    TrimHorizon,

    /// Start from the shard tip; only records published after the lease is
    /// first polled are delivered
    Latest,

    /// Start from the first record whose arrival timestamp is at or after
    /// the given instant
    AtTimestamp(DateTime<Utc>),
}

impl Default for InitialPosition {
    fn default() -> Self {
        Self::TrimHorizon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_trim_horizon() {
        assert_eq!(InitialPosition::default(), InitialPosition::TrimHorizon);
    }

    #[test]
    fn test_at_timestamp_holds_instant() {
        let t = Utc::now();
        let position = InitialPosition::AtTimestamp(t);
        assert_eq!(position, InitialPosition::AtTimestamp(t));
    }
}
