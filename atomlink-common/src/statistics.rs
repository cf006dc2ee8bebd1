//! Message bridge statistics snapshot.

use serde::{Deserialize, Serialize};

/// Counters reported by the message bridge.
///
/// All counters only ever grow between `init` and `deinit`; `uptime_ms` is
/// recomputed each time a snapshot is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatistics {
    pub messages_published: u64,
    pub messages_received: u64,
    pub publish_errors: u64,
    pub receive_errors: u64,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub disconnection_events: u64,
    pub uptime_ms: u64,
}

impl BridgeStatistics {
    /// Publish success rate as a percentage.
    pub fn publish_success_rate(&self) -> f64 {
        let total = self.messages_published + self.publish_errors;
        if total == 0 {
            100.0
        } else {
            (self.messages_published as f64 / total as f64) * 100.0
        }
    }

    /// Whether every counter in `self` is at least its value in `earlier`.
    pub fn dominates(&self, earlier: &BridgeStatistics) -> bool {
        self.messages_published >= earlier.messages_published
            && self.messages_received >= earlier.messages_received
            && self.publish_errors >= earlier.publish_errors
            && self.receive_errors >= earlier.receive_errors
            && self.connection_attempts >= earlier.connection_attempts
            && self.successful_connections >= earlier.successful_connections
            && self.disconnection_events >= earlier.disconnection_events
    }
}
