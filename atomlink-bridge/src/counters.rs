//! Live bridge counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use atomlink_common::BridgeStatistics;

/// Append-only counters shared by the bridge tasks.
///
/// Each counter is updated independently; a snapshot is not atomic across
/// counters.
#[derive(Debug)]
pub struct BridgeCounters {
    messages_published: AtomicU64,
    messages_received: AtomicU64,
    publish_errors: AtomicU64,
    receive_errors: AtomicU64,
    connection_attempts: AtomicU64,
    successful_connections: AtomicU64,
    disconnection_events: AtomicU64,
    /// Start time for uptime calculation.
    start_time: Mutex<Instant>,
}

impl BridgeCounters {
    pub fn new() -> Self {
        Self {
            messages_published: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            connection_attempts: AtomicU64::new(0),
            successful_connections: AtomicU64::new(0),
            disconnection_events: AtomicU64::new(0),
            start_time: Mutex::new(Instant::now()),
        }
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        for counter in [
            &self.messages_published,
            &self.messages_received,
            &self.publish_errors,
            &self.receive_errors,
            &self.connection_attempts,
            &self.successful_connections,
            &self.disconnection_events,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn record_published(&self) {
        self.messages_published.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_connection(&self) {
        self.successful_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_disconnection(&self) {
        self.disconnection_events.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> BridgeStatistics {
        let start = *self.start_time.lock().unwrap_or_else(PoisonError::into_inner);
        BridgeStatistics {
            messages_published: self.messages_published.load(Ordering::SeqCst),
            messages_received: self.messages_received.load(Ordering::SeqCst),
            publish_errors: self.publish_errors.load(Ordering::SeqCst),
            receive_errors: self.receive_errors.load(Ordering::SeqCst),
            connection_attempts: self.connection_attempts.load(Ordering::SeqCst),
            successful_connections: self.successful_connections.load(Ordering::SeqCst),
            disconnection_events: self.disconnection_events.load(Ordering::SeqCst),
            uptime_ms: start.elapsed().as_millis() as u64,
        }
    }
}

impl Default for BridgeCounters {
    fn default() -> Self {
        Self::new()
    }
}
