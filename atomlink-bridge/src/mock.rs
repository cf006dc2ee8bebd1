//! In-process transport with scripted behaviour.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use atomlink_common::{Error, MediaPayload, Result, TelemetrySample};

use crate::config::BridgeConfig;
use crate::transport::Transport;

/// Size of a simulated camera frame.
pub const MOCK_FRAME_LEN: usize = 1024;

/// Transport that succeeds locally, with optional injected failures.
///
/// By default the handshake takes one second and a simulated camera frame
/// arrives on the first poll and every 50th poll after it.
#[derive(Debug)]
pub struct MockTransport {
    handshake_delay: Duration,
    delivery_delay: Duration,
    arrival_every: Option<u32>,
    handshake_failures: AtomicUsize,
    delivery_failures: AtomicUsize,
    handshakes: AtomicUsize,
    polls: AtomicU32,
    arrivals: AtomicU32,
    open: AtomicBool,
    delivered: Mutex<Vec<TelemetrySample>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            handshake_delay: Duration::from_secs(1),
            delivery_delay: Duration::ZERO,
            arrival_every: Some(50),
            handshake_failures: AtomicUsize::new(0),
            delivery_failures: AtomicUsize::new(0),
            handshakes: AtomicUsize::new(0),
            polls: AtomicU32::new(0),
            arrivals: AtomicU32::new(0),
            open: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    /// Sleep this long inside every delivery.
    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    /// Fail the next `count` handshakes.
    pub fn with_handshake_failures(self, count: usize) -> Self {
        self.handshake_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail the next `count` deliveries.
    pub fn with_delivery_failures(self, count: usize) -> Self {
        self.delivery_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Simulate an arrival every `polls` polls, or never with `None`.
    pub fn with_arrival_every(mut self, polls: Option<u32>) -> Self {
        self.arrival_every = polls.filter(|n| *n > 0);
        self
    }

    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Samples delivered so far, oldest first.
    pub fn delivered(&self) -> Vec<TelemetrySample> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn attempt_handshake(&self, config: &BridgeConfig) -> Result<()> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(node = %config.node_name, "Simulated handshake");

        tokio::time::sleep(self.handshake_delay).await;

        if Self::take_failure(&self.handshake_failures) {
            return Err(Error::connection_failure("simulated handshake failure"));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn attempt_delivery(&self, sample: &TelemetrySample) -> Result<()> {
        if !self.delivery_delay.is_zero() {
            tokio::time::sleep(self.delivery_delay).await;
        }
        if Self::take_failure(&self.delivery_failures) {
            return Err(Error::connection_failure(format!(
                "simulated delivery failure for sample {}",
                sample.seq
            )));
        }
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample.clone());
        Ok(())
    }

    async fn poll_inbound(&self) -> Result<Option<MediaPayload>> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let Some(every) = self.arrival_every else {
            return Ok(None);
        };
        if poll % every != 0 {
            return Ok(None);
        }

        let seq = self.arrivals.fetch_add(1, Ordering::SeqCst);
        let data = (0..MOCK_FRAME_LEN).map(|i| (i % 256) as u8).collect();
        Ok(Some(MediaPayload::new(seq, "camera", "jpeg", data)))
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_arrival_on_first_and_every_nth_poll() {
        let transport = MockTransport::new().with_arrival_every(Some(3));

        let mut arrivals = Vec::new();
        for _ in 0..7 {
            arrivals.push(transport.poll_inbound().await.unwrap().is_some());
        }
        assert_eq!(arrivals, vec![true, false, false, true, false, false, true]);
        assert_eq!(transport.poll_count(), 7);
    }

    #[tokio::test]
    async fn test_simulated_frame_shape() {
        let transport = MockTransport::new();
        let frame = transport.poll_inbound().await.unwrap().unwrap();
        assert_eq!(frame.len(), MOCK_FRAME_LEN);
        assert_eq!(frame.frame_id, "camera");
        assert_eq!(frame.format, "jpeg");
    }

    #[tokio::test]
    async fn test_no_arrivals() {
        let transport = MockTransport::new().with_arrival_every(None);
        assert!(transport.poll_inbound().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_injection_is_consumed() {
        let transport = MockTransport::new()
            .with_handshake_delay(Duration::ZERO)
            .with_handshake_failures(1)
            .with_delivery_failures(1);
        let config = BridgeConfig::default();

        assert!(transport.attempt_handshake(&config).await.is_err());
        assert!(transport.attempt_handshake(&config).await.is_ok());
        assert!(transport.is_open());
        assert_eq!(transport.handshake_count(), 2);

        let sample = TelemetrySample::from_quaternion(0, "m5atom_imu", Default::default());
        assert!(transport.attempt_delivery(&sample).await.is_err());
        assert!(transport.attempt_delivery(&sample).await.is_ok());
        assert_eq!(transport.delivered().len(), 1);

        transport.close().await;
        assert!(!transport.is_open());
    }
}
