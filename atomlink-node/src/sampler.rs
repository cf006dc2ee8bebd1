//! Periodic IMU sampling into the message bridge.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use atomlink_bridge::MessageBridge;
use atomlink_common::{Result, TelemetrySample};

use crate::config::SamplerConfig;
use crate::sensor::{BNO055_CHIP_ID, OrientationSensor, read_with_retry};

/// Sampler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Samples handed to the bridge.
    pub queued: u64,
    /// Ticks skipped because the bridge was not connected.
    pub skipped: u64,
    /// Samples lost to exhausted sensor retries.
    pub read_failures: u64,
    /// Samples the bridge refused.
    pub rejected: u64,
}

/// Reads the orientation sensor and queues telemetry samples.
pub struct TelemetrySampler {
    sensor: Box<dyn OrientationSensor>,
    bridge: MessageBridge,
    config: SamplerConfig,
    seq: u32,
    stats: SamplerStats,
}

impl TelemetrySampler {
    pub fn new(
        sensor: Box<dyn OrientationSensor>,
        bridge: MessageBridge,
        config: SamplerConfig,
    ) -> Self {
        Self {
            sensor,
            bridge,
            config,
            seq: 0,
            stats: SamplerStats::default(),
        }
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Take one sample and queue it.
    ///
    /// Returns `Ok(false)` when the bridge is not connected and nothing was read.
    pub async fn sample_once(&mut self) -> Result<bool> {
        if !self.bridge.is_connected() {
            self.stats.skipped += 1;
            return Ok(false);
        }

        let backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let orientation =
            match read_with_retry(self.sensor.as_mut(), self.config.read_attempts, backoff).await {
                Ok(q) => q,
                Err(e) => {
                    self.stats.read_failures += 1;
                    return Err(e);
                }
            };

        let sample = TelemetrySample::from_quaternion(self.seq, &self.config.frame_id, orientation);
        self.seq = self.seq.wrapping_add(1);

        if let Err(e) = self.bridge.publish_telemetry(sample).await {
            self.stats.rejected += 1;
            return Err(e);
        }

        self.stats.queued += 1;
        Ok(true)
    }

    /// Run the sampling loop.
    pub async fn run(mut self) {
        match self.sensor.chip_id() {
            Ok(BNO055_CHIP_ID) => debug!("IMU chip id verified"),
            Ok(id) => warn!(chip_id = id, "Unexpected IMU chip id"),
            Err(e) => warn!(error = %e, "Failed to read IMU chip id"),
        }

        let period = Duration::from_millis(u64::from(1000 / self.config.rate_hz.max(1)).max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            rate_hz = self.config.rate_hz,
            frame = %self.config.frame_id,
            "Starting telemetry sampler"
        );

        loop {
            ticker.tick().await;
            if let Err(e) = self.sample_once().await {
                warn!(error = %e, seq = self.seq, "Telemetry sample dropped");
            }
        }
    }
}
