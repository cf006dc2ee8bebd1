//! Orientation sensor capability and a simulated IMU.

use std::time::{Duration, Instant};

use atomlink_common::{Error, Quaternion, Result};

/// Chip identifier reported by a BNO055 fusion IMU.
pub const BNO055_CHIP_ID: u8 = 0xA0;

/// Scale of a raw fused quaternion component (1 LSB = 2^-14).
pub const QUATERNION_SCALE: f32 = 1.0 / 16384.0;

/// A sensor that reports fused orientation.
pub trait OrientationSensor: Send {
    fn chip_id(&mut self) -> Result<u8>;

    fn read_quaternion(&mut self) -> Result<Quaternion>;
}

/// Convert raw `[w, x, y, z]` register values to a quaternion.
pub fn quaternion_from_raw(raw: [i16; 4]) -> Quaternion {
    Quaternion::new(
        f32::from(raw[0]) * QUATERNION_SCALE,
        f32::from(raw[1]) * QUATERNION_SCALE,
        f32::from(raw[2]) * QUATERNION_SCALE,
        f32::from(raw[3]) * QUATERNION_SCALE,
    )
}

/// Read a quaternion, retrying failed reads up to `attempts` times.
pub async fn read_with_retry(
    sensor: &mut dyn OrientationSensor,
    attempts: u32,
    backoff: Duration,
) -> Result<Quaternion> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match sensor.read_quaternion() {
            Ok(q) => return Ok(q),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "IMU read failed");
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::timeout("IMU read failed")))
}

/// IMU that spins about the vertical axis at a fixed rate.
#[derive(Debug)]
pub struct SimulatedImu {
    yaw_rate_deg_s: f32,
    fail_every: u32,
    reads: u32,
    epoch: Instant,
}

impl SimulatedImu {
    pub fn new(yaw_rate_deg_s: f32) -> Self {
        Self {
            yaw_rate_deg_s,
            fail_every: 0,
            reads: 0,
            epoch: Instant::now(),
        }
    }

    /// Fail every `n`th read with a bus error; 0 disables failures.
    pub fn with_fail_every(mut self, n: u32) -> Self {
        self.fail_every = n;
        self
    }

    pub fn reads(&self) -> u32 {
        self.reads
    }

    fn raw_at(&self, elapsed: Duration) -> [i16; 4] {
        let yaw = (self.yaw_rate_deg_s * elapsed.as_secs_f32()).to_radians();
        let half = yaw / 2.0;
        let quantize = |v: f32| (v / QUATERNION_SCALE).round() as i16;
        [quantize(half.cos()), 0, 0, quantize(half.sin())]
    }
}

impl OrientationSensor for SimulatedImu {
    fn chip_id(&mut self) -> Result<u8> {
        Ok(BNO055_CHIP_ID)
    }

    fn read_quaternion(&mut self) -> Result<Quaternion> {
        self.reads = self.reads.wrapping_add(1);
        if self.fail_every > 0 && self.reads % self.fail_every == 0 {
            return Err(Error::Io(std::io::Error::other("simulated i2c bus error")));
        }
        Ok(quaternion_from_raw(self.raw_at(self.epoch.elapsed())))
    }
}
