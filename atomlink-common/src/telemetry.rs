use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Orientation quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Euclidean norm; close to 1.0 for a healthy fused reading.
    pub fn magnitude(&self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Three-axis vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Row-major 3x3 covariance block.
///
/// A block of zeros with `-1` on the diagonal means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Covariance(pub [f32; 9]);

impl Covariance {
    pub const UNKNOWN: Covariance =
        Covariance([-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0]);

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl Default for Covariance {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// One orientation telemetry sample, laid out like an IMU message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub seq: u32,
    /// Nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    pub frame_id: String,
    pub orientation: Quaternion,
    pub orientation_covariance: Covariance,
    pub angular_velocity: Vector3,
    pub angular_velocity_covariance: Covariance,
    pub linear_acceleration: Vector3,
    pub linear_acceleration_covariance: Covariance,
}

impl TelemetrySample {
    /// Build a sample from a fused quaternion reading.
    ///
    /// Angular velocity and linear acceleration are not part of a quaternion
    /// reading, so their covariances are marked unknown.
    pub fn from_quaternion(seq: u32, frame_id: impl Into<String>, orientation: Quaternion) -> Self {
        Self {
            seq,
            timestamp_ns: current_timestamp_nanos(),
            frame_id: frame_id.into(),
            orientation,
            orientation_covariance: Covariance::UNKNOWN,
            angular_velocity: Vector3::default(),
            angular_velocity_covariance: Covariance::UNKNOWN,
            linear_acceleration: Vector3::default(),
            linear_acceleration_covariance: Covariance::UNKNOWN,
        }
    }
}

/// Variable-size media payload (e.g. a compressed camera frame).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub seq: u32,
    /// Nanoseconds since Unix epoch.
    pub timestamp_ns: u64,
    pub frame_id: String,
    /// Encoding tag, e.g. "jpeg".
    pub format: String,
    pub data: Vec<u8>,
}

impl MediaPayload {
    pub fn new(
        seq: u32,
        frame_id: impl Into<String>,
        format: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            seq,
            timestamp_ns: current_timestamp_nanos(),
            frame_id: frame_id.into(),
            format: format.into(),
            data,
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Get the current timestamp in nanoseconds since Unix epoch.
pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
