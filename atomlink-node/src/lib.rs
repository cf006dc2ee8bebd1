//! atomlink sensor node.
//!
//! Keeps a station-mode wireless link up, samples IMU orientation into the
//! message bridge, and receives camera frames from it.
//!
//! # Topics
//!
//! ```text
//! m5atom/imu      telemetry samples (out)
//! video_frames    media payloads (in)
//! ```

pub mod args;
pub mod config;
pub mod runner;
pub mod sampler;
pub mod sensor;

pub use args::NodeArgs;
pub use config::{ConfigError, NodeConfig};
pub use runner::NodeRunner;
