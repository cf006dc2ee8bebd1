//! Transport capability the bridge publishes and polls through.

use async_trait::async_trait;

use atomlink_common::{MediaPayload, Result, TelemetrySample};

use crate::config::BridgeConfig;

/// Middleware the message bridge talks to.
///
/// Implementations must be cheap to call from the bridge tasks; any
/// blocking work belongs behind an `.await`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the middleware session for `config`.
    async fn attempt_handshake(&self, config: &BridgeConfig) -> Result<()>;

    /// Deliver one telemetry sample on the telemetry topic.
    async fn attempt_delivery(&self, sample: &TelemetrySample) -> Result<()>;

    /// Return the next pending media payload, if any, without waiting long.
    async fn poll_inbound(&self) -> Result<Option<MediaPayload>>;

    /// Tear the session down. Safe to call when no session exists.
    async fn close(&self);
}
