//! Zenoh-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use zenoh::Session;
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::{Sample, SampleKind};

use atomlink_common::{
    Error, Format, MediaPayload, Result, TelemetrySample, ZenohConfig, decode_auto, encode,
};

use crate::config::BridgeConfig;
use crate::transport::Transport;

/// How long a poll waits for a pending media sample.
const DEFAULT_POLL_WAIT: Duration = Duration::from_millis(5);

struct Link {
    session: Session,
    subscriber: Subscriber<FifoChannelHandler<Sample>>,
    telemetry_key: String,
}

/// Transport publishing telemetry and receiving media over Zenoh.
///
/// The session is opened by the handshake and closed by [`Transport::close`];
/// a later handshake opens a fresh one.
pub struct ZenohTransport {
    zenoh: ZenohConfig,
    format: Format,
    poll_wait: Duration,
    link: Mutex<Option<Link>>,
}

impl ZenohTransport {
    pub fn new(zenoh: ZenohConfig, format: Format) -> Self {
        Self {
            zenoh,
            format,
            poll_wait: DEFAULT_POLL_WAIT,
            link: Mutex::new(None),
        }
    }

    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    /// Get the serialization format.
    pub fn format(&self) -> Format {
        self.format
    }

    pub async fn is_open(&self) -> bool {
        self.link.lock().await.is_some()
    }
}

impl std::fmt::Debug for ZenohTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenohTransport")
            .field("zenoh", &self.zenoh)
            .field("format", &self.format)
            .field("poll_wait", &self.poll_wait)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ZenohTransport {
    async fn attempt_handshake(&self, config: &BridgeConfig) -> Result<()> {
        let mut link = self.link.lock().await;
        if let Some(old) = link.take() {
            let _ = old.session.close().await;
        }

        let session = atomlink_common::connect(&self.zenoh).await?;
        let subscriber = session
            .declare_subscriber(config.media_topic.as_str())
            .await
            .map_err(|e| {
                Error::connection_failure(format!(
                    "failed to subscribe to '{}': {}",
                    config.media_topic, e
                ))
            })?;

        tracing::info!(
            node = %config.node_name,
            telemetry = %config.telemetry_topic,
            media = %config.media_topic,
            format = %self.format,
            "Zenoh transport ready"
        );

        *link = Some(Link {
            session,
            subscriber,
            telemetry_key: config.telemetry_topic.clone(),
        });
        Ok(())
    }

    async fn attempt_delivery(&self, sample: &TelemetrySample) -> Result<()> {
        let payload = encode(sample, self.format)?;

        let link = self.link.lock().await;
        let link = link
            .as_ref()
            .ok_or_else(|| Error::invalid_state("zenoh session not open"))?;

        link.session
            .put(link.telemetry_key.as_str(), payload)
            .await
            .map_err(|e| {
                Error::connection_failure(format!(
                    "failed to publish on '{}': {}",
                    link.telemetry_key, e
                ))
            })?;

        Ok(())
    }

    async fn poll_inbound(&self) -> Result<Option<MediaPayload>> {
        let link = self.link.lock().await;
        let link = link
            .as_ref()
            .ok_or_else(|| Error::invalid_state("zenoh session not open"))?;

        let sample = match tokio::time::timeout(self.poll_wait, link.subscriber.recv_async()).await
        {
            Err(_) => return Ok(None),
            Ok(Err(e)) => {
                return Err(Error::connection_failure(format!(
                    "media subscriber closed: {}",
                    e
                )));
            }
            Ok(Ok(sample)) => sample,
        };

        if sample.kind() == SampleKind::Delete {
            tracing::trace!(key = %sample.key_expr(), "Ignoring delete sample");
            return Ok(None);
        }

        let payload = sample.payload().to_bytes();
        let media: MediaPayload = decode_auto(&payload).map_err(|e| {
            tracing::debug!(
                key = %sample.key_expr(),
                payload_len = payload.len(),
                "Failed to decode media payload"
            );
            e
        })?;
        Ok(Some(media))
    }

    async fn close(&self) {
        if let Some(link) = self.link.lock().await.take() {
            if let Err(e) = link.session.close().await {
                tracing::warn!(error = %e, "Failed to close Zenoh session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomlink_common::ErrorKind;

    #[tokio::test]
    async fn test_delivery_requires_session() {
        let transport = ZenohTransport::new(ZenohConfig::default(), Format::Cbor);
        let sample = TelemetrySample::from_quaternion(0, "m5atom_imu", Default::default());
        let err = transport.attempt_delivery(&sample).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = transport.poll_inbound().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(!transport.is_open().await);
    }

    #[tokio::test]
    async fn test_close_without_session() {
        let transport = ZenohTransport::new(ZenohConfig::default(), Format::Json);
        transport.close().await;
        assert_eq!(transport.format(), Format::Json);
    }
}
