//! Node runner for lifecycle management.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use atomlink_bridge::{BridgeStatus, MessageBridge, MockTransport, Transport, ZenohTransport};
use atomlink_common::{ConnectionInfo, ConnectionStatus, Result};
use atomlink_net::{ConnectionConfig, ConnectionManager, SimulatedLink};

use crate::config::{NodeConfig, TransportKind};
use crate::sampler::TelemetrySampler;
use crate::sensor::SimulatedImu;

/// Runner that wires the connection manager, the message bridge and the
/// sampler together.
///
/// Handles:
/// - Station link bring-up with status logging
/// - Bridge start gated on the link
/// - Sampler and supervisor tasks
/// - Graceful shutdown on Ctrl+C
pub struct NodeRunner {
    config: NodeConfig,
    link: SimulatedLink,
    manager: ConnectionManager,
    bridge: MessageBridge,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRunner {
    /// Build the node from its configuration. Nothing runs until [`start`](Self::start).
    pub fn new(config: NodeConfig) -> Self {
        let sim = &config.simulation.link;
        let link = SimulatedLink::new(sim.script)
            .with_latency(Duration::from_millis(sim.latency_ms))
            .with_networks(sim.networks.clone());
        let manager = ConnectionManager::new(Arc::new(link.clone()));

        let transport: Arc<dyn Transport> = match config.transport.kind {
            TransportKind::Mock => Arc::new(
                MockTransport::new()
                    .with_handshake_delay(Duration::from_millis(
                        config.transport.mock_handshake_delay_ms,
                    ))
                    .with_arrival_every(Some(config.transport.mock_arrival_every)),
            ),
            TransportKind::Zenoh => Arc::new(ZenohTransport::new(
                config.zenoh.clone(),
                config.transport.format,
            )),
        };

        let monitor = manager.clone();
        let bridge = MessageBridge::new(transport).with_link_monitor(move || monitor.is_connected());

        Self {
            config,
            link,
            manager,
            bridge,
            tasks: Vec::new(),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn bridge(&self) -> &MessageBridge {
        &self.bridge
    }

    /// The simulated radio behind the manager.
    pub fn link(&self) -> &SimulatedLink {
        &self.link
    }

    /// Bring the link up, start the bridge and spawn the worker tasks.
    ///
    /// A failed first connect is fatal unless `wifi.auto_reconnect` is set,
    /// in which case the supervisor keeps trying.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            transport = ?self.config.transport.kind,
            "Starting atomlink node"
        );

        self.manager.init()?;
        self.manager.set_callback(log_link_status);
        if let Err(e) = self.manager.scan_start() {
            tracing::debug!(error = %e, "Scan not started");
        }

        match self.manager.connect(&self.config.wifi).await {
            Ok(()) => {}
            Err(e) if self.config.wifi.auto_reconnect => {
                tracing::warn!(error = %e, "Initial connect failed, supervisor will retry");
            }
            Err(e) => return Err(e),
        }

        self.bridge.set_status_callback(|status| {
            tracing::info!(status = %status, "Bridge status");
        });
        self.bridge.set_payload_callback(|payload| {
            tracing::info!(
                seq = payload.seq,
                frame = %payload.frame_id,
                format = %payload.format,
                len = payload.len(),
                "Media payload"
            );
        });
        self.bridge.set_error_callback(|kind, message| {
            tracing::warn!(kind = %kind, detail = message, "Bridge error");
        });
        self.bridge.set_mock_mode(self.config.transport.mock_mode);
        self.bridge.init(&self.config.bridge)?;

        if self.manager.is_connected() {
            self.bridge.start()?;
        }

        let imu = SimulatedImu::new(self.config.simulation.imu.yaw_rate_deg_s)
            .with_fail_every(self.config.simulation.imu.fail_every);
        let sampler = TelemetrySampler::new(
            Box::new(imu),
            self.bridge.clone(),
            self.config.sampler.clone(),
        );
        self.tasks.push(tokio::spawn(sampler.run()));

        self.tasks.push(tokio::spawn(supervise(
            self.manager.clone(),
            self.bridge.clone(),
            self.config.wifi.clone(),
            self.config.bridge.auto_reconnect,
            Duration::from_secs(self.config.supervisor.report_interval_secs),
        )));

        Ok(())
    }

    /// Stop the workers, then the bridge, then the link.
    pub async fn shutdown(&mut self) -> Result<()> {
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }

        self.bridge.deinit().await?;
        self.manager.deinit()?;

        tracing::info!("Goodbye!");
        Ok(())
    }

    /// Run the node until Ctrl+C is received.
    pub async fn run(mut self) -> Result<()> {
        self.start().await?;

        tracing::info!("Node running. Press Ctrl+C to stop.");

        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }

        tracing::info!("Received shutdown signal");
        self.shutdown().await
    }
}

/// Log every link transition the way an operator console expects.
fn log_link_status(status: ConnectionStatus, info: &ConnectionInfo) {
    match status {
        ConnectionStatus::Connected => tracing::info!(
            ssid = %info.ssid,
            rssi = info.rssi,
            channel = info.channel,
            address = ?info.address,
            gateway = ?info.gateway,
            "WiFi connected"
        ),
        ConnectionStatus::Connecting => {
            tracing::info!(retry = info.retry_count, "WiFi connecting")
        }
        ConnectionStatus::Disconnected => tracing::warn!("WiFi disconnected"),
        ConnectionStatus::Failed => {
            tracing::error!(retries = info.retry_count, "WiFi connection failed")
        }
        ConnectionStatus::TimedOut => tracing::error!("WiFi connection timed out"),
    }
}

/// Periodic statistics report plus link and bridge recovery.
async fn supervise(
    manager: ConnectionManager,
    bridge: MessageBridge,
    wifi: ConnectionConfig,
    bridge_auto_reconnect: bool,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let report = bridge.report();
        tracing::info!(
            link = %manager.status(),
            bridge = %report.status,
            published = report.statistics.messages_published,
            received = report.statistics.messages_received,
            publish_errors = report.statistics.publish_errors,
            success_rate = report.statistics.publish_success_rate(),
            "Node status"
        );
        tracing::debug!(report = %report.to_json(), "Bridge report");
        if let Ok(count) = manager.scan_count() {
            tracing::debug!(networks = count, "Visible networks");
        }

        let link = manager.status();
        if wifi.auto_reconnect && (link.is_terminal() || link == ConnectionStatus::Disconnected) {
            tracing::info!(ssid = %wifi.ssid, "Reconnecting WiFi");
            if let Err(e) = manager.connect(&wifi).await {
                tracing::warn!(error = %e, "Reconnect failed");
                continue;
            }
        }

        if !manager.is_connected() {
            continue;
        }

        if !bridge.is_started() {
            if let Err(e) = bridge.start() {
                tracing::error!(error = %e, "Failed to start bridge");
            }
        } else if bridge_auto_reconnect && bridge.status() == BridgeStatus::Error {
            tracing::info!("Re-arming bridge handshake");
            if let Err(e) = bridge.retry_handshake() {
                tracing::warn!(error = %e, "Failed to re-arm handshake");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomlink_common::ErrorKind;
    use atomlink_net::LinkScript;
    use std::time::Instant;

    fn test_config() -> NodeConfig {
        let mut config = NodeConfig::default();
        config.wifi = ConnectionConfig::new("net-A", "secret").with_timeout_ms(1000);
        config.bridge.connection_timeout_ms = 10;
        config.bridge.poll_interval_ms = 10;
        config.transport.mock_handshake_delay_ms = 0;
        config.supervisor.report_interval_secs = 1;
        config
    }

    async fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_and_shutdown() {
        let mut runner = NodeRunner::new(test_config());
        runner.start().await.unwrap();

        assert!(runner.manager().is_connected());
        wait_until("bridge connected", || runner.bridge().is_connected()).await;
        wait_until("telemetry published", || {
            runner.bridge().statistics().messages_published > 0
        })
        .await;

        runner.shutdown().await.unwrap();
        assert_eq!(runner.manager().status(), ConnectionStatus::Disconnected);
        assert_eq!(runner.bridge().status(), BridgeStatus::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_link_is_fatal_without_auto_reconnect() {
        let mut config = test_config();
        config.wifi = config.wifi.with_auto_reconnect(false).with_max_retry(1);
        config.simulation.link.script = LinkScript::AlwaysDrop;

        let mut runner = NodeRunner::new(config);
        let err = runner.start().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
        runner.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_supervisor_starts_bridge_once_link_recovers() {
        let mut config = test_config();
        config.wifi = config.wifi.with_max_retry(0);
        config.simulation.link.script = LinkScript::AlwaysDrop;

        let mut runner = NodeRunner::new(config);
        runner.start().await.unwrap();
        assert_eq!(runner.manager().status(), ConnectionStatus::Failed);
        assert!(!runner.bridge().is_started());

        runner.link().set_script(LinkScript::default());
        wait_until("bridge connected", || runner.bridge().is_connected()).await;
        assert!(runner.manager().is_connected());

        runner.shutdown().await.unwrap();
    }
}
