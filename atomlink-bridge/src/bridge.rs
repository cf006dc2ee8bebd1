//! The message bridge: queued telemetry out, polled media in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use atomlink_common::{BridgeStatistics, Error, ErrorKind, MediaPayload, Result, TelemetrySample};

use crate::config::BridgeConfig;
use crate::counters::BridgeCounters;
use crate::status::{BridgeStatus, StatusReport};
use crate::transport::Transport;

/// Telemetry queue capacity.
pub const QUEUE_CAPACITY: usize = 10;

/// Longest `publish_telemetry` waits for queue space.
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

pub type StatusCallback = Arc<dyn Fn(BridgeStatus) + Send + Sync>;
pub type PayloadCallback = Arc<dyn Fn(&MediaPayload) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(ErrorKind, &str) + Send + Sync>;
pub type LinkMonitor = Arc<dyn Fn() -> bool + Send + Sync>;

type SampleQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<TelemetrySample>>>;

#[derive(Default)]
struct Lifecycle {
    initialized: bool,
    started: bool,
    config: Option<BridgeConfig>,
    queue_tx: Option<mpsc::Sender<TelemetrySample>>,
    queue_rx: Option<SampleQueue>,
    timer: Option<JoinHandle<()>>,
    publish_task: Option<JoinHandle<()>>,
    subscribe_task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Callbacks {
    status: Option<StatusCallback>,
    payload: Option<PayloadCallback>,
    error: Option<ErrorCallback>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    lifecycle: Mutex<Lifecycle>,
    status: Mutex<BridgeStatus>,
    counters: BridgeCounters,
    callbacks: RwLock<Callbacks>,
    link_monitor: RwLock<LinkMonitor>,
    mock_mode: AtomicBool,
    last_publish: Mutex<Option<Instant>>,
}

/// Handle to a message bridge.
///
/// Cloning is cheap; all clones drive the same bridge. Callbacks run on the
/// bridge task that triggered them and must not call `init`, `start`, `stop`
/// or `deinit`.
#[derive(Clone)]
pub struct MessageBridge {
    shared: Arc<Shared>,
}

impl MessageBridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                lifecycle: Mutex::new(Lifecycle::default()),
                status: Mutex::new(BridgeStatus::Disconnected),
                counters: BridgeCounters::new(),
                callbacks: RwLock::new(Callbacks::default()),
                link_monitor: RwLock::new(Arc::new(|| true) as LinkMonitor),
                mock_mode: AtomicBool::new(false),
                last_publish: Mutex::new(None),
            }),
        }
    }

    /// Gate handshakes on a network-level connectivity check.
    pub fn with_link_monitor<F>(self, monitor: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.set_link_monitor(monitor);
        self
    }

    pub fn set_link_monitor<F>(&self, monitor: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        *self
            .shared
            .link_monitor
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(monitor);
    }

    /// Allocate the queue and reset statistics.
    pub fn init(&self, config: &BridgeConfig) -> Result<()> {
        config.validate()?;

        let mut lifecycle = self.shared.lifecycle();
        if lifecycle.initialized {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        *lifecycle = Lifecycle {
            initialized: true,
            config: Some(config.clone()),
            queue_tx: Some(tx),
            queue_rx: Some(Arc::new(tokio::sync::Mutex::new(rx))),
            ..Lifecycle::default()
        };

        self.shared.counters.reset();
        *self.shared.status_slot() = BridgeStatus::Disconnected;
        *self
            .shared
            .last_publish
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        tracing::info!(
            node = %config.node_name,
            telemetry = %config.telemetry_topic,
            media = %config.media_topic,
            rate_hz = config.publish_rate_hz,
            "Message bridge initialized"
        );
        Ok(())
    }

    /// Launch the publish and subscribe tasks and arm the handshake timer.
    pub fn start(&self) -> Result<()> {
        let handle = Handle::try_current()
            .map_err(|_| Error::invalid_state("message bridge requires a tokio runtime"))?;

        let mut lifecycle = self.shared.lifecycle();
        if !lifecycle.initialized {
            return Err(Error::invalid_state("message bridge not initialized"));
        }
        if lifecycle.started {
            return Ok(());
        }

        let (Some(config), Some(queue)) = (lifecycle.config.clone(), lifecycle.queue_rx.clone())
        else {
            return Err(Error::invalid_state("message bridge has no queue"));
        };

        lifecycle.started = true;
        self.shared.counters.record_connection_attempt();
        self.shared.set_status(BridgeStatus::Connecting);

        lifecycle.publish_task = Some(handle.spawn(publish_loop(
            self.shared.clone(),
            queue,
            config.publish_period(),
        )));
        lifecycle.subscribe_task = Some(handle.spawn(subscribe_loop(
            self.shared.clone(),
            Duration::from_millis(u64::from(config.poll_interval_ms)),
        )));
        lifecycle.timer = Some(handle.spawn(handshake_timer(self.shared.clone(), config.clone())));

        tracing::info!(
            node = %config.node_name,
            timeout_ms = config.connection_timeout_ms,
            "Message bridge started"
        );
        Ok(())
    }

    /// Re-arm the one-shot handshake timer, typically after `Error`.
    pub fn retry_handshake(&self) -> Result<()> {
        let handle = Handle::try_current()
            .map_err(|_| Error::invalid_state("message bridge requires a tokio runtime"))?;

        let mut lifecycle = self.shared.lifecycle();
        if !lifecycle.started {
            return Err(Error::invalid_state("message bridge not started"));
        }
        let config = lifecycle
            .config
            .clone()
            .ok_or_else(|| Error::invalid_state("message bridge has no config"))?;

        if let Some(timer) = lifecycle.timer.take() {
            timer.abort();
        }

        self.shared.counters.record_connection_attempt();
        self.shared.set_status(BridgeStatus::Connecting);
        lifecycle.timer = Some(handle.spawn(handshake_timer(self.shared.clone(), config)));

        tracing::info!("Handshake re-armed");
        Ok(())
    }

    /// Disarm the timer, stop both tasks and wait for them to finish.
    pub async fn stop(&self) -> Result<()> {
        let tasks = {
            let mut lifecycle = self.shared.lifecycle();
            if !lifecycle.started {
                return Ok(());
            }
            lifecycle.started = false;
            [
                lifecycle.timer.take(),
                lifecycle.publish_task.take(),
                lifecycle.subscribe_task.take(),
            ]
        };

        for task in tasks.into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }

        self.shared.transport.close().await;
        self.shared.set_status(BridgeStatus::Disconnected);

        tracing::info!("Message bridge stopped");
        Ok(())
    }

    /// Stop, then release the queue. Queued samples are dropped.
    pub async fn deinit(&self) -> Result<()> {
        if !self.shared.lifecycle().initialized {
            return Ok(());
        }

        self.stop().await?;
        *self.shared.lifecycle() = Lifecycle::default();

        tracing::info!("Message bridge deinitialized");
        Ok(())
    }

    /// Queue a sample for the publish task.
    ///
    /// Waits up to [`ENQUEUE_TIMEOUT`] for space; a sample that does not fit
    /// is dropped and counted as a publish error.
    pub async fn publish_telemetry(&self, sample: TelemetrySample) -> Result<()> {
        let tx = {
            let lifecycle = self.shared.lifecycle();
            if !lifecycle.initialized || !lifecycle.started {
                return Err(Error::invalid_state("message bridge not started"));
            }
            lifecycle
                .queue_tx
                .clone()
                .ok_or_else(|| Error::invalid_state("telemetry queue released"))?
        };

        match tx.send_timeout(sample, ENQUEUE_TIMEOUT).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(sample)) => {
                self.shared.counters.record_publish_error();
                tracing::warn!(seq = sample.seq, "Telemetry queue full, sample dropped");
                Err(Error::timeout("telemetry queue full"))
            }
            Err(SendTimeoutError::Closed(_)) => {
                self.shared.counters.record_publish_error();
                Err(Error::invalid_state("telemetry queue released"))
            }
        }
    }

    pub fn statistics(&self) -> BridgeStatistics {
        self.shared.counters.snapshot()
    }

    pub fn status(&self) -> BridgeStatus {
        self.shared.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn is_started(&self) -> bool {
        self.shared.lifecycle().started
    }

    /// Time since the last successful delivery.
    pub fn since_last_publish(&self) -> Option<Duration> {
        self.shared
            .last_publish
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.elapsed())
    }

    pub fn report(&self) -> StatusReport {
        let node = self
            .shared
            .lifecycle()
            .config
            .as_ref()
            .map(|c| c.node_name.clone())
            .unwrap_or_default();

        StatusReport {
            node,
            version: env!("CARGO_PKG_VERSION").to_string(),
            status: self.status(),
            mock_mode: self.is_mock_mode(),
            statistics: self.statistics(),
            last_publish_ms_ago: self.since_last_publish().map(|d| d.as_millis() as u64),
        }
    }

    pub fn set_status_callback<F>(&self, callback: F)
    where
        F: Fn(BridgeStatus) + Send + Sync + 'static,
    {
        self.shared.callbacks_mut().status = Some(Arc::new(callback));
    }

    pub fn set_payload_callback<F>(&self, callback: F)
    where
        F: Fn(&MediaPayload) + Send + Sync + 'static,
    {
        self.shared.callbacks_mut().payload = Some(Arc::new(callback));
    }

    pub fn set_error_callback<F>(&self, callback: F)
    where
        F: Fn(ErrorKind, &str) + Send + Sync + 'static,
    {
        self.shared.callbacks_mut().error = Some(Arc::new(callback));
    }

    pub fn set_mock_mode(&self, enabled: bool) {
        self.shared.mock_mode.store(enabled, Ordering::SeqCst);
        tracing::info!(enabled, "Mock mode");
    }

    pub fn is_mock_mode(&self) -> bool {
        self.shared.mock_mode.load(Ordering::SeqCst)
    }

    /// Deliver `payload` as if it had arrived from the transport.
    pub fn inject_mock_payload(&self, payload: &MediaPayload) -> Result<()> {
        if !self.is_mock_mode() {
            return Err(Error::invalid_argument("mock mode is disabled"));
        }

        tracing::debug!(seq = payload.seq, len = payload.len(), "Injecting mock payload");
        self.shared.deliver_payload(payload);
        Ok(())
    }
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn status_slot(&self) -> MutexGuard<'_, BridgeStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks(&self) -> std::sync::RwLockReadGuard<'_, Callbacks> {
        self.callbacks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Callbacks> {
        self.callbacks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn status(&self) -> BridgeStatus {
        *self.status_slot()
    }

    /// Set the status, notifying only on an actual change.
    fn set_status(&self, status: BridgeStatus) {
        let previous = std::mem::replace(&mut *self.status_slot(), status);
        if previous != status {
            self.on_status_changed(previous, status);
        }
    }

    /// Move `from` to `to` if the status is still `from`.
    fn transition_if(&self, from: BridgeStatus, to: BridgeStatus) {
        let changed = {
            let mut slot = self.status_slot();
            if *slot == from {
                *slot = to;
                true
            } else {
                false
            }
        };
        if changed {
            self.on_status_changed(from, to);
        }
    }

    /// Enter a transient status, but only from the connected family.
    ///
    /// Returns false when the bridge has left the connected family, e.g.
    /// after `retry_handshake` moved it back to `Connecting`.
    fn enter_transient(&self, to: BridgeStatus) -> bool {
        let previous = {
            let mut slot = self.status_slot();
            if !slot.is_connected() {
                return false;
            }
            std::mem::replace(&mut *slot, to)
        };
        if previous != to {
            self.on_status_changed(previous, to);
        }
        true
    }

    fn on_status_changed(&self, previous: BridgeStatus, status: BridgeStatus) {
        if status == BridgeStatus::Disconnected {
            self.counters.record_disconnection();
        }
        tracing::debug!(from = %previous, to = %status, "Bridge status");

        let callback = self.callbacks().status.clone();
        if let Some(callback) = callback {
            callback(status);
        }
    }

    fn report_error(&self, kind: ErrorKind, message: &str) {
        let callback = self.callbacks().error.clone();
        if let Some(callback) = callback {
            callback(kind, message);
        }
    }

    fn deliver_payload(&self, payload: &MediaPayload) {
        let callback = self.callbacks().payload.clone();
        if let Some(callback) = callback {
            callback(payload);
        }
        self.counters.record_received();
    }

    fn link_up(&self) -> bool {
        let monitor = self
            .link_monitor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        monitor()
    }

    async fn handshake(&self, config: &BridgeConfig) {
        if !self.link_up() {
            tracing::warn!("Network not connected, handshake skipped");
            self.set_status(BridgeStatus::Error);
            self.report_error(ErrorKind::ConnectionFailure, "network not connected");
            return;
        }

        match self.transport.attempt_handshake(config).await {
            Ok(()) => {
                self.counters.record_connection();
                self.set_status(BridgeStatus::Connected);
                tracing::info!(node = %config.node_name, "Bridge connected");
            }
            Err(e) => {
                tracing::error!(error = %e, "Handshake failed");
                self.set_status(BridgeStatus::Error);
                self.report_error(e.kind(), &e.to_string());
            }
        }
    }
}

async fn handshake_timer(shared: Arc<Shared>, config: BridgeConfig) {
    tokio::time::sleep(Duration::from_millis(u64::from(config.connection_timeout_ms))).await;
    shared.handshake(&config).await;
}

async fn publish_loop(shared: Arc<Shared>, queue: SampleQueue, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.status().is_connected() {
            continue;
        }

        let mut rx = queue.lock().await;
        let mut drained = false;
        // Samples stay queued if the bridge leaves the connected family mid-drain.
        while !rx.is_empty() && shared.enter_transient(BridgeStatus::Publishing) {
            let Ok(sample) = rx.try_recv() else {
                break;
            };
            drained = true;

            match shared.transport.attempt_delivery(&sample).await {
                Ok(()) => {
                    shared.counters.record_published();
                    *shared
                        .last_publish
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
                    tracing::trace!(seq = sample.seq, "Sample delivered");
                }
                Err(e) => {
                    shared.counters.record_publish_error();
                    tracing::warn!(seq = sample.seq, error = %e, "Delivery failed");
                    shared.report_error(e.kind(), &e.to_string());
                }
            }
        }
        drop(rx);

        if drained {
            shared.transition_if(BridgeStatus::Publishing, BridgeStatus::Connected);
        }
    }
}

async fn subscribe_loop(shared: Arc<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if !shared.status().is_connected() {
            continue;
        }

        if !shared.enter_transient(BridgeStatus::Subscribing) {
            continue;
        }
        match shared.transport.poll_inbound().await {
            Ok(Some(payload)) => {
                tracing::debug!(
                    seq = payload.seq,
                    frame = %payload.frame_id,
                    len = payload.len(),
                    "Media payload received"
                );
                shared.deliver_payload(&payload);
            }
            Ok(None) => {}
            Err(e) => {
                shared.counters.record_receive_error();
                tracing::warn!(error = %e, "Inbound poll failed");
                shared.report_error(e.kind(), &e.to_string());
            }
        }
        shared.transition_if(BridgeStatus::Subscribing, BridgeStatus::Connected);
    }
}
