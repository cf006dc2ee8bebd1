//! Retrying station-mode connection manager.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use atomlink_common::{AccessPointRecord, ConnectionInfo, ConnectionStatus, Error, IpInfo, Result};

use crate::config::ConnectionConfig;
use crate::driver::{LinkDriver, LinkEvent, REASON_ASSOC_LEAVE};
use crate::signal::ConnectSignal;

/// Status callback, invoked with the new status and a freshly computed info record.
///
/// Runs synchronously on the event dispatcher (or on the task that drove the
/// transition). It must return quickly and must not call back into
/// `connect`/`disconnect`.
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus, &ConnectionInfo) + Send + Sync>;

#[derive(Default)]
struct State {
    initialized: bool,
    status: ConnectionStatus,
    config: Option<ConnectionConfig>,
    retry_count: u8,
    connect_started: Option<Instant>,
    connected_since: Option<Instant>,
    scan_results: Option<Vec<AccessPointRecord>>,
    station_started: bool,
    waiting: bool,
    signal: Option<Arc<ConnectSignal>>,
    dispatcher: Option<JoinHandle<()>>,
}

struct Inner {
    driver: Arc<dyn LinkDriver>,
    state: Mutex<State>,
    callback: RwLock<Option<StatusCallback>>,
}

/// What a link drop turns into, decided under the state lock.
enum DropStep {
    Retry(u8),
    Fail(u8),
    Reconnect,
    Down,
}

/// Handle to the connection manager.
///
/// Cloning is cheap; all clones share one state machine.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(driver: Arc<dyn LinkDriver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                state: Mutex::new(State::default()),
                callback: RwLock::new(None),
            }),
        }
    }

    /// Initialize the driver and spawn the event dispatcher.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// initialized is a no-op.
    pub fn init(&self) -> Result<()> {
        let handle = Handle::try_current()
            .map_err(|_| Error::invalid_state("connection manager requires a tokio runtime"))?;

        let mut state = self.inner.lock();
        if state.initialized {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.driver.init(tx)?;

        *state = State {
            initialized: true,
            signal: Some(Arc::new(ConnectSignal::new())),
            dispatcher: Some(handle.spawn(dispatch(Arc::downgrade(&self.inner), rx))),
            ..State::default()
        };

        tracing::info!("Connection manager initialized");
        Ok(())
    }

    /// Associate with the network in `config` and wait for the outcome.
    ///
    /// Returns once an address is assigned, the retry budget is exhausted
    /// (`ConnectionFailure`) or `config.timeout_ms` elapses (`Timeout`).
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<()> {
        let (signal, station_started) = {
            let mut state = self.inner.lock();
            if !state.initialized {
                return Err(Error::invalid_argument("connection manager not initialized"));
            }
            config.validate()?;
            if state.waiting {
                return Err(Error::invalid_state("another connect is already waiting"));
            }
            let signal = state
                .signal
                .clone()
                .ok_or_else(|| Error::invalid_state("connect signal not allocated"))?;

            signal.reset();
            state.waiting = true;
            state.config = Some(config.clone());
            state.retry_count = 0;
            state.connect_started = Some(Instant::now());
            (signal, state.station_started)
        };
        let _waiting = WaitingGuard(&self.inner);

        tracing::info!(
            ssid = %config.ssid,
            max_retry = config.max_retry,
            timeout_ms = config.timeout_ms,
            "Connecting"
        );

        self.inner.driver.configure(config)?;
        self.inner.transition(ConnectionStatus::Connecting);

        let kickoff = if station_started {
            self.inner.driver.connect()
        } else {
            self.inner.driver.start()
        };
        if let Err(e) = kickoff {
            tracing::error!(error = %e, "Link driver refused to start association");
            self.inner.transition(ConnectionStatus::Disconnected);
            return Err(Error::connection_failure(format!(
                "link driver refused to associate: {}",
                e
            )));
        }

        let budget = Duration::from_millis(u64::from(config.timeout_ms));
        match tokio::time::timeout(budget, signal.wait()).await {
            Ok(flags) if flags.connected => {
                tracing::info!(ssid = %config.ssid, "Connected");
                Ok(())
            }
            Ok(_) if self.inner.lock().status == ConnectionStatus::Failed => {
                Err(Error::connection_failure(format!(
                    "could not associate with '{}' after {} retries",
                    config.ssid, config.max_retry
                )))
            }
            Ok(_) => Err(Error::connection_failure(format!(
                "connect to '{}' cancelled",
                config.ssid
            ))),
            Err(_) => self.inner.expire(config),
        }
    }

    /// Leave the network and go to `Disconnected`.
    ///
    /// A `connect` still waiting returns `ConnectionFailure`.
    pub fn disconnect(&self) -> Result<()> {
        let signal = {
            let state = self.inner.lock();
            if !state.initialized {
                return Err(Error::invalid_state("connection manager not initialized"));
            }
            state.signal.clone()
        };

        self.inner.transition(ConnectionStatus::Disconnected);
        if let Some(signal) = signal {
            signal.set_failed();
        }
        self.inner.driver.disconnect()?;
        tracing::info!("Disconnected");
        Ok(())
    }

    /// Stop the driver and the dispatcher and release all resources.
    ///
    /// Idempotent. A `connect` still waiting returns `ConnectionFailure`.
    pub fn deinit(&self) -> Result<()> {
        let (dispatcher, signal, was) = {
            let mut state = self.inner.lock();
            if !state.initialized {
                return Ok(());
            }
            let dispatcher = state.dispatcher.take();
            let signal = state.signal.take();
            let was = state.status;
            *state = State::default();
            (dispatcher, signal, was)
        };

        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
        }
        if let Err(e) = self.inner.driver.stop() {
            tracing::warn!(error = %e, "Link driver stop failed");
        }
        self.inner.driver.deinit();

        if let Some(signal) = signal {
            signal.set_failed();
        }
        if was != ConnectionStatus::Disconnected {
            self.inner.notify(ConnectionStatus::Disconnected);
        }

        tracing::info!("Connection manager deinitialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Current connection snapshot.
    pub fn info(&self) -> ConnectionInfo {
        let state = self.inner.lock();
        self.inner.info_locked(&state)
    }

    /// Config of the most recent `connect`, if any.
    pub fn config(&self) -> Option<ConnectionConfig> {
        self.inner.lock().config.clone()
    }

    /// Time since the most recent `connect` began.
    pub fn since_connect_started(&self) -> Option<Duration> {
        self.inner.lock().connect_started.map(|t| t.elapsed())
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(ConnectionStatus, &ConnectionInfo) + Send + Sync + 'static,
    {
        *self.inner.callback_slot() = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *self.inner.callback_slot() = None;
    }

    /// Ask the driver for an access point scan. Results arrive asynchronously.
    pub fn scan_start(&self) -> Result<()> {
        if !self.inner.lock().initialized {
            return Err(Error::invalid_state("connection manager not initialized"));
        }
        tracing::debug!("Starting access point scan");
        self.inner.driver.scan_start()
    }

    /// Number of records from the last completed scan.
    pub fn scan_count(&self) -> Result<usize> {
        let state = self.inner.lock();
        state
            .scan_results
            .as_ref()
            .map(Vec::len)
            .ok_or_else(|| Error::invalid_argument("no scan results available"))
    }

    pub fn scan_result(&self, index: usize) -> Result<AccessPointRecord> {
        let state = self.inner.lock();
        let results = state
            .scan_results
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("no scan results available"))?;
        results.get(index).cloned().ok_or_else(|| {
            Error::not_found(format!(
                "scan index {} out of range ({} results)",
                index,
                results.len()
            ))
        })
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callback_slot(&self) -> std::sync::RwLockWriteGuard<'_, Option<StatusCallback>> {
        self.callback.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn info_locked(&self, state: &State) -> ConnectionInfo {
        let mut info = ConnectionInfo::bare(state.status, state.retry_count);
        if state.status != ConnectionStatus::Connected {
            return info;
        }

        match self.driver.access_point() {
            Some(ap) => {
                info.ssid = ap.ssid;
                info.rssi = ap.rssi;
                info.channel = ap.channel;
            }
            None => {
                if let Some(config) = &state.config {
                    info.ssid = config.ssid.clone();
                }
            }
        }
        if let Some(ip) = self.driver.ip_info() {
            info.address = Some(ip.address);
            info.gateway = Some(ip.gateway);
            info.netmask = Some(ip.netmask);
        }
        if let Some(since) = state.connected_since {
            info.connected_ms = since.elapsed().as_millis() as u64;
        }
        info
    }

    /// Set `status` and deliver it to the callback.
    fn transition(&self, status: ConnectionStatus) {
        {
            let mut state = self.lock();
            state.status = status;
            if status != ConnectionStatus::Connected {
                state.connected_since = None;
            }
        }
        self.notify(status);
    }

    /// Deliver the current state to the callback.
    fn notify(&self, status: ConnectionStatus) {
        let info = {
            let state = self.lock();
            self.info_locked(&state)
        };

        tracing::debug!(status = %status, retry_count = info.retry_count, "Connection status");

        let callback = self
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(status, &info);
        }
    }

    fn handle_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::StationStarted => {
                let pending = {
                    let mut state = self.lock();
                    state.station_started = true;
                    state.status == ConnectionStatus::Connecting
                };
                tracing::debug!("Station started");
                if pending {
                    self.reassociate();
                }
            }
            LinkEvent::Disconnected { reason } => self.on_link_drop(reason),
            LinkEvent::GotIp(ip) => self.on_got_ip(ip),
            LinkEvent::ScanDone => {
                let results = self.driver.scan_results();
                tracing::debug!(count = results.len(), "Scan complete");
                self.lock().scan_results = Some(results);
            }
        }
    }

    fn on_link_drop(&self, reason: u8) {
        // Our own disconnect requests come back as leave events.
        if reason == REASON_ASSOC_LEAVE {
            tracing::debug!("Station left the network");
            return;
        }

        let step = {
            let mut state = self.lock();
            let Some(config) = state.config.clone() else {
                return;
            };
            match state.status {
                ConnectionStatus::Connecting if state.retry_count < config.max_retry => {
                    state.retry_count += 1;
                    DropStep::Retry(state.retry_count)
                }
                ConnectionStatus::Connecting => {
                    state.status = ConnectionStatus::Failed;
                    DropStep::Fail(state.retry_count)
                }
                ConnectionStatus::Connected if config.auto_reconnect => {
                    state.status = ConnectionStatus::Connecting;
                    state.retry_count = 0;
                    state.connected_since = None;
                    DropStep::Reconnect
                }
                ConnectionStatus::Connected => {
                    state.status = ConnectionStatus::Disconnected;
                    state.connected_since = None;
                    DropStep::Down
                }
                _ => return,
            }
        };

        match step {
            DropStep::Retry(attempt) => {
                tracing::info!(reason, attempt, "Link dropped, retrying");
                self.notify(ConnectionStatus::Connecting);
                self.reassociate();
            }
            DropStep::Fail(retries) => {
                tracing::warn!(reason, retries, "Retry budget exhausted");
                self.notify(ConnectionStatus::Failed);
                if let Some(signal) = self.signal() {
                    signal.set_failed();
                }
            }
            DropStep::Reconnect => {
                tracing::warn!(reason, "Link lost, reconnecting");
                self.notify(ConnectionStatus::Connecting);
                self.reassociate();
            }
            DropStep::Down => {
                tracing::warn!(reason, "Link lost");
                self.notify(ConnectionStatus::Disconnected);
            }
        }
    }

    fn on_got_ip(&self, ip: IpInfo) {
        {
            let mut state = self.lock();
            // A late address after a timeout or failure does not revive the link.
            if state.status != ConnectionStatus::Connecting {
                tracing::debug!(address = %ip.address, status = %state.status, "Ignoring late address");
                return;
            }
            state.status = ConnectionStatus::Connected;
            state.retry_count = 0;
            state.connected_since = Some(Instant::now());
        }

        tracing::info!(address = %ip.address, gateway = %ip.gateway, "Address assigned");
        self.notify(ConnectionStatus::Connected);
        if let Some(signal) = self.signal() {
            signal.set_connected();
        }
    }

    /// Settle a connect whose wait budget ran out.
    fn expire(&self, config: &ConnectionConfig) -> Result<()> {
        {
            let mut state = self.lock();
            match state.status {
                ConnectionStatus::Connected => return Ok(()),
                ConnectionStatus::Failed => {
                    return Err(Error::connection_failure(format!(
                        "could not associate with '{}' after {} retries",
                        config.ssid, config.max_retry
                    )));
                }
                // Torn down by `disconnect` or `deinit` while waiting.
                ConnectionStatus::Disconnected => {
                    return Err(Error::connection_failure(format!(
                        "connect to '{}' cancelled",
                        config.ssid
                    )));
                }
                _ => {
                    state.status = ConnectionStatus::TimedOut;
                    state.connected_since = None;
                }
            }
        }

        tracing::warn!(ssid = %config.ssid, timeout_ms = config.timeout_ms, "Connect timed out");
        self.notify(ConnectionStatus::TimedOut);
        if let Err(e) = self.driver.disconnect() {
            tracing::warn!(error = %e, "Link driver disconnect failed");
        }
        Err(Error::timeout(format!(
            "no association with '{}' within {} ms",
            config.ssid, config.timeout_ms
        )))
    }

    fn reassociate(&self) {
        if let Err(e) = self.driver.connect() {
            tracing::error!(error = %e, "Link driver connect failed");
        }
    }

    fn signal(&self) -> Option<Arc<ConnectSignal>> {
        self.lock().signal.clone()
    }
}

/// Clears the single-waiter flag when `connect` returns or is cancelled.
struct WaitingGuard<'a>(&'a Inner);

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().waiting = false;
    }
}

async fn dispatch(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
    tracing::debug!("Link event dispatcher stopped");
}
