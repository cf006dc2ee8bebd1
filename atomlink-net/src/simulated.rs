//! Scripted in-process link driver.
//!
//! [`SimulatedLink`] stands in for a radio on hosts without one. Association
//! outcomes follow a [`LinkScript`]; events can be delayed to exercise the
//! timeout paths, and [`SimulatedLink::drop_link`] forces a link loss.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use atomlink_common::{AccessPointRecord, AuthMode, Error, IpInfo, Result};

use crate::config::ConnectionConfig;
use crate::driver::{
    EventSender, LinkDriver, LinkEvent, REASON_ASSOC_LEAVE, REASON_BEACON_TIMEOUT,
    REASON_NO_AP_FOUND,
};

/// How the simulated access point answers association requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LinkScript {
    /// Refuse the first `drops_before` requests after each configure, then associate.
    Associate {
        #[serde(default)]
        drops_before: u32,
    },
    /// Refuse every request.
    AlwaysDrop,
    /// Never answer.
    Silent,
}

impl Default for LinkScript {
    fn default() -> Self {
        LinkScript::Associate { drops_before: 0 }
    }
}

#[derive(Debug)]
struct SimState {
    events: Option<EventSender>,
    script: LinkScript,
    latency: Duration,
    networks: Vec<AccessPointRecord>,
    ip: IpInfo,
    fail_init: bool,
    config: Option<ConnectionConfig>,
    started: bool,
    associated: bool,
    attempts: u32,
    connect_calls: u32,
}

/// Link driver driven by a [`LinkScript`].
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedLink {
    pub fn new(script: LinkScript) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                events: None,
                script,
                latency: Duration::ZERO,
                networks: Vec::new(),
                ip: IpInfo {
                    address: Ipv4Addr::new(192, 168, 4, 20),
                    gateway: Ipv4Addr::new(192, 168, 4, 1),
                    netmask: Ipv4Addr::new(255, 255, 255, 0),
                },
                fail_init: false,
                config: None,
                started: false,
                associated: false,
                attempts: 0,
                connect_calls: 0,
            })),
        }
    }

    /// Delay every emitted event.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    /// Access points reported by scans.
    pub fn with_networks(self, networks: Vec<AccessPointRecord>) -> Self {
        self.lock().networks = networks;
        self
    }

    pub fn with_ip(self, ip: IpInfo) -> Self {
        self.lock().ip = ip;
        self
    }

    /// Make `init` report resource exhaustion.
    pub fn with_init_failure(self) -> Self {
        self.lock().fail_init = true;
        self
    }

    pub fn set_script(&self, script: LinkScript) {
        let mut state = self.lock();
        state.script = script;
        state.attempts = 0;
    }

    /// Total association requests received.
    pub fn connect_calls(&self) -> u32 {
        self.lock().connect_calls
    }

    pub fn is_associated(&self) -> bool {
        self.lock().associated
    }

    /// Lose the current association as if the access point vanished.
    pub fn drop_link(&self) {
        let mut state = self.lock();
        if state.associated {
            state.associated = false;
            tracing::debug!("Simulated link lost");
            Self::emit(
                &state,
                LinkEvent::Disconnected {
                    reason: REASON_BEACON_TIMEOUT,
                },
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(state: &SimState, event: LinkEvent) {
        let Some(events) = state.events.clone() else {
            return;
        };

        match (state.latency.is_zero(), Handle::try_current()) {
            (false, Ok(handle)) => {
                let latency = state.latency;
                handle.spawn(async move {
                    tokio::time::sleep(latency).await;
                    let _ = events.send(event);
                });
            }
            _ => {
                let _ = events.send(event);
            }
        }
    }

    fn require_init(state: &SimState) -> Result<()> {
        if state.events.is_none() {
            return Err(Error::invalid_state("simulated link not initialized"));
        }
        Ok(())
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new(LinkScript::default())
    }
}

impl LinkDriver for SimulatedLink {
    fn init(&self, events: EventSender) -> Result<()> {
        let mut state = self.lock();
        if state.fail_init {
            return Err(Error::OutOfMemory(
                "simulated link could not allocate driver resources".to_string(),
            ));
        }
        state.events = Some(events);
        Ok(())
    }

    fn deinit(&self) {
        let mut state = self.lock();
        state.events = None;
        state.started = false;
        state.associated = false;
    }

    fn configure(&self, config: &ConnectionConfig) -> Result<()> {
        let mut state = self.lock();
        Self::require_init(&state)?;
        state.config = Some(config.clone());
        state.attempts = 0;
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = self.lock();
        Self::require_init(&state)?;
        state.started = true;
        Self::emit(&state, LinkEvent::StationStarted);
        Ok(())
    }

    fn connect(&self) -> Result<()> {
        let mut state = self.lock();
        Self::require_init(&state)?;
        if !state.started {
            return Err(Error::invalid_state("station not started"));
        }

        state.connect_calls += 1;
        let attempt = state.attempts;
        state.attempts += 1;

        let associate = match state.script {
            LinkScript::Associate { drops_before } => attempt >= drops_before,
            LinkScript::AlwaysDrop => false,
            LinkScript::Silent => return Ok(()),
        };

        if associate {
            state.associated = true;
            let ip = state.ip;
            Self::emit(&state, LinkEvent::GotIp(ip));
        } else {
            state.associated = false;
            Self::emit(
                &state,
                LinkEvent::Disconnected {
                    reason: REASON_NO_AP_FOUND,
                },
            );
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        if state.associated {
            state.associated = false;
            Self::emit(
                &state,
                LinkEvent::Disconnected {
                    reason: REASON_ASSOC_LEAVE,
                },
            );
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.lock();
        state.started = false;
        state.associated = false;
        Ok(())
    }

    fn scan_start(&self) -> Result<()> {
        let state = self.lock();
        Self::require_init(&state)?;
        Self::emit(&state, LinkEvent::ScanDone);
        Ok(())
    }

    fn scan_results(&self) -> Vec<AccessPointRecord> {
        self.lock().networks.clone()
    }

    fn access_point(&self) -> Option<AccessPointRecord> {
        let state = self.lock();
        if !state.associated {
            return None;
        }
        let ssid = state.config.as_ref().map(|c| c.ssid.clone())?;

        let known = state.networks.iter().find(|ap| ap.ssid == ssid).cloned();
        Some(known.unwrap_or(AccessPointRecord {
            ssid,
            bssid: [0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01],
            channel: 6,
            rssi: -55,
            auth_mode: AuthMode::Wpa2Psk,
        }))
    }

    fn ip_info(&self) -> Option<IpInfo> {
        let state = self.lock();
        state.associated.then_some(state.ip)
    }
}
