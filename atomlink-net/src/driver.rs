//! Link driver capability.
//!
//! The connection manager never talks to a radio directly. It drives a
//! [`LinkDriver`] and reacts to the [`LinkEvent`]s the driver pushes back
//! through the sender handed to [`LinkDriver::init`].

use tokio::sync::mpsc::UnboundedSender;

use atomlink_common::{AccessPointRecord, IpInfo, Result};

use crate::config::ConnectionConfig;

/// Disconnect reason: beacon timeout (link lost while associated).
pub const REASON_BEACON_TIMEOUT: u8 = 200;

/// Disconnect reason: no access point found for the configured SSID.
pub const REASON_NO_AP_FOUND: u8 = 201;

/// Disconnect reason: the station asked to leave.
pub const REASON_ASSOC_LEAVE: u8 = 8;

/// Asynchronous notifications raised by the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The station interface is up and ready to associate.
    StationStarted,
    /// Association was lost or could not be established.
    Disconnected { reason: u8 },
    /// An address was assigned.
    GotIp(IpInfo),
    /// A scan finished; results are available from the driver.
    ScanDone,
}

pub type EventSender = UnboundedSender<LinkEvent>;

/// Operations the connection manager needs from a wireless link.
///
/// Calls must not block; outcomes arrive later as [`LinkEvent`]s.
pub trait LinkDriver: Send + Sync {
    /// Prepare the driver and keep `events` for later notifications.
    fn init(&self, events: EventSender) -> Result<()>;

    /// Release driver resources and drop the event sender.
    fn deinit(&self);

    /// Apply station credentials.
    fn configure(&self, config: &ConnectionConfig) -> Result<()>;

    /// Bring the station interface up. Emits [`LinkEvent::StationStarted`].
    fn start(&self) -> Result<()>;

    /// Start (or re-issue) association with the configured network.
    fn connect(&self) -> Result<()>;

    /// Leave the current network.
    fn disconnect(&self) -> Result<()>;

    /// Bring the station interface down.
    fn stop(&self) -> Result<()>;

    /// Start an access point scan. Emits [`LinkEvent::ScanDone`].
    fn scan_start(&self) -> Result<()>;

    /// Records from the last completed scan.
    fn scan_results(&self) -> Vec<AccessPointRecord>;

    /// The access point currently associated with, if any.
    fn access_point(&self) -> Option<AccessPointRecord>;

    /// Addressing of the station interface, if assigned.
    fn ip_info(&self) -> Option<IpInfo>;
}
