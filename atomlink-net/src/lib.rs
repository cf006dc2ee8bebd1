//! Station-mode connection management for the atomlink node.
//!
//! [`ConnectionManager`] brings a wireless link up, retries failed
//! associations up to a budget, and reports every status change through a
//! callback. The radio itself sits behind the [`LinkDriver`] capability;
//! [`SimulatedLink`] implements it for hosts and tests.
//!
//! ```ignore
//! let link = Arc::new(SimulatedLink::default());
//! let manager = ConnectionManager::new(link);
//! manager.init()?;
//! manager.set_callback(|status, info| tracing::info!(%status, rssi = info.rssi, "link"));
//! manager.connect(&ConnectionConfig::new("ros2_atom_ap", "secret")).await?;
//! ```

pub mod config;
pub mod driver;
pub mod manager;
pub mod signal;
pub mod simulated;

pub use config::{ConnectionConfig, MAX_PASSWORD_LEN, MAX_SSID_LEN};
pub use driver::{EventSender, LinkDriver, LinkEvent};
pub use manager::{ConnectionManager, StatusCallback};
pub use signal::{ConnectSignal, LinkFlags};
pub use simulated::{LinkScript, SimulatedLink};
