use serde::{Deserialize, Serialize};

use atomlink_common::{Error, Result};

/// Longest SSID a station can associate with, in bytes.
pub const MAX_SSID_LEN: usize = 32;

/// Longest pre-shared key accepted, in bytes.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Station connection settings handed to [`ConnectionManager::connect`].
///
/// [`ConnectionManager::connect`]: crate::ConnectionManager::connect
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Network name.
    pub ssid: String,

    /// Pre-shared key; empty for open networks.
    #[serde(default)]
    pub password: String,

    /// Reconnect attempts after the first association fails.
    #[serde(default = "default_max_retry")]
    pub max_retry: u8,

    /// Upper bound on the blocking connect wait, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,

    /// Re-associate on an unsolicited drop while connected.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
}

fn default_max_retry() -> u8 {
    5
}

fn default_timeout_ms() -> u32 {
    15_000
}

fn default_auto_reconnect() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ssid: "ros2_atom_ap".to_string(),
            password: String::new(),
            max_retry: default_max_retry(),
            timeout_ms: default_timeout_ms(),
            auto_reconnect: default_auto_reconnect(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_max_retry(mut self, max_retry: u8) -> Self {
        self.max_retry = max_retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Check field bounds.
    pub fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(Error::invalid_argument("ssid must not be empty"));
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(Error::invalid_argument(format!(
                "ssid is {} bytes, at most {} allowed",
                self.ssid.len(),
                MAX_SSID_LEN
            )));
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(Error::invalid_argument(format!(
                "password is {} bytes, at most {} allowed",
                self.password.len(),
                MAX_PASSWORD_LEN
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::invalid_argument("timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

// The credential never reaches the logs.
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("max_retry", &self.max_retry)
            .field("timeout_ms", &self.timeout_ms)
            .field("auto_reconnect", &self.auto_reconnect)
            .finish()
    }
}
