use medcall_core::utils::default_ice_servers;
use medcall_core::{IceServerConfig, RoomId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{CallError, Result};

pub const RELAY_URL_ENV: &str = "MEDCALL_RELAY_URL";
pub const STALL_TIMEOUT_ENV: &str = "MEDCALL_STALL_TIMEOUT_SECS";

/// Settings for one call session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Base URL of the signaling relay, e.g. `ws://localhost:8000`.
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,

    /// How long a call may sit in `Negotiating` or `Disconnected` before it
    /// is declared failed. `None` disables the watchdog.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: Option<u64>,

    /// Capacity of each internal event queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Gather 127.0.0.1 candidates. Only useful when both peers share a host.
    #[serde(default)]
    pub include_loopback_candidates: bool,
}

fn default_relay_url() -> String {
    "ws://localhost:8000".to_owned()
}

fn default_stall_timeout_secs() -> Option<u64> {
    Some(30)
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            ice_servers: default_ice_servers(),
            stall_timeout_secs: default_stall_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            include_loopback_candidates: false,
        }
    }
}

impl CallConfig {
    pub fn with_relay_url(mut self, url: impl Into<String>) -> Self {
        self.relay_url = url.into();
        self
    }

    pub fn with_ice_servers(mut self, ice_servers: Vec<IceServerConfig>) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout_secs = timeout.map(|t| t.as_secs().max(1));
        self
    }

    pub fn with_loopback_candidates(mut self, include: bool) -> Self {
        self.include_loopback_candidates = include;
        self
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_secs.map(Duration::from_secs)
    }

    /// Relay endpoint for a room: one ordered connection per room.
    pub fn room_url(&self, room: &RoomId) -> String {
        format!(
            "{}/ws/rtc/{}/",
            self.relay_url.trim_end_matches('/'),
            room.as_str()
        )
    }

    pub fn has_turn(&self) -> bool {
        self.ice_servers.iter().any(IceServerConfig::is_turn)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CallError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| CallError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Applies `MEDCALL_RELAY_URL` and `MEDCALL_STALL_TIMEOUT_SECS` when set.
    /// A stall timeout of `0` disables the watchdog.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(RELAY_URL_ENV) {
            self.relay_url = url;
        }
        if let Ok(raw) = std::env::var(STALL_TIMEOUT_ENV) {
            match raw.parse::<u64>() {
                Ok(0) => self.stall_timeout_secs = None,
                Ok(secs) => self.stall_timeout_secs = Some(secs),
                Err(e) => warn!("Ignoring {}={:?}: {}", STALL_TIMEOUT_ENV, raw, e),
            }
        }
        self
    }
}
