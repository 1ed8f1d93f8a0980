//! Node configuration, loadable from JSON.

use std::path::Path;
use std::time::Duration;

use lobbyforge_bus::LocalBusConfig;
use lobbyforge_room::CoordinatorConfig;
use lobbyforge_session::TeleportConfig;
use serde::{Deserialize, Serialize};

use crate::LobbyError;

/// Everything a [`LobbyNode`](crate::LobbyNode) can be tuned with.
///
/// Any field missing from a config file keeps its default:
///
/// ```rust
/// use lobbyforge::NodeConfig;
///
/// let config = NodeConfig::from_json_str(r#"{ "coordinator": { "invite_ttl_secs": 30 } }"#)
///     .unwrap();
/// assert_eq!(config.coordinator.invite_ttl_secs, 30);
/// assert_eq!(config.teleport.pending_ttl_secs, 120);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub coordinator: CoordinatorConfig,
    pub teleport: TeleportConfig,
    pub bus: BusSettings,
}

/// Bus settings that can live in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// How long a call waits for each server's answer.
    pub call_timeout_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 2_000,
        }
    }
}

impl BusSettings {
    /// Settings for an in-process [`LocalBus`](lobbyforge_bus::LocalBus).
    pub fn local_bus_config(&self) -> LocalBusConfig {
        LocalBusConfig {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

impl NodeConfig {
    /// Parses a config from JSON text.
    ///
    /// # Errors
    /// [`LobbyError::ConfigParse`] if the text is not valid config JSON.
    pub fn from_json_str(json: &str) -> Result<Self, LobbyError> {
        serde_json::from_str(json).map_err(LobbyError::ConfigParse)
    }

    /// Reads and parses a JSON config file.
    ///
    /// # Errors
    /// - [`LobbyError::ConfigRead`] if the file cannot be read
    /// - [`LobbyError::ConfigParse`] if its content is not valid config JSON
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LobbyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LobbyError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
