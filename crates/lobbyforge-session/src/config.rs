use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the [`TeleportCoordinator`](crate::TeleportCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleportConfig {
    /// How long a queued teleport waits for its user before it is
    /// silently dropped.
    pub pending_ttl_secs: u64,
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 120,
        }
    }
}

impl TeleportConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    /// The TTL in milliseconds, saturating instead of wrapping.
    pub fn pending_ttl_ms(&self) -> u64 {
        self.pending_ttl_secs.saturating_mul(1_000)
    }
}
