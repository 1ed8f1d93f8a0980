//! Settings shared by the room, invite and arena components.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the coordination components.
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// How long an invite stays valid after it is sent.
    pub invite_ttl_secs: u64,

    /// How many times a version-checked arena write is attempted before
    /// the operation gives up with `Contended`.
    pub claim_retry_limit: u32,

    /// Upper bound of the random pause between two attempts. Spreads out
    /// servers that keep colliding on the same arena.
    pub retry_jitter_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            invite_ttl_secs: 300,
            claim_retry_limit: 5,
            retry_jitter_ms: 25,
        }
    }
}

impl CoordinatorConfig {
    /// The invite validity window as a `Duration`.
    pub fn invite_ttl(&self) -> Duration {
        Duration::from_secs(self.invite_ttl_secs)
    }

    /// The invite validity window in milliseconds, saturating instead of
    /// wrapping.
    pub fn invite_ttl_ms(&self) -> u64 {
        self.invite_ttl_secs.saturating_mul(1_000)
    }
}
