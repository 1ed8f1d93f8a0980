//! Error types for the session layer.

use lobbyforge_bus::BusError;
use lobbyforge_protocol::UserId;
use lobbyforge_store::StoreError;

/// Errors that can occur while tracking presence or moving players.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session exists for the user on this server.
    #[error("no session for user {0}")]
    NotFound(UserId),

    /// The user already has a session on this server.
    #[error("user {0} already has an active session")]
    AlreadyConnected(UserId),

    /// The host has no world by this name. Reported by the server that
    /// was asked to place the player.
    #[error("unknown world {0}")]
    UnknownWorld(String),

    /// The host refused or failed to move the player.
    #[error("host runtime failed: {0}")]
    Host(String),

    /// A pending teleport kept changing under us.
    #[error("pending teleport for user {0} is under contention")]
    Contended(UserId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),
}
