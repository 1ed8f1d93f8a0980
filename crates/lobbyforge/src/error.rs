//! Unified error type for Lobbyforge.

use std::path::PathBuf;

use lobbyforge_bus::BusError;
use lobbyforge_protocol::{ArenaId, GameType, ProtocolError, RoomId, UserId};
use lobbyforge_room::{ErrorKind, RoomError};
use lobbyforge_session::SessionError;
use lobbyforge_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// Callers of [`LobbyNode`](crate::LobbyNode) deal with this one type.
/// The `#[from]` attributes let `?` convert sub-crate errors on the way up.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// No free arena admits the room's member count.
    #[error("no arena available for room {0}")]
    NoArenaAvailable(RoomId),

    /// Private rooms are joined through invites only.
    #[error("room {0} is private")]
    RoomPrivate(RoomId),

    /// The user is not in any room.
    #[error("user {0} is not in a room")]
    NotInRoom(UserId),

    /// The room is not playing in any arena.
    #[error("room {0} is not in a game")]
    NotInGame(RoomId),

    /// A room picked an arena built for another game.
    #[error("arena {arena} hosts {found}, room plays {expected}")]
    GameTypeMismatch {
        arena: ArenaId,
        expected: GameType,
        found: GameType,
    },

    #[error("cannot read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[source] serde_json::Error),
}

impl LobbyError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Room(e) => e.kind(),
            Self::Store(e) | Self::Session(SessionError::Store(e)) => store_kind(e),
            Self::Session(e) => match e {
                SessionError::NotFound(_) | SessionError::UnknownWorld(_) => ErrorKind::NotFound,
                SessionError::AlreadyConnected(_) | SessionError::Contended(_) => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::Unavailable,
            },
            Self::NoArenaAvailable(_) | Self::NotInRoom(_) | Self::NotInGame(_) => {
                ErrorKind::NotFound
            }
            Self::RoomPrivate(_) => ErrorKind::Unauthorized,
            Self::GameTypeMismatch { .. } => ErrorKind::Conflict,
            Self::Protocol(_) | Self::Bus(_) | Self::ConfigRead { .. } | Self::ConfigParse(_) => {
                ErrorKind::Unavailable
            }
        }
    }
}

fn store_kind(e: &StoreError) -> ErrorKind {
    if e.is_conflict() {
        ErrorKind::Conflict
    } else {
        ErrorKind::Unavailable
    }
}
