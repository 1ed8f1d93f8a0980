//! Error types for the room layer.

use std::fmt;

use lobbyforge_protocol::{ArenaId, InviteId, RoomId, UserId};
use lobbyforge_store::StoreError;

/// Errors that can occur during room, invite and arena operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    // -- Rooms --
    /// The room does not exist.
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The user already belongs to a room.
    #[error("user {0} is already in room {1}")]
    AlreadyInRoom(UserId, RoomId),

    /// The user is not a member of this room.
    #[error("user {0} is not a member of room {1}")]
    NotAMember(UserId, RoomId),

    /// An owner-only action was attempted by someone else.
    #[error("user {0} does not own room {1}")]
    NotOwner(UserId, RoomId),

    // -- Invites --
    /// No such invite for this user.
    #[error("invite {0} not found")]
    InviteNotFound(InviteId),

    /// The invite's validity window has closed.
    #[error("invite {0} has expired")]
    InviteExpired(InviteId),

    /// A live invite for this user and room already exists.
    #[error("user {0} has already been invited to room {1}")]
    AlreadyInvited(UserId, RoomId),

    /// The invited user's room is playing in an arena right now.
    #[error("user {0} is currently in a game")]
    TargetInGame(UserId),

    /// The room being joined is playing in an arena right now.
    #[error("room {0} is currently in a game")]
    RoomInGame(RoomId),

    // -- Arenas --
    /// The arena does not exist.
    #[error("arena {0} not found")]
    ArenaNotFound(ArenaId),

    /// Another room holds the arena.
    #[error("arena {arena} is already claimed by room {holder}")]
    ArenaAlreadyClaimed { arena: ArenaId, holder: RoomId },

    /// The room is too small for the arena.
    #[error("arena {arena} needs at least {min} players, room has {count}")]
    TooFewPlayers {
        arena: ArenaId,
        count: usize,
        min: usize,
    },

    /// The room is too big for the arena.
    #[error("arena {arena} allows at most {max} players, room has {count}")]
    TooManyPlayers {
        arena: ArenaId,
        count: usize,
        max: usize,
    },

    /// Activation needs a claim first.
    #[error("arena {0} has not been claimed")]
    ArenaNotClaimed(ArenaId),

    /// Every version-checked attempt lost to another writer.
    #[error("arena {0} is under contention, try again")]
    Contended(ArenaId),

    // -- Plumbing --
    /// The record store failed or a concurrent write won.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification of errors, used to pick user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Something the caller named does not exist.
    NotFound,
    /// The request clashes with current state (membership, claims,
    /// capacity, concurrent writers).
    Conflict,
    /// The caller may not do this.
    Unauthorized,
    /// The thing existed but its time ran out.
    Expired,
    /// Infrastructure trouble; not the caller's fault.
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Unauthorized => "unauthorized",
            Self::Expired => "expired",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

impl RoomError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RoomNotFound(_)
            | Self::InviteNotFound(_)
            | Self::ArenaNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyInRoom(..)
            | Self::NotAMember(..)
            | Self::AlreadyInvited(..)
            | Self::TargetInGame(_)
            | Self::RoomInGame(_)
            | Self::ArenaAlreadyClaimed { .. }
            | Self::TooFewPlayers { .. }
            | Self::TooManyPlayers { .. }
            | Self::ArenaNotClaimed(_)
            | Self::Contended(_) => ErrorKind::Conflict,
            Self::NotOwner(..) => ErrorKind::Unauthorized,
            Self::InviteExpired(_) => ErrorKind::Expired,
            Self::Store(e) if e.is_conflict() => ErrorKind::Conflict,
            Self::Store(_) => ErrorKind::Unavailable,
        }
    }
}
