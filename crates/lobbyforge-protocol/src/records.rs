//! Typed records kept in the shared record store.
//!
//! Every record carries a `version` field. It is owned by the store: a
//! record that was never written has version 0, and each successful write
//! bumps it by one. Writers hand back the version they read, and the store
//! refuses the write if someone else got there first. That is how two game
//! servers racing on the same row are kept from silently overwriting each
//! other.

use serde::{Deserialize, Serialize};

use crate::{ArenaId, GameType, InviteId, Location, RoomId, UserId};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A player-formed lobby for one game type.
///
/// `members` is kept in join order and never contains duplicates. The owner
/// is always one of the members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub owner: UserId,
    pub members: Vec<UserId>,
    pub game_type: GameType,
    pub is_private: bool,
    pub created_at_ms: u64,
    #[serde(default)]
    pub version: u64,
}

impl Room {
    /// Creates a room whose only member is its owner.
    pub fn new(
        owner: UserId,
        game_type: GameType,
        is_private: bool,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id: RoomId::random(),
            owner,
            members: vec![owner],
            game_type,
            is_private,
            created_at_ms,
            version: 0,
        }
    }

    /// Returns `true` if the user is a member (the owner included).
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    /// Returns `true` if the user owns the room.
    pub fn is_owner(&self, user: &UserId) -> bool {
        self.owner == *user
    }

    /// Number of members, owner included.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

// ---------------------------------------------------------------------------
// Invite
// ---------------------------------------------------------------------------

/// An invitation for one user to join one room, valid for `ttl_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub id: InviteId,
    pub room_id: RoomId,
    pub invited_user: UserId,
    pub invited_by: UserId,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
    #[serde(default)]
    pub version: u64,
}

impl Invite {
    /// The instant (in epoch milliseconds) from which the invite is dead.
    pub fn expires_at_ms(&self) -> u64 {
        self.created_at_ms.saturating_add(self.ttl_ms)
    }

    /// Returns `true` once `now_ms` has reached the end of the window.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms()
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// A game instance on a specific server, claimable by one room at a time.
///
/// ```text
///  Free ──claim──→ Claimed ──activate──→ Activated
///   ↑                 │                      │
///   └────release──────┴──────release─────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arena {
    pub id: ArenaId,
    pub game_type: GameType,
    pub server_name: String,
    pub map_name: String,
    pub min_players: usize,
    pub max_players: usize,
    pub claimed_by: Option<RoomId>,
    pub activated: bool,
    pub provisioned_at_ms: u64,
    #[serde(default)]
    pub version: u64,
}

impl Arena {
    /// Creates a free arena. Used by provisioning tools and tests.
    pub fn new(
        game_type: GameType,
        server_name: impl Into<String>,
        map_name: impl Into<String>,
        min_players: usize,
        max_players: usize,
        provisioned_at_ms: u64,
    ) -> Self {
        Self {
            id: ArenaId::random(),
            game_type,
            server_name: server_name.into(),
            map_name: map_name.into(),
            min_players,
            max_players,
            claimed_by: None,
            activated: false,
            provisioned_at_ms,
            version: 0,
        }
    }

    /// Returns `true` if `count` players fit within `[min, max]`.
    pub fn admits(&self, count: usize) -> bool {
        count >= self.min_players && count <= self.max_players
    }

    /// Returns `true` if a new claim could be considered at all.
    pub fn is_available(&self) -> bool {
        !self.activated
    }

    /// Where members are sent when the game starts.
    pub fn location(&self) -> Location {
        Location::server(self.server_name.clone())
    }
}

// ---------------------------------------------------------------------------
// PendingTeleport
// ---------------------------------------------------------------------------

/// A teleport waiting for its user to show up on any server.
///
/// Keyed by user: a newer request replaces an older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTeleport {
    pub user: UserId,
    pub location: Location,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
    #[serde(default)]
    pub version: u64,
}

impl PendingTeleport {
    /// Returns `true` once the entry has outlived its window.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.created_at_ms.saturating_add(self.ttl_ms)
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// What the network remembers about a player between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    /// The server the user most recently established a session on.
    pub last_server: Option<String>,
    #[serde(default)]
    pub version: u64,
}
