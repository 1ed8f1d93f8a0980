//! Identity and place types shared by every Lobbyforge crate.
//!
//! Every identifier is a "newtype wrapper" around a [`Uuid`]. Game servers
//! already identify players by UUID, and rooms, invites and arenas are
//! created concurrently by independent processes, so a random v4 UUID is
//! the simplest way to get ids that never collide without coordination.
//!
//! `#[serde(transparent)]` makes each id serialize as the bare UUID string,
//! not as `{ "0": "..." }`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Declares a UUID-backed identifier with a short display prefix.
///
/// The prefix only affects `Display` (log output); the wire and store
/// representation is always the plain UUID.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            pub fn into_inner(self) -> Uuid {
                self.0
            }

            /// The key this id is stored under in a record store.
            pub fn key(&self) -> String {
                self.0.to_string()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// A player, identified by the UUID the game network assigns them.
    UserId,
    "U"
);

uuid_id!(
    /// A player-formed lobby that exists before a match starts.
    RoomId,
    "R"
);

uuid_id!(
    /// An invitation into a room.
    InviteId,
    "I"
);

uuid_id!(
    /// A concrete, server-hosted game instance with capacity bounds.
    ArenaId,
    "A"
);

/// The kind of game a room wants to play and an arena hosts
/// (e.g. `"bedwars"`).
///
/// Game types are compared case-sensitively. Rooms and arenas must agree
/// exactly for an arena to be offered to a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameType(pub String);

impl GameType {
    /// Creates a game type from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the game type name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameType {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Where a player should end up.
///
/// A location always names a server. When `world` is `None` the location
/// means "just put them on that server, anywhere" — the coordinates are
/// ignored and the destination server's default spawn applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// The game server that must host the player.
    pub server_name: String,
    /// The world on that server, or `None` for "no specific position".
    pub world: Option<String>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    /// A location that only names a server.
    pub fn server(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            world: None,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// A precise position in a named world on a server.
    pub fn at(
        server_name: impl Into<String>,
        world: impl Into<String>,
        x: f64,
        y: f64,
        z: f64,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            world: Some(world.into()),
            x,
            y,
            z,
        }
    }

    /// Returns `true` if this location has no position, only a server.
    pub fn is_server_only(&self) -> bool {
        self.world.is_none()
    }

    /// Returns `true` if this location is on the named server. Server
    /// names compare case-insensitively.
    pub fn is_on(&self, server_name: &str) -> bool {
        self.server_name.eq_ignore_ascii_case(server_name)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.world {
            None => write!(f, "{}", self.server_name),
            Some(world) => write!(
                f,
                "{}/{}@({:.1}, {:.1}, {:.1})",
                self.server_name, world, self.x, self.y, self.z
            ),
        }
    }
}
