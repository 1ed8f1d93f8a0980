//! # Lobbyforge
//!
//! Cross-server game rooms, invites and arena coordination.
//!
//! Each game server in a network runs one [`LobbyNode`]. The nodes share a
//! record store (rooms, invites, arenas, pending teleports) and talk over
//! an event bus. Together they make sure that:
//!
//! - a player is in at most one room, wherever they are connected
//! - two rooms never play in the same arena
//! - a teleport reaches its player, even one that has not joined yet
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbyforge::prelude::*;
//!
//! // Implement HostRuntime for your game server, then:
//! // let bus = LocalBus::new();
//! // let (endpoint, inbox) = bus.connect("lobby").await?;
//! // let node = LobbyNodeBuilder::new(NodeConfig::default())
//! //     .build(MemoryStore::new(), endpoint, MyHost);
//! // tokio::spawn(node.clone().run(inbox));
//! // node.player_joined(user, "Steve").await?;
//! ```

mod config;
mod error;
mod handler;
mod logging;
mod node;

pub use config::{BusSettings, NodeConfig};
pub use error::LobbyError;
pub use logging::init_tracing;
pub use node::{LobbyNode, LobbyNodeBuilder};

pub use lobbyforge_bus as bus;
pub use lobbyforge_protocol as protocol;
pub use lobbyforge_room as room;
pub use lobbyforge_session as session;
pub use lobbyforge_store as store;

/// Everything an embedding game server usually needs.
pub mod prelude {
    pub use crate::{init_tracing, LobbyError, LobbyNode, LobbyNodeBuilder, NodeConfig};
    pub use lobbyforge_bus::{EventBus, Inbox, LocalBus, LocalEndpoint};
    pub use lobbyforge_protocol::{
        Arena, ArenaId, GameType, Invite, InviteId, Location, Room, RoomId, UserId,
    };
    pub use lobbyforge_room::{CoordinatorConfig, ErrorKind};
    pub use lobbyforge_session::{HostRuntime, SessionError, TeleportConfig, TeleportOutcome};
    pub use lobbyforge_store::{MemoryStore, RecordStore};
}
