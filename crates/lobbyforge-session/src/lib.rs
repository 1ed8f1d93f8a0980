//! Player presence and teleport hand-off for Lobbyforge.
//!
//! This crate answers two questions for one game server:
//!
//! 1. **Who is here?** — [`PresenceTracker`] knows which users have a live
//!    session on this server.
//! 2. **How do I get a user over there?** — [`TeleportCoordinator`] moves a
//!    user to a [`Location`](lobbyforge_protocol::Location) on any server,
//!    even one the user has not reached yet.
//!
//! # How it fits in the stack
//!
//! ```text
//! Node (above)            ← calls teleport() when a game starts
//!     ↕
//! Session Layer (here)    ← presence + pending teleports
//!     ↕                ↘
//! Store / Bus (below)     HostRuntime (the game server itself)
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod host;
mod presence;
mod teleport;

pub use config::TeleportConfig;
pub use error::SessionError;
pub use host::HostRuntime;
pub use presence::PresenceTracker;
pub use teleport::{TeleportCoordinator, TeleportOutcome};
