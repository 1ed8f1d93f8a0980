//! Room coordination for Lobbyforge.
//!
//! Three components share one record store and together keep the
//! network's rooms consistent across every game server:
//!
//! - [`RoomRegistry`] — rooms, membership and ownership hand-over
//! - [`InviteLedger`] — time-limited invitations into rooms
//! - [`ArenaAllocator`] — exclusive claims on server-hosted arenas
//!
//! None of them cache anything: every operation reads the store, decides,
//! and writes back with the version it read.

mod arena;
mod config;
mod error;
mod invite;
mod registry;

pub use arena::ArenaAllocator;
pub use config::CoordinatorConfig;
pub use error::{ErrorKind, RoomError};
pub use invite::InviteLedger;
pub use registry::RoomRegistry;
