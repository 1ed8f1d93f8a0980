//! Shared vocabulary for Lobbyforge.
//!
//! This crate defines the "language" every other Lobbyforge crate speaks:
//!
//! - **Identity and place** ([`UserId`], [`RoomId`], [`ArenaId`],
//!   [`InviteId`], [`GameType`], [`Location`]).
//! - **Records** ([`Room`], [`Invite`], [`Arena`], [`PendingTeleport`],
//!   [`UserRecord`]) — the typed rows kept in the shared record store.
//! - **Bus messages** ([`Envelope`], [`BusEvent`], [`EventReply`],
//!   [`Reply`]) — what game servers say to each other.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how bus messages become
//!   bytes and back.
//! - **Clock** ([`Clock`], [`SystemClock`], [`ManualClock`]) — the time
//!   source for every TTL decision.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about storage engines, transports or
//! game logic. It only describes data.
//!
//! ```text
//! Store / Bus (plumbing) → Protocol (shared types) → Room / Session (rules)
//! ```

mod clock;
mod codec;
mod error;
mod message;
mod records;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{BusEvent, Envelope, EventReply, Reply};
pub use records::{Arena, Invite, PendingTeleport, Room, UserRecord};
pub use types::{ArenaId, GameType, InviteId, Location, RoomId, UserId};
