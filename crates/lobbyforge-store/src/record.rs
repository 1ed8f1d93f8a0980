//! The [`Record`] trait and its implementations for the shared record types.

use std::fmt;

use lobbyforge_protocol::{Arena, Invite, PendingTeleport, Room, UserRecord};
use serde::{de::DeserializeOwned, Serialize};

/// Which table a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Room,
    Invite,
    Arena,
    PendingTeleport,
    User,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Room => "room",
            Self::Invite => "invite",
            Self::Arena => "arena",
            Self::PendingTeleport => "pending_teleport",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// A typed row that can live in a [`RecordStore`](crate::RecordStore).
pub trait Record:
    Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// The table this type is stored in.
    const KIND: RecordKind;

    /// The primary key within [`Self::KIND`].
    fn key(&self) -> String;

    /// The version this copy was read at (0 = never stored).
    fn version(&self) -> u64;

    /// Overwrites the version. Only the store calls this.
    fn set_version(&mut self, version: u64);
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr, |$this:ident| $key:expr) => {
        impl Record for $ty {
            const KIND: RecordKind = $kind;

            fn key(&self) -> String {
                let $this = self;
                $key
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn set_version(&mut self, version: u64) {
                self.version = version;
            }
        }
    };
}

impl_record!(Room, RecordKind::Room, |r| r.id.key());
impl_record!(Invite, RecordKind::Invite, |i| i.id.key());
impl_record!(Arena, RecordKind::Arena, |a| a.id.key());
// One pending teleport per user: the user id is the key.
impl_record!(PendingTeleport, RecordKind::PendingTeleport, |p| p.user.key());
impl_record!(UserRecord, RecordKind::User, |u| u.id.key());
