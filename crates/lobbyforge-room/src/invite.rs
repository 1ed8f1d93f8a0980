//! Invite ledger: time-limited invitations into rooms.

use std::sync::Arc;

use lobbyforge_protocol::{Clock, Invite, InviteId, Room, RoomId, UserId};
use lobbyforge_store::RecordStore;
use tokio::sync::Mutex;

use crate::{ArenaAllocator, CoordinatorConfig, RoomError, RoomRegistry};

/// Owns every [`Invite`] record and acts on the registry when one is
/// accepted.
///
/// An invite is *live* while all of these hold:
/// - its validity window has not closed
/// - its room still exists
/// - its room is not playing in an activated arena
///
/// Dead invites are never swept in the background. Whoever reads one
/// deletes it.
pub struct InviteLedger<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    rooms: Arc<RoomRegistry<S>>,
    arenas: Arc<ArenaAllocator<S>>,
    write_lock: Mutex<()>,
}

impl<S: RecordStore> InviteLedger<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
        rooms: Arc<RoomRegistry<S>>,
        arenas: Arc<ArenaAllocator<S>>,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            rooms,
            arenas,
            write_lock: Mutex::new(()),
        }
    }

    /// Invites `target` into `room_id` on behalf of the room's owner.
    ///
    /// # Errors
    /// - [`RoomError::RoomNotFound`] if the room does not exist
    /// - [`RoomError::NotOwner`] if `by` does not own the room
    /// - [`RoomError::TargetInGame`] if the target's room is in a game
    /// - [`RoomError::AlreadyInvited`] if a live invite already exists
    pub async fn invite(
        &self,
        room_id: RoomId,
        by: UserId,
        target: UserId,
    ) -> Result<Invite, RoomError> {
        let _guard = self.write_lock.lock().await;

        let room = self.rooms.get_room(room_id).await?;
        if !room.is_owner(&by) {
            return Err(RoomError::NotOwner(by, room_id));
        }
        if let Some(target_room) = self.rooms.get_room_for_user(target).await? {
            if self.arenas.arena_for_room(target_room.id).await?.is_some() {
                return Err(RoomError::TargetInGame(target));
            }
        }

        let existing = self
            .store
            .list::<Invite, _>(move |i| i.room_id == room_id && i.invited_user == target)
            .await?;
        for invite in existing {
            if self.is_live(&invite).await? {
                return Err(RoomError::AlreadyInvited(target, room_id));
            }
            self.discard(&invite).await?;
        }

        let invite = Invite {
            id: InviteId::random(),
            room_id,
            invited_user: target,
            invited_by: by,
            created_at_ms: self.clock.now_ms(),
            ttl_ms: self.config.invite_ttl_ms(),
            version: 0,
        };
        let invite = self.store.insert_or_update(&invite).await?;
        tracing::info!(invite_id = %invite.id, %room_id, %by, %target, "invite sent");
        Ok(invite)
    }

    /// The user's live invites, oldest first. Dead ones are deleted on the
    /// way.
    pub async fn list_live_invites(
        &self,
        user: UserId,
    ) -> Result<Vec<Invite>, RoomError> {
        let _guard = self.write_lock.lock().await;

        let invites = self
            .store
            .list::<Invite, _>(move |i| i.invited_user == user)
            .await?;

        let mut live = Vec::with_capacity(invites.len());
        for invite in invites {
            if self.is_live(&invite).await? {
                live.push(invite);
            } else {
                self.discard(&invite).await?;
            }
        }
        Ok(live)
    }

    /// Returns `true` if the room has a live invite out for the user.
    /// Dead ones found on the way are deleted.
    pub async fn has_been_invited(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<bool, RoomError> {
        let _guard = self.write_lock.lock().await;

        let invites = self
            .store
            .list::<Invite, _>(move |i| i.room_id == room_id && i.invited_user == user)
            .await?;
        let mut invited = false;
        for invite in invites {
            if self.is_live(&invite).await? {
                invited = true;
            } else {
                self.discard(&invite).await?;
            }
        }
        Ok(invited)
    }

    /// Accepts an invite: the user leaves their current room (handing over
    /// or destroying it as usual) and joins the invite's room.
    ///
    /// The invite is consumed whatever the outcome, unless it was not
    /// addressed to `user`.
    ///
    /// # Errors
    /// - [`RoomError::InviteNotFound`] if it does not exist or is someone
    ///   else's
    /// - [`RoomError::InviteExpired`] if its window has closed
    /// - [`RoomError::RoomNotFound`] if the room is gone
    /// - [`RoomError::RoomInGame`] if the room is playing in an arena
    pub async fn accept(
        &self,
        invite_id: InviteId,
        user: UserId,
    ) -> Result<Room, RoomError> {
        let _guard = self.write_lock.lock().await;

        let invite = self
            .store
            .get::<Invite>(&invite_id.key())
            .await?
            .filter(|i| i.invited_user == user)
            .ok_or(RoomError::InviteNotFound(invite_id))?;

        self.store.delete(&invite).await?;

        if invite.is_expired(self.clock.now_ms()) {
            tracing::debug!(%invite_id, %user, "expired invite consumed");
            return Err(RoomError::InviteExpired(invite_id));
        }

        let room_id = invite.room_id;
        self.rooms.get_room(room_id).await?;
        if self.arenas.arena_for_room(room_id).await?.is_some() {
            return Err(RoomError::RoomInGame(room_id));
        }

        let room = self.rooms.move_member(room_id, user).await?;
        tracing::info!(%invite_id, %room_id, %user, "invite accepted");
        Ok(room)
    }

    /// Throws an invite away. Declining twice, or declining an invite that
    /// never existed, is fine.
    pub async fn decline(&self, invite_id: InviteId) -> Result<(), RoomError> {
        let _guard = self.write_lock.lock().await;

        if let Some(invite) = self.store.get::<Invite>(&invite_id.key()).await? {
            self.store.delete(&invite).await?;
            tracing::info!(%invite_id, user = %invite.invited_user, "invite declined");
        }
        Ok(())
    }

    async fn is_live(&self, invite: &Invite) -> Result<bool, RoomError> {
        if invite.is_expired(self.clock.now_ms()) {
            return Ok(false);
        }
        match self.rooms.get_room(invite.room_id).await {
            Ok(_) => {}
            Err(RoomError::RoomNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        }
        Ok(self.arenas.arena_for_room(invite.room_id).await?.is_none())
    }

    /// Deletes a dead invite. Losing the race to another reader is fine.
    async fn discard(&self, invite: &Invite) -> Result<(), RoomError> {
        match self.store.delete(invite).await {
            Ok(()) => {
                tracing::debug!(invite_id = %invite.id, "stale invite removed");
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use lobbyforge_protocol::{Arena, GameType, ManualClock};
    use lobbyforge_store::{MemoryStore, RecordKind};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: ManualClock,
        rooms: Arc<RoomRegistry<MemoryStore>>,
        arenas: Arc<ArenaAllocator<MemoryStore>>,
        ledger: InviteLedger<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(10_000);
        let config = CoordinatorConfig::default();
        let rooms = Arc::new(RoomRegistry::new(store.clone(), Arc::new(clock.clone())));
        let arenas = Arc::new(ArenaAllocator::new(store.clone(), config.clone()));
        let ledger = InviteLedger::new(
            store.clone(),
            Arc::new(clock.clone()),
            config,
            rooms.clone(),
            arenas.clone(),
        );
        Fixture { store, clock, rooms, arenas, ledger }
    }

    impl Fixture {
        async fn room(&self) -> (UserId, Room) {
            let owner = UserId::random();
            let room = self
                .rooms
                .create_room(owner, GameType::new("bedwars"), false)
                .await
                .unwrap();
            (owner, room)
        }

        async fn put_in_game(&self, room: &Room) {
            let arena = Arena::new(GameType::new("bedwars"), "bw-1", "lighthouse", 1, 8, 0);
            let arena = self.store.insert_or_update(&arena).await.unwrap();
            self.arenas.claim(arena.id, room.id, room.member_count()).await.unwrap();
            self.arenas.activate(arena.id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_invite_by_non_owner_fails() {
        let f = fixture();
        let (_, room) = f.room().await;

        let result = f.ledger.invite(room.id, UserId::random(), UserId::random()).await;

        assert!(matches!(result, Err(RoomError::NotOwner(..))));
    }

    #[tokio::test]
    async fn test_invite_twice_fails_while_live() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let target = UserId::random();
        f.ledger.invite(room.id, owner, target).await.unwrap();

        let result = f.ledger.invite(room.id, owner, target).await;

        assert!(matches!(result, Err(RoomError::AlreadyInvited(u, _)) if u == target));
    }

    #[tokio::test]
    async fn test_invite_again_after_expiry_replaces_old() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let target = UserId::random();
        let old = f.ledger.invite(room.id, owner, target).await.unwrap();
        f.clock.advance(Duration::from_secs(301));

        let new = f.ledger.invite(room.id, owner, target).await.unwrap();

        assert_ne!(new.id, old.id);
        let live = f.ledger.list_live_invites(target).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, new.id);
    }

    #[tokio::test]
    async fn test_invite_target_in_game_fails() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let (busy, busy_room) = f.room().await;
        f.put_in_game(&busy_room).await;

        let result = f.ledger.invite(room.id, owner, busy).await;

        assert!(matches!(result, Err(RoomError::TargetInGame(u)) if u == busy));
    }

    #[tokio::test]
    async fn test_list_live_invites_drops_invites_of_vanished_rooms() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let target = UserId::random();
        f.ledger.invite(room.id, owner, target).await.unwrap();
        f.rooms.disband(room.id, owner).await.unwrap();

        let live = f.ledger.list_live_invites(target).await.unwrap();

        assert!(live.is_empty());
        assert_eq!(f.store.count(RecordKind::Invite).await, 0);
        assert!(!f.ledger.has_been_invited(room.id, target).await.unwrap());
    }

    #[tokio::test]
    async fn test_accept_someone_elses_invite_is_not_found() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let invite = f.ledger.invite(room.id, owner, UserId::random()).await.unwrap();

        let result = f.ledger.accept(invite.id, UserId::random()).await;

        assert!(matches!(result, Err(RoomError::InviteNotFound(_))));
        // Still there for the real invitee.
        assert!(f.store.get::<Invite>(&invite.id.key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_accept_room_in_game_consumes_invite() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let target = UserId::random();
        let invite = f.ledger.invite(room.id, owner, target).await.unwrap();
        f.put_in_game(&room).await;

        let result = f.ledger.accept(invite.id, target).await;

        assert!(matches!(result, Err(RoomError::RoomInGame(r)) if r == room.id));
        assert!(f.store.get::<Invite>(&invite.id.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_has_been_invited_expired_invite_is_deleted() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let target = UserId::random();
        f.ledger.invite(room.id, owner, target).await.unwrap();
        assert!(f.ledger.has_been_invited(room.id, target).await.unwrap());

        f.clock.advance(Duration::from_secs(300));

        assert!(!f.ledger.has_been_invited(room.id, target).await.unwrap());
        assert_eq!(f.store.count(RecordKind::Invite).await, 0);
    }

    #[tokio::test]
    async fn test_decline_is_idempotent() {
        let f = fixture();
        let (owner, room) = f.room().await;
        let target = UserId::random();
        let invite = f.ledger.invite(room.id, owner, target).await.unwrap();

        f.ledger.decline(invite.id).await.unwrap();
        f.ledger.decline(invite.id).await.unwrap();

        assert!(f.ledger.list_live_invites(target).await.unwrap().is_empty());
    }
}
