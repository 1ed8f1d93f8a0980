//! Room registry: creates rooms, tracks membership, moves ownership.

use std::sync::Arc;

use lobbyforge_protocol::{Clock, GameType, Room, RoomId, UserId};
use lobbyforge_store::RecordStore;
use tokio::sync::Mutex;

use crate::RoomError;

/// Owns every [`Room`] record.
///
/// Key invariants (enforced on every mutation):
/// - a user is a member of at most ONE room system-wide
/// - the owner is always a member
/// - a room with no members does not exist
///
/// Writes in this process are serialized by an async lock. Writes from
/// other processes are caught by the store's version check and surface as
/// a [`RoomError::Store`] conflict.
pub struct RoomRegistry<S: RecordStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl<S: RecordStore> RoomRegistry<S> {
    /// Creates a registry on top of a shared store.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Creates a room owned by `owner`, who becomes its first member.
    ///
    /// # Errors
    /// [`RoomError::AlreadyInRoom`] if the owner is already in a room.
    pub async fn create_room(
        &self,
        owner: UserId,
        game_type: GameType,
        is_private: bool,
    ) -> Result<Room, RoomError> {
        let _guard = self.write_lock.lock().await;

        if let Some(current) = self.get_room_for_user(owner).await? {
            return Err(RoomError::AlreadyInRoom(owner, current.id));
        }

        let room = Room::new(owner, game_type, is_private, self.clock.now_ms());
        let room = self.store.insert_or_update(&room).await?;
        tracing::info!(
            room_id = %room.id,
            %owner,
            game_type = %room.game_type,
            is_private,
            "room created"
        );
        Ok(room)
    }

    /// Adds a user to a room. Adding an existing member changes nothing.
    ///
    /// # Errors
    /// - [`RoomError::RoomNotFound`] if the room does not exist
    /// - [`RoomError::AlreadyInRoom`] if the user is in a different room
    pub async fn add_member(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Room, RoomError> {
        let _guard = self.write_lock.lock().await;
        self.add_member_locked(room_id, user).await
    }

    /// Removes a user from a room.
    ///
    /// If the owner leaves, ownership passes to the earliest-joined
    /// remaining member. If the last member leaves, the room is destroyed
    /// and `None` is returned.
    ///
    /// # Errors
    /// - [`RoomError::RoomNotFound`] if the room does not exist
    /// - [`RoomError::NotAMember`] if the user is not in it
    pub async fn remove_member(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Option<Room>, RoomError> {
        let _guard = self.write_lock.lock().await;
        let room = self.get_room(room_id).await?;
        self.remove_member_locked(room, user).await
    }

    /// Removes the user from whatever room they are in.
    ///
    /// Returns the room as it is afterwards, or `None` if the user was not
    /// in a room or the room was destroyed by their leaving.
    pub async fn leave_current_room(
        &self,
        user: UserId,
    ) -> Result<Option<Room>, RoomError> {
        let _guard = self.write_lock.lock().await;
        match self.get_room_for_user(user).await? {
            Some(room) => self.remove_member_locked(room, user).await,
            None => Ok(None),
        }
    }

    /// Moves a user out of their current room (if any) and into `room_id`.
    ///
    /// The target is looked up first, so a vanished target leaves the
    /// user where they were. Moving into the room they are already in
    /// changes nothing.
    ///
    /// # Errors
    /// [`RoomError::RoomNotFound`] if the target room does not exist.
    pub async fn move_member(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Room, RoomError> {
        let _guard = self.write_lock.lock().await;

        let target = self.get_room(room_id).await?;
        if target.is_member(&user) {
            return Ok(target);
        }

        if let Some(current) = self.get_room_for_user(user).await? {
            tracing::debug!(%user, from = %current.id, to = %room_id, "moving member");
            self.remove_member_locked(current, user).await?;
        }
        self.add_member_locked(room_id, user).await
    }

    /// Sets the room's visibility. Owner-only.
    ///
    /// # Errors
    /// - [`RoomError::RoomNotFound`] if the room does not exist
    /// - [`RoomError::NotOwner`] if `by` does not own the room
    pub async fn set_private(
        &self,
        room_id: RoomId,
        by: UserId,
        is_private: bool,
    ) -> Result<Room, RoomError> {
        let _guard = self.write_lock.lock().await;

        let mut room = self.get_room(room_id).await?;
        if !room.is_owner(&by) {
            return Err(RoomError::NotOwner(by, room_id));
        }
        if room.is_private == is_private {
            return Ok(room);
        }

        room.is_private = is_private;
        let room = self.store.insert_or_update(&room).await?;
        tracing::info!(%room_id, is_private, "room visibility changed");
        Ok(room)
    }

    /// Destroys a room outright. Owner-only.
    ///
    /// # Errors
    /// - [`RoomError::RoomNotFound`] if the room does not exist
    /// - [`RoomError::NotOwner`] if `by` does not own the room
    pub async fn disband(
        &self,
        room_id: RoomId,
        by: UserId,
    ) -> Result<Room, RoomError> {
        let _guard = self.write_lock.lock().await;

        let room = self.get_room(room_id).await?;
        if !room.is_owner(&by) {
            return Err(RoomError::NotOwner(by, room_id));
        }

        self.store.delete(&room).await?;
        tracing::info!(%room_id, members = room.member_count(), "room disbanded");
        Ok(room)
    }

    /// Looks up a room.
    ///
    /// # Errors
    /// [`RoomError::RoomNotFound`] if it does not exist.
    pub async fn get_room(&self, room_id: RoomId) -> Result<Room, RoomError> {
        self.store
            .get::<Room>(&room_id.key())
            .await?
            .ok_or(RoomError::RoomNotFound(room_id))
    }

    /// Returns the room the user is in, if any.
    pub async fn get_room_for_user(
        &self,
        user: UserId,
    ) -> Result<Option<Room>, RoomError> {
        Ok(self
            .store
            .get_first::<Room, _>(move |room| room.is_member(&user))
            .await?)
    }

    /// Non-private rooms, oldest first, optionally of one game type.
    pub async fn list_public_rooms(
        &self,
        game_type: Option<&GameType>,
    ) -> Result<Vec<Room>, RoomError> {
        let game_type = game_type.cloned();
        Ok(self
            .store
            .list::<Room, _>(move |room| {
                !room.is_private
                    && game_type.as_ref().is_none_or(|g| *g == room.game_type)
            })
            .await?)
    }

    // -- Internals (caller holds the write lock) --

    async fn add_member_locked(
        &self,
        room_id: RoomId,
        user: UserId,
    ) -> Result<Room, RoomError> {
        let mut room = self.get_room(room_id).await?;
        if room.is_member(&user) {
            return Ok(room);
        }
        if let Some(current) = self.get_room_for_user(user).await? {
            return Err(RoomError::AlreadyInRoom(user, current.id));
        }

        room.members.push(user);
        let room = self.store.insert_or_update(&room).await?;
        tracing::info!(%room_id, %user, members = room.member_count(), "member joined room");
        Ok(room)
    }

    async fn remove_member_locked(
        &self,
        mut room: Room,
        user: UserId,
    ) -> Result<Option<Room>, RoomError> {
        let room_id = room.id;
        let index = room
            .members
            .iter()
            .position(|m| *m == user)
            .ok_or(RoomError::NotAMember(user, room_id))?;
        room.members.remove(index);

        let Some(&successor) = room.members.first() else {
            self.store.delete(&room).await?;
            tracing::info!(%room_id, %user, "last member left, room destroyed");
            return Ok(None);
        };

        if room.owner == user {
            room.owner = successor;
            tracing::info!(%room_id, from = %user, to = %successor, "room ownership transferred");
        }

        let room = self.store.insert_or_update(&room).await?;
        tracing::info!(%room_id, %user, members = room.member_count(), "member left room");
        Ok(Some(room))
    }
}
