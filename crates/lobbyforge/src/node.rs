//! `LobbyNode` builder and the user-intent flows.
//!
//! One node runs inside each game server process. It is an explicit
//! context object: everything it needs (store, bus, host) is handed to the
//! builder, and every clone of the node shares the same state.

use std::sync::Arc;

use lobbyforge_bus::EventBus;
use lobbyforge_protocol::{
    Arena, ArenaId, BusEvent, Clock, EventReply, GameType, Invite, InviteId,
    Room, RoomId, SystemClock, UserId, UserRecord,
};
use lobbyforge_room::{
    ArenaAllocator, CoordinatorConfig, InviteLedger, RoomError, RoomRegistry,
};
use lobbyforge_session::{
    HostRuntime, TeleportConfig, TeleportCoordinator, TeleportOutcome,
};
use lobbyforge_store::RecordStore;

use crate::{LobbyError, NodeConfig};

/// How many times a user record upsert re-reads after losing a race.
const UPSERT_ATTEMPTS: u32 = 5;

/// Shared node state, one per process.
pub(crate) struct NodeState<S, B, H>
where
    S: RecordStore,
    B: EventBus,
    H: HostRuntime,
{
    pub(crate) store: Arc<S>,
    pub(crate) bus: Arc<B>,
    pub(crate) host: Arc<H>,
    pub(crate) rooms: Arc<RoomRegistry<S>>,
    pub(crate) arenas: Arc<ArenaAllocator<S>>,
    pub(crate) invites: InviteLedger<S>,
    pub(crate) teleports: TeleportCoordinator<S, B, H>,
}

/// Builder for a [`LobbyNode`].
///
/// # Example
///
/// ```rust,ignore
/// let node = LobbyNodeBuilder::new(NodeConfig::default())
///     .build(MemoryStore::new(), endpoint, MyHost);
/// tokio::spawn(node.clone().run(inbox));
/// ```
pub struct LobbyNodeBuilder {
    config: NodeConfig,
    clock: Arc<dyn Clock>,
}

impl LobbyNodeBuilder {
    /// Creates a builder with the given config and the system clock.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the room, invite and arena settings.
    pub fn coordinator(mut self, config: CoordinatorConfig) -> Self {
        self.config.coordinator = config;
        self
    }

    /// Replaces the teleport settings.
    pub fn teleport(mut self, config: TeleportConfig) -> Self {
        self.config.teleport = config;
        self
    }

    /// Uses another time source. Tests pass a `ManualClock`.
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Wires the components together.
    pub fn build<S, B, H>(self, store: S, bus: B, host: H) -> LobbyNode<S, B, H>
    where
        S: RecordStore,
        B: EventBus,
        H: HostRuntime,
    {
        let store = Arc::new(store);
        let bus = Arc::new(bus);
        let host = Arc::new(host);
        let coordinator = self.config.coordinator;

        let rooms = Arc::new(RoomRegistry::new(store.clone(), self.clock.clone()));
        let arenas = Arc::new(ArenaAllocator::new(store.clone(), coordinator.clone()));
        let invites = InviteLedger::new(
            store.clone(),
            self.clock.clone(),
            coordinator,
            rooms.clone(),
            arenas.clone(),
        );
        let teleports = TeleportCoordinator::new(
            store.clone(),
            bus.clone(),
            host.clone(),
            self.clock,
            self.config.teleport,
        );

        tracing::info!(server = %bus.server_name(), "lobby node ready");

        LobbyNode {
            state: Arc::new(NodeState {
                store,
                bus,
                host,
                rooms,
                arenas,
                invites,
                teleports,
            }),
        }
    }
}

/// The coordination core of one game server.
///
/// Cheap to clone; clones share state.
pub struct LobbyNode<S, B, H>
where
    S: RecordStore,
    B: EventBus,
    H: HostRuntime,
{
    pub(crate) state: Arc<NodeState<S, B, H>>,
}

impl<S, B, H> Clone for LobbyNode<S, B, H>
where
    S: RecordStore,
    B: EventBus,
    H: HostRuntime,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<S, B, H> LobbyNode<S, B, H>
where
    S: RecordStore,
    B: EventBus,
    H: HostRuntime,
{
    /// This server's name on the bus.
    pub fn server_name(&self) -> &str {
        self.state.bus.server_name()
    }

    /// The room registry, for callers that need lower-level access.
    pub fn rooms(&self) -> &RoomRegistry<S> {
        &self.state.rooms
    }

    /// The arena allocator, for callers that need lower-level access.
    pub fn arenas(&self) -> &ArenaAllocator<S> {
        &self.state.arenas
    }

    /// The teleport coordinator, for callers that need lower-level access.
    pub fn teleports(&self) -> &TeleportCoordinator<S, B, H> {
        &self.state.teleports
    }

    // =====================================================================
    // Rooms
    // =====================================================================

    pub async fn create_room(
        &self,
        owner: UserId,
        game_type: GameType,
        is_private: bool,
    ) -> Result<Room, LobbyError> {
        Ok(self.state.rooms.create_room(owner, game_type, is_private).await?)
    }

    /// Joins a public room that is not in a game.
    ///
    /// # Errors
    /// - [`LobbyError::RoomPrivate`] for private rooms (use an invite)
    /// - [`RoomError::RoomInGame`] if the room is playing
    /// - [`RoomError::AlreadyInRoom`] if the user must leave another room
    ///   first
    pub async fn join_room(&self, room_id: RoomId, user: UserId) -> Result<Room, LobbyError> {
        let room = self.state.rooms.get_room(room_id).await?;
        if room.is_private && !room.is_member(&user) {
            return Err(LobbyError::RoomPrivate(room_id));
        }
        if self.state.arenas.arena_for_room(room_id).await?.is_some() {
            return Err(RoomError::RoomInGame(room_id).into());
        }
        Ok(self.state.rooms.add_member(room_id, user).await?)
    }

    /// Leaves the user's current room. Returns the room as it is now, or
    /// `None` if it was destroyed or the user was not in one.
    pub async fn leave_room(&self, user: UserId) -> Result<Option<Room>, LobbyError> {
        Ok(self.state.rooms.leave_current_room(user).await?)
    }

    pub async fn set_private(
        &self,
        room_id: RoomId,
        by: UserId,
        is_private: bool,
    ) -> Result<Room, LobbyError> {
        Ok(self.state.rooms.set_private(room_id, by, is_private).await?)
    }

    pub async fn disband_room(&self, room_id: RoomId, by: UserId) -> Result<Room, LobbyError> {
        Ok(self.state.rooms.disband(room_id, by).await?)
    }

    /// Public rooms that are not currently in a game, oldest first.
    pub async fn public_rooms(&self, game_type: Option<&GameType>) -> Result<Vec<Room>, LobbyError> {
        let rooms = self.state.rooms.list_public_rooms(game_type).await?;
        let mut open = Vec::with_capacity(rooms.len());
        for room in rooms {
            if self.state.arenas.arena_for_room(room.id).await?.is_none() {
                open.push(room);
            }
        }
        Ok(open)
    }

    // =====================================================================
    // Invites
    // =====================================================================

    /// Invites `target` and tells them about it, wherever they are.
    ///
    /// The notification is fire-and-forget: a failed publish is logged and
    /// the invite still stands.
    pub async fn invite_player(
        &self,
        room_id: RoomId,
        by: UserId,
        target: UserId,
    ) -> Result<Invite, LobbyError> {
        let invite = self.state.invites.invite(room_id, by, target).await?;
        let room = self.state.rooms.get_room(room_id).await?;

        let inviter = self
            .state
            .store
            .get::<UserRecord>(&by.key())
            .await?
            .map_or_else(|| by.to_string(), |u| u.name);
        let message = format!("{inviter} invited you to play {}", room.game_type);

        if let Err(e) = self
            .state
            .bus
            .publish(None, BusEvent::UserMessage { user: target, message })
            .await
        {
            tracing::warn!(%target, error = %e, "invite notification not sent");
        }
        Ok(invite)
    }

    /// The user's live invites, oldest first.
    pub async fn invites_for(&self, user: UserId) -> Result<Vec<Invite>, LobbyError> {
        Ok(self.state.invites.list_live_invites(user).await?)
    }

    /// Whether the room already has a live invite out for the user.
    pub async fn has_been_invited(&self, room_id: RoomId, user: UserId) -> Result<bool, LobbyError> {
        Ok(self.state.invites.has_been_invited(room_id, user).await?)
    }

    pub async fn accept_invite(&self, invite_id: InviteId, user: UserId) -> Result<Room, LobbyError> {
        Ok(self.state.invites.accept(invite_id, user).await?)
    }

    pub async fn decline_invite(&self, invite_id: InviteId) -> Result<(), LobbyError> {
        Ok(self.state.invites.decline(invite_id).await?)
    }

    // =====================================================================
    // Games
    // =====================================================================

    /// Starts a game for the room in the first arena that fits it.
    ///
    /// Owner-only. Every member is sent to the arena's server.
    ///
    /// # Errors
    /// - [`RoomError::NotOwner`] if `by` does not own the room
    /// - [`RoomError::RoomInGame`] if the room is already playing
    /// - [`LobbyError::NoArenaAvailable`] if no free arena admits the room
    pub async fn start_game(&self, room_id: RoomId, by: UserId) -> Result<Arena, LobbyError> {
        let room = self.startable_room(room_id, by).await?;
        let arena = self
            .state
            .arenas
            .claim_first_available(&room.game_type, room_id, room.member_count())
            .await?
            .ok_or(LobbyError::NoArenaAvailable(room_id))?;
        self.launch(room, arena).await
    }

    /// Starts a game for the room in an arena the owner picked.
    ///
    /// # Errors
    /// As [`start_game`](Self::start_game), plus the claim errors of
    /// [`ArenaAllocator::claim`] and [`LobbyError::GameTypeMismatch`].
    pub async fn start_game_in(
        &self,
        room_id: RoomId,
        by: UserId,
        arena_id: ArenaId,
    ) -> Result<Arena, LobbyError> {
        let room = self.startable_room(room_id, by).await?;
        let candidate = self.state.arenas.get_arena(arena_id).await?;
        if candidate.game_type != room.game_type {
            return Err(LobbyError::GameTypeMismatch {
                arena: arena_id,
                expected: room.game_type,
                found: candidate.game_type,
            });
        }
        let arena = self
            .state
            .arenas
            .claim(arena_id, room_id, room.member_count())
            .await?;
        self.launch(room, arena).await
    }

    /// Sends a room member into the arena their room is playing in.
    pub async fn join_running_game(&self, user: UserId) -> Result<TeleportOutcome, LobbyError> {
        let room = self
            .state
            .rooms
            .get_room_for_user(user)
            .await?
            .ok_or(LobbyError::NotInRoom(user))?;
        let arena = self
            .state
            .arenas
            .arena_for_room(room.id)
            .await?
            .ok_or(LobbyError::NotInGame(room.id))?;
        Ok(self.state.teleports.teleport(user, arena.location()).await?)
    }

    /// The arena's game is over; it goes back to the pool.
    pub async fn game_ended(&self, arena_id: ArenaId) -> Result<(), LobbyError> {
        Ok(self.state.arenas.release(arena_id).await?)
    }

    async fn startable_room(&self, room_id: RoomId, by: UserId) -> Result<Room, LobbyError> {
        let room = self.state.rooms.get_room(room_id).await?;
        if !room.is_owner(&by) {
            return Err(RoomError::NotOwner(by, room_id).into());
        }
        if self.state.arenas.arena_for_room(room_id).await?.is_some() {
            return Err(RoomError::RoomInGame(room_id).into());
        }
        Ok(room)
    }

    /// Activates a claimed arena and sends every member there.
    async fn launch(&self, room: Room, arena: Arena) -> Result<Arena, LobbyError> {
        let arena = match self.state.arenas.activate(arena.id).await {
            Ok(arena) => arena,
            Err(e) => {
                if let Err(release) = self.state.arenas.release(arena.id).await {
                    tracing::warn!(arena_id = %arena.id, error = %release, "release after failed activation");
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            room_id = %room.id,
            arena_id = %arena.id,
            server = %arena.server_name,
            map = %arena.map_name,
            members = room.member_count(),
            "game started"
        );

        let location = arena.location();
        for member in &room.members {
            match self.state.teleports.teleport(*member, location.clone()).await {
                Ok(TeleportOutcome::Failed) => {
                    tracing::warn!(%member, "host could not place member in arena")
                }
                Ok(outcome) => tracing::debug!(%member, ?outcome, "member sent to arena"),
                Err(e) => tracing::warn!(%member, error = %e, "member could not be sent to arena"),
            }
        }
        Ok(arena)
    }

    // =====================================================================
    // Network-wide
    // =====================================================================

    /// Everyone online on any server, sorted and without duplicates.
    pub async fn online_players(&self) -> Result<Vec<UserId>, LobbyError> {
        let mut users = self.state.teleports.online_users().await;
        let here = self.server_name().to_string();

        for reply in self.state.bus.call(None, BusEvent::GetOnlinePlayers).await? {
            if reply.server == here {
                continue;
            }
            if let EventReply::OnlinePlayers { users: remote } = reply.reply {
                users.extend(remote);
            }
        }
        users.sort();
        users.dedup();
        Ok(users)
    }

    /// Relays an already-formatted chat line to the whitelisted servers
    /// (every server when the list is empty).
    pub async fn relay_chat(
        &self,
        message: impl Into<String>,
        server_whitelist: Vec<String>,
    ) -> Result<(), LobbyError> {
        self.state
            .bus
            .publish(
                None,
                BusEvent::ChatRelay {
                    message: message.into(),
                    server_whitelist,
                },
            )
            .await?;
        Ok(())
    }

    // =====================================================================
    // Player lifecycle
    // =====================================================================

    /// A player connected to this server.
    ///
    /// Remembers them, marks them online here and carries out the teleport
    /// that was waiting for them, if any.
    pub async fn player_joined(
        &self,
        user: UserId,
        name: impl Into<String>,
    ) -> Result<Option<TeleportOutcome>, LobbyError> {
        self.remember_user(user, name.into()).await?;

        let Some(location) = self.state.teleports.establish_session(user).await? else {
            return Ok(None);
        };
        let outcome = self.state.teleports.teleport(user, location).await?;
        Ok(Some(outcome))
    }

    /// A player disconnected from this server.
    pub async fn player_quit(&self, user: UserId) -> Result<(), LobbyError> {
        Ok(self.state.teleports.end_session(user).await?)
    }

    /// The stored record of a user who has joined any server before.
    pub async fn user(&self, user: UserId) -> Result<Option<UserRecord>, LobbyError> {
        Ok(self.state.store.get::<UserRecord>(&user.key()).await?)
    }

    /// Looks a user up by the exact name they last joined with.
    pub async fn user_by_name(&self, name: &str) -> Result<Option<UserRecord>, LobbyError> {
        let name = name.to_string();
        Ok(self
            .state
            .store
            .get_first::<UserRecord, _>(move |record| record.name == name)
            .await?)
    }

    /// Upserts the user's record with their current name and server.
    async fn remember_user(&self, user: UserId, name: String) -> Result<(), LobbyError> {
        let server = self.server_name().to_string();

        for attempt in 1..=UPSERT_ATTEMPTS {
            let record = match self.state.store.get::<UserRecord>(&user.key()).await? {
                Some(mut record) => {
                    record.name = name.clone();
                    record.last_server = Some(server.clone());
                    record
                }
                None => UserRecord {
                    id: user,
                    name: name.clone(),
                    last_server: Some(server.clone()),
                    version: 0,
                },
            };

            match self.state.store.insert_or_update(&record).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_conflict() && attempt < UPSERT_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
