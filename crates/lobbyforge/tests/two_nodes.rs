//! End-to-end tests: several nodes sharing one store and one bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lobbyforge::room::RoomError;
use lobbyforge::{LobbyError, LobbyNode, LobbyNodeBuilder, NodeConfig};
use lobbyforge_bus::{LocalBus, LocalEndpoint};
use lobbyforge_protocol::{Arena, GameType, Location, ManualClock, UserId};
use lobbyforge_room::ErrorKind;
use lobbyforge_session::{HostRuntime, SessionError, TeleportOutcome};
use lobbyforge_store::{MemoryStore, RecordStore};

// =========================================================================
// Harness
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
enum HostEvent {
    Applied(UserId, Location),
    Transferred(UserId, String),
    Message(UserId, String),
    Broadcast(String),
}

#[derive(Clone, Default)]
struct RecordingHost {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl RecordingHost {
    fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: HostEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl HostRuntime for RecordingHost {
    async fn apply_teleport(&self, user: UserId, location: &Location) -> Result<(), SessionError> {
        if location.world.as_deref() == Some("removed") {
            return Err(SessionError::UnknownWorld("removed".into()));
        }
        self.push(HostEvent::Applied(user, location.clone()));
        Ok(())
    }

    async fn transfer(&self, user: UserId, server: &str) -> Result<(), SessionError> {
        self.push(HostEvent::Transferred(user, server.to_string()));
        Ok(())
    }

    async fn send_message(&self, user: UserId, text: &str) {
        self.push(HostEvent::Message(user, text.to_string()));
    }

    async fn broadcast(&self, text: &str) {
        self.push(HostEvent::Broadcast(text.to_string()));
    }
}

type Node = LobbyNode<MemoryStore, LocalEndpoint, RecordingHost>;

async fn start(bus: &LocalBus, store: &MemoryStore, name: &str) -> (Node, RecordingHost) {
    let (endpoint, inbox) = bus.connect(name).await.unwrap();
    let host = RecordingHost::default();
    let node = LobbyNodeBuilder::new(NodeConfig::default())
        .clock(ManualClock::new(1_000))
        .build(store.clone(), endpoint, host.clone());
    tokio::spawn(node.clone().run(inbox));
    (node, host)
}

async fn provision(store: &MemoryStore, server: &str, min: usize, max: usize) -> Arena {
    let arena = Arena::new(GameType::new("bedwars"), server, "lighthouse", min, max, 0);
    store.insert_or_update(&arena).await.unwrap()
}

/// Polls until `check` holds or a second has passed.
async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn bedwars() -> GameType {
    GameType::new("bedwars")
}

// =========================================================================
// Invites
// =========================================================================

#[tokio::test]
async fn test_invite_player_notifies_target_on_other_server() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let (hub, hub_host) = start(&bus, &store, "hub-2").await;
    let owner = UserId::random();
    let target = UserId::random();
    lobby.player_joined(owner, "Alex").await.unwrap();
    hub.player_joined(target, "Steve").await.unwrap();
    let room = lobby.create_room(owner, bedwars(), true).await.unwrap();

    lobby.invite_player(room.id, owner, target).await.unwrap();

    assert!(
        eventually(|| hub_host
            .events()
            .iter()
            .any(|e| matches!(e, HostEvent::Message(u, text) if *u == target && text.contains("Alex"))))
        .await,
        "target's server should show the invite, got: {:?}",
        hub_host.events()
    );
    assert!(lobby.has_been_invited(room.id, target).await.unwrap());
}

#[tokio::test]
async fn test_accept_invite_from_other_server_joins_room() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let (hub, _) = start(&bus, &store, "hub-2").await;
    let owner = UserId::random();
    let target = UserId::random();
    let room = lobby.create_room(owner, bedwars(), true).await.unwrap();
    lobby.invite_player(room.id, owner, target).await.unwrap();

    let invites = hub.invites_for(target).await.unwrap();
    assert_eq!(invites.len(), 1);
    let joined = hub.accept_invite(invites[0].id, target).await.unwrap();

    assert_eq!(joined.members, vec![owner, target]);
    assert!(hub.invites_for(target).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_join_room_private_without_invite_fails() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let room = lobby.create_room(UserId::random(), bedwars(), true).await.unwrap();

    let result = lobby.join_room(room.id, UserId::random()).await;

    assert!(matches!(result, Err(LobbyError::RoomPrivate(_))));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Unauthorized);
}

// =========================================================================
// Games
// =========================================================================

#[tokio::test]
async fn test_start_game_sends_every_member_to_arena_server() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, lobby_host) = start(&bus, &store, "lobby").await;
    let (bw, _) = start(&bus, &store, "bw-1").await;
    let arena = provision(&store, "bw-1", 2, 4).await;
    let owner = UserId::random();
    let guest = UserId::random();
    lobby.player_joined(owner, "Alex").await.unwrap();
    lobby.player_joined(guest, "Steve").await.unwrap();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();
    lobby.join_room(room.id, guest).await.unwrap();

    let started = lobby.start_game(room.id, owner).await.unwrap();

    assert_eq!(started.id, arena.id);
    assert!(started.activated);
    assert_eq!(started.claimed_by, Some(room.id));
    let events = lobby_host.events();
    assert!(events.contains(&HostEvent::Transferred(owner, "bw-1".into())));
    assert!(events.contains(&HostEvent::Transferred(guest, "bw-1".into())));

    // The players arrive; their queued teleport is already satisfied.
    lobby.player_quit(owner).await.unwrap();
    let outcome = bw.player_joined(owner, "Alex").await.unwrap();
    assert_eq!(outcome, Some(TeleportOutcome::AlreadyThere));
}

#[tokio::test]
async fn test_start_game_no_fitting_arena_fails() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    provision(&store, "bw-1", 2, 4).await;
    let owner = UserId::random();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();

    let result = lobby.start_game(room.id, owner).await;

    assert!(matches!(result, Err(LobbyError::NoArenaAvailable(r)) if r == room.id));
}

#[tokio::test]
async fn test_start_game_reuses_arena_claimed_by_disbanded_room() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let arena = provision(&store, "bw-1", 1, 4).await;
    let first_owner = UserId::random();
    let abandoned = lobby.create_room(first_owner, bedwars(), false).await.unwrap();
    lobby.arenas().claim(arena.id, abandoned.id, 1).await.unwrap();
    lobby.disband_room(abandoned.id, first_owner).await.unwrap();
    let owner = UserId::random();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();

    let started = lobby.start_game(room.id, owner).await.unwrap();

    assert_eq!(started.id, arena.id);
    assert_eq!(started.claimed_by, Some(room.id));
    assert!(started.activated);
}

#[tokio::test]
async fn test_start_game_by_non_owner_fails() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    provision(&store, "bw-1", 1, 4).await;
    let owner = UserId::random();
    let guest = UserId::random();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();
    lobby.join_room(room.id, guest).await.unwrap();

    let result = lobby.start_game(room.id, guest).await;

    assert!(matches!(result, Err(LobbyError::Room(RoomError::NotOwner(..)))));
}

#[tokio::test]
async fn test_start_game_in_picked_arena_of_other_game_fails() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let skywars = Arena::new(GameType::new("skywars"), "sw-1", "islands", 1, 8, 0);
    let skywars = store.insert_or_update(&skywars).await.unwrap();
    let owner = UserId::random();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();

    let result = lobby.start_game_in(room.id, owner, skywars.id).await;

    assert!(matches!(result, Err(LobbyError::GameTypeMismatch { .. })));
}

#[tokio::test]
async fn test_public_rooms_hides_rooms_in_game_until_game_ends() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let arena = provision(&store, "bw-1", 1, 4).await;
    let owner = UserId::random();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();

    lobby.start_game_in(room.id, owner, arena.id).await.unwrap();
    assert!(lobby.public_rooms(Some(&bedwars())).await.unwrap().is_empty());

    lobby.game_ended(arena.id).await.unwrap();
    let rooms = lobby.public_rooms(Some(&bedwars())).await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].id, room.id);
}

#[tokio::test]
async fn test_join_running_game_not_in_game_fails() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let owner = UserId::random();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();

    let result = lobby.join_running_game(owner).await;

    assert!(matches!(result, Err(LobbyError::NotInGame(r)) if r == room.id));
}

#[tokio::test]
async fn test_join_running_game_sends_member_to_arena() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, lobby_host) = start(&bus, &store, "lobby").await;
    let arena = provision(&store, "bw-1", 1, 4).await;
    let owner = UserId::random();
    let room = lobby.create_room(owner, bedwars(), false).await.unwrap();
    lobby.start_game_in(room.id, owner, arena.id).await.unwrap();
    lobby.player_joined(owner, "Alex").await.unwrap();

    let outcome = lobby.join_running_game(owner).await.unwrap();

    assert_eq!(outcome, TeleportOutcome::Forwarded);
    assert!(lobby_host
        .events()
        .contains(&HostEvent::Transferred(owner, "bw-1".into())));
}

// =========================================================================
// Deferred teleports
// =========================================================================

#[tokio::test]
async fn test_queued_teleport_follows_user_across_servers() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let (hub, hub_host) = start(&bus, &store, "hub-2").await;
    let (bw, bw_host) = start(&bus, &store, "bw-1").await;
    let user = UserId::random();
    let spot = Location::at("bw-1", "arena", 0.5, 65.0, 0.5);

    let queued = lobby.teleports().teleport(user, spot.clone()).await.unwrap();
    assert_eq!(queued, TeleportOutcome::Queued);

    // The user shows up on the wrong server first and is sent on.
    let rerouted = hub.player_joined(user, "Steve").await.unwrap();
    assert_eq!(rerouted, Some(TeleportOutcome::Forwarded));
    assert!(hub_host
        .events()
        .contains(&HostEvent::Transferred(user, "bw-1".into())));

    hub.player_quit(user).await.unwrap();
    let delivered = bw.player_joined(user, "Steve").await.unwrap();
    assert_eq!(delivered, Some(TeleportOutcome::Delivered));
    assert_eq!(bw_host.events(), vec![HostEvent::Applied(user, spot)]);
}

// =========================================================================
// Network-wide
// =========================================================================

#[tokio::test]
async fn test_online_players_merges_every_server() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let (bw, _) = start(&bus, &store, "bw-1").await;
    let a = UserId::random();
    let b = UserId::random();
    lobby.player_joined(a, "Alex").await.unwrap();
    bw.player_joined(b, "Steve").await.unwrap();

    let online = lobby.online_players().await.unwrap();

    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(online, expected);
}

#[tokio::test]
async fn test_relay_chat_reaches_only_whitelisted_servers() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, lobby_host) = start(&bus, &store, "lobby").await;
    let (_bw, bw_host) = start(&bus, &store, "bw-1").await;

    lobby
        .relay_chat("[Alex] gg", vec!["bw-1".to_string()])
        .await
        .unwrap();

    assert!(eventually(|| bw_host.events() == vec![HostEvent::Broadcast("[Alex] gg".into())]).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(lobby_host.events().is_empty());
}

// =========================================================================
// Player lifecycle
// =========================================================================

#[tokio::test]
async fn test_player_joined_pending_to_unknown_world_still_joins() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, lobby_host) = start(&bus, &store, "lobby").await;
    let user = UserId::random();
    let queued = lobby
        .teleports()
        .teleport(user, Location::at("lobby", "removed", 0.0, 64.0, 0.0))
        .await
        .unwrap();
    assert_eq!(queued, TeleportOutcome::Queued);

    let outcome = lobby.player_joined(user, "Alex").await.unwrap();

    assert_eq!(outcome, Some(TeleportOutcome::Failed));
    assert!(lobby.teleports().is_online(user).await);
    assert!(lobby.teleports().resolve_pending(user).await.unwrap().is_none());
    assert!(lobby_host.events().is_empty());
}

#[tokio::test]
async fn test_user_lookup_by_id_and_name_after_join() {
    let bus = LocalBus::new();
    let store = MemoryStore::new();
    let (lobby, _) = start(&bus, &store, "lobby").await;
    let (hub, _) = start(&bus, &store, "hub-2").await;
    let user = UserId::random();
    lobby.player_joined(user, "Alex").await.unwrap();
    lobby.player_quit(user).await.unwrap();
    hub.player_joined(user, "Alexander").await.unwrap();

    let by_id = lobby.user(user).await.unwrap().unwrap();
    let by_name = lobby.user_by_name("Alexander").await.unwrap().unwrap();

    assert_eq!(by_id.name, "Alexander");
    assert_eq!(by_id.last_server.as_deref(), Some("hub-2"));
    assert_eq!(by_name.id, user);
    assert!(lobby.user_by_name("Alex").await.unwrap().is_none());
    assert!(lobby.user(UserId::random()).await.unwrap().is_none());
}
