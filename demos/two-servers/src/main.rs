//! Two game servers on one in-process bus: a lobby and an arena server.
//!
//! Run with `cargo run -p two-servers [config.json]`. Set `RUST_LOG=debug`
//! to watch every claim, queue and hand-off.

use std::time::Duration;

use lobbyforge::prelude::*;
use lobbyforge::protocol::{Clock, SystemClock};

// ---------------------------------------------------------------------------
// Host runtime: a game server that only logs what it is asked to do
// ---------------------------------------------------------------------------

struct LoggingHost {
    server: &'static str,
}

impl HostRuntime for LoggingHost {
    async fn apply_teleport(&self, user: UserId, location: &Location) -> Result<(), SessionError> {
        tracing::info!(server = self.server, %user, %location, "host: placing player");
        Ok(())
    }

    async fn transfer(&self, user: UserId, server: &str) -> Result<(), SessionError> {
        tracing::info!(from = self.server, to = server, %user, "host: sending player");
        Ok(())
    }

    async fn send_message(&self, user: UserId, text: &str) {
        tracing::info!(server = self.server, %user, "host: message \"{text}\"");
    }

    async fn broadcast(&self, text: &str) {
        tracing::info!(server = self.server, "host: broadcast \"{text}\"");
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), LobbyError> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => NodeConfig::from_json_file(path)?,
        None => NodeConfig::default(),
    };

    let bus = LocalBus::with_config(config.bus.local_bus_config());
    let store = MemoryStore::new();

    let (lobby_bus, lobby_inbox) = bus.connect("lobby").await?;
    let (arena_bus, arena_inbox) = bus.connect("bw-1").await?;
    let lobby = LobbyNodeBuilder::new(config.clone())
        .build(store.clone(), lobby_bus, LoggingHost { server: "lobby" });
    let arena_server = LobbyNodeBuilder::new(config)
        .build(store.clone(), arena_bus, LoggingHost { server: "bw-1" });
    tokio::spawn(lobby.clone().run(lobby_inbox));
    tokio::spawn(arena_server.clone().run(arena_inbox));

    // Provisioning normally happens out of band.
    let map = Arena::new(
        GameType::new("bedwars"),
        "bw-1",
        "lighthouse",
        2,
        4,
        SystemClock.now_ms(),
    );
    store.insert_or_update(&map).await?;

    let alex = UserId::random();
    let steve = UserId::random();
    let late = UserId::random();
    lobby.player_joined(alex, "Alex").await?;
    lobby.player_joined(steve, "Steve").await?;

    // Alex opens a private room and invites Steve, who accepts.
    let room = lobby.create_room(alex, GameType::new("bedwars"), true).await?;
    lobby.invite_player(room.id, alex, steve).await?;
    let Some(invite) = lobby.invites_for(steve).await?.into_iter().next() else {
        tracing::warn!("invite never arrived");
        return Ok(());
    };
    let room = lobby.accept_invite(invite.id, steve).await?;
    tracing::info!(room_id = %room.id, members = room.member_count(), "room ready");

    // Start: the arena is claimed and both players are sent to bw-1.
    let arena = lobby.start_game(room.id, alex).await?;

    for (user, name) in [(alex, "Alex"), (steve, "Steve")] {
        lobby.player_quit(user).await?;
        arena_server.player_joined(user, name).await?;
    }

    // A player who is not online anywhere yet gets a queued teleport.
    let spawn = Location::at("bw-1", "lighthouse", 0.5, 72.0, 0.5);
    let outcome = lobby.teleports().teleport(late, spawn).await?;
    tracing::info!(?outcome, "teleport for offline player");
    arena_server.player_joined(late, "Late").await?;

    lobby
        .relay_chat("[Alex] good luck", vec!["bw-1".to_string()])
        .await?;
    tracing::info!(online = lobby.online_players().await?.len(), "players online");

    arena_server.game_ended(arena.id).await?;
    tracing::info!(
        open_rooms = lobby.public_rooms(None).await?.len(),
        "game over, arena released"
    );

    // Let the inbox tasks log the last deliveries.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
