//! Integration tests: teleports between several servers on one bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lobbyforge_bus::{Inbox, LocalBus, LocalBusConfig, LocalEndpoint};
use lobbyforge_protocol::{
    BusEvent, EventReply, Location, ManualClock, PendingTeleport, UserId,
};
use lobbyforge_session::{
    HostRuntime, SessionError, TeleportConfig, TeleportCoordinator, TeleportOutcome,
};
use lobbyforge_store::{MemoryStore, RecordStore};

// =========================================================================
// Harness
// =========================================================================

#[derive(Default)]
struct RecordingHost {
    applied: Mutex<Vec<(UserId, Location)>>,
    transfers: Mutex<Vec<(UserId, String)>>,
    /// How long placing a player takes.
    place_delay: Duration,
}

impl HostRuntime for RecordingHost {
    async fn apply_teleport(&self, user: UserId, location: &Location) -> Result<(), SessionError> {
        if !self.place_delay.is_zero() {
            tokio::time::sleep(self.place_delay).await;
        }
        self.applied.lock().unwrap().push((user, location.clone()));
        Ok(())
    }

    async fn transfer(&self, user: UserId, server: &str) -> Result<(), SessionError> {
        self.transfers.lock().unwrap().push((user, server.to_string()));
        Ok(())
    }

    async fn send_message(&self, _user: UserId, _text: &str) {}

    async fn broadcast(&self, _text: &str) {}
}

type Coordinator = TeleportCoordinator<MemoryStore, LocalEndpoint, RecordingHost>;

struct Server {
    coordinator: Arc<Coordinator>,
    host: Arc<RecordingHost>,
}

async fn server(bus: &LocalBus, store: &Arc<MemoryStore>, name: &str) -> Server {
    server_with_host(bus, store, name, RecordingHost::default()).await
}

async fn server_with_host(
    bus: &LocalBus,
    store: &Arc<MemoryStore>,
    name: &str,
    host: RecordingHost,
) -> Server {
    let (endpoint, inbox) = bus.connect(name).await.unwrap();
    let host = Arc::new(host);
    let coordinator = Arc::new(TeleportCoordinator::new(
        store.clone(),
        Arc::new(endpoint),
        host.clone(),
        Arc::new(ManualClock::new(0)),
        TeleportConfig::default(),
    ));
    serve(coordinator.clone(), inbox);
    Server { coordinator, host }
}

/// The minimal inbound loop a node runs: presence queries and teleports.
fn serve(coordinator: Arc<Coordinator>, mut inbox: Inbox) {
    tokio::spawn(async move {
        while let Some(delivery) = inbox.recv().await {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                match delivery.envelope.event {
                    BusEvent::WhereIs { user } => {
                        if let Some(reply) = delivery.reply {
                            let online = coordinator.is_online(user).await;
                            let _ = reply.send(EventReply::Presence { online });
                        }
                    }
                    BusEvent::Teleport { user, location } => {
                        let _ = coordinator.handle_remote_teleport(user, location).await;
                    }
                    _ => {}
                }
            });
        }
    });
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

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_teleport_user_on_target_server_is_delivered_there() {
    let bus = LocalBus::new();
    let store = Arc::new(MemoryStore::new());
    let lobby = server(&bus, &store, "lobby").await;
    let bw = server(&bus, &store, "bw-1").await;
    let user = UserId::random();
    bw.coordinator.establish_session(user).await.unwrap();
    let spot = Location::at("bw-1", "arena", 0.0, 80.0, 0.0);

    let outcome = lobby.coordinator.teleport(user, spot.clone()).await.unwrap();

    assert_eq!(outcome, TeleportOutcome::Delivered);
    assert!(eventually(|| bw.host.applied.lock().unwrap().len() == 1).await);
    assert_eq!(bw.host.applied.lock().unwrap()[0], (user, spot));
}

#[tokio::test]
async fn test_teleport_user_on_target_server_only_is_already_there() {
    let bus = LocalBus::new();
    let store = Arc::new(MemoryStore::new());
    let lobby = server(&bus, &store, "lobby").await;
    let bw = server(&bus, &store, "bw-1").await;
    let user = UserId::random();
    bw.coordinator.establish_session(user).await.unwrap();

    let outcome = lobby
        .coordinator
        .teleport(user, Location::server("bw-1"))
        .await
        .unwrap();

    assert_eq!(outcome, TeleportOutcome::AlreadyThere);
}

#[tokio::test]
async fn test_teleport_user_on_third_server_is_forwarded_then_resolved() {
    let bus = LocalBus::new();
    let store = Arc::new(MemoryStore::new());
    let lobby = server(&bus, &store, "lobby").await;
    let hub = server(&bus, &store, "hub-2").await;
    let bw = server(&bus, &store, "bw-1").await;
    let user = UserId::random();
    hub.coordinator.establish_session(user).await.unwrap();

    let outcome = lobby
        .coordinator
        .teleport(user, Location::server("bw-1"))
        .await
        .unwrap();
    assert_eq!(outcome, TeleportOutcome::Forwarded);

    // hub-2 queues the teleport and asks its host to send the user on.
    assert!(eventually(|| hub.host.transfers.lock().unwrap().len() == 1).await);
    assert_eq!(hub.host.transfers.lock().unwrap()[0], (user, "bw-1".to_string()));

    // The user arrives at bw-1 and picks the teleport up.
    hub.coordinator.end_session(user).await.unwrap();
    let location = bw.coordinator.establish_session(user).await.unwrap();
    assert_eq!(location, Some(Location::server("bw-1")));
}

#[tokio::test]
async fn test_teleport_user_nowhere_is_queued_until_they_join() {
    let bus = LocalBus::new();
    let store = Arc::new(MemoryStore::new());
    let lobby = server(&bus, &store, "lobby").await;
    let bw = server(&bus, &store, "bw-1").await;
    let user = UserId::random();
    let spot = Location::at("bw-1", "arena", 3.0, 70.0, 3.0);

    let outcome = lobby.coordinator.teleport(user, spot.clone()).await.unwrap();
    assert_eq!(outcome, TeleportOutcome::Queued);

    let location = bw.coordinator.establish_session(user).await.unwrap().unwrap();
    let delivered = bw.coordinator.teleport(user, location).await.unwrap();

    assert_eq!(delivered, TeleportOutcome::Delivered);
    assert_eq!(bw.host.applied.lock().unwrap().clone(), vec![(user, spot)]);
}

#[tokio::test]
async fn test_resolve_pending_from_two_servers_exactly_one_gets_it() {
    let bus = LocalBus::new();
    let store = Arc::new(MemoryStore::new());
    let lobby = server(&bus, &store, "lobby").await;
    let bw = server(&bus, &store, "bw-1").await;
    let user = UserId::random();
    lobby
        .coordinator
        .teleport(user, Location::server("bw-1"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        lobby.coordinator.resolve_pending(user),
        bw.coordinator.resolve_pending(user),
    );

    let taken = [a.unwrap(), b.unwrap()];
    assert_eq!(taken.iter().filter(|l| l.is_some()).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_teleport_while_host_is_slow_still_finds_user() {
    let bus = LocalBus::with_config(LocalBusConfig {
        call_timeout: Duration::from_millis(200),
    });
    let store = Arc::new(MemoryStore::new());
    let slow = RecordingHost {
        place_delay: Duration::from_millis(600),
        ..RecordingHost::default()
    };
    let lobby = server_with_host(&bus, &store, "lobby", slow).await;
    let other = server(&bus, &store, "other").await;
    let user = UserId::random();
    lobby.coordinator.establish_session(user).await.unwrap();

    let placing = {
        let coordinator = lobby.coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .teleport(user, Location::at("lobby", "world", 0.0, 64.0, 0.0))
                .await
        })
    };
    // Let the first placement reach the host.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = other
        .coordinator
        .teleport(user, Location::at("lobby", "world", 8.0, 64.0, 8.0))
        .await
        .unwrap();

    assert_eq!(outcome, TeleportOutcome::Delivered);
    assert_eq!(placing.await.unwrap().unwrap(), TeleportOutcome::Delivered);
    assert!(store.get::<PendingTeleport>(&user.key()).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_teleport_racing_establish_session_is_never_lost() {
    let bus = LocalBus::new();
    let store = Arc::new(MemoryStore::new());
    let bw = server(&bus, &store, "bw-1").await;

    for round in 0..50 {
        let user = UserId::random();
        let spot = Location::at("bw-1", "arena", f64::from(round), 70.0, 0.0);

        let teleporting = {
            let coordinator = bw.coordinator.clone();
            let spot = spot.clone();
            tokio::spawn(async move { coordinator.teleport(user, spot).await })
        };
        let joining = {
            let coordinator = bw.coordinator.clone();
            tokio::spawn(async move { coordinator.establish_session(user).await })
        };

        let outcome = teleporting.await.unwrap().unwrap();
        let taken = joining.await.unwrap().unwrap();
        let applied = bw
            .host
            .applied
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user)
            .count();

        match outcome {
            TeleportOutcome::Delivered => {
                assert_eq!(applied, 1, "round {round}");
                assert_eq!(taken, None, "round {round}");
            }
            TeleportOutcome::Queued => {
                assert_eq!(applied, 0, "round {round}");
                assert_eq!(taken, Some(spot), "round {round}");
            }
            other => panic!("round {round}: unexpected outcome {other:?}"),
        }
    }
}
