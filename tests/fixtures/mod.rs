//! Shared fixtures for integration tests

use ready_room::broadcast::{ConnectionRegistry, RoomBroadcaster};
use ready_room::config::LobbySettings;
use ready_room::dispatch::{register_lobby_handlers, ConnectionContext, EventDispatcher};
use ready_room::lobby::manager::LobbyManager;
use ready_room::provision::MockProvisioner;
use ready_room::store::InMemoryStore;
use ready_room::types::{ConnectionId, Notification, Player};
use ready_room::utils::generate_connection_id;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a test needs to drive the system end to end.
pub struct TestSystem {
    pub manager: Arc<LobbyManager>,
    pub dispatcher: EventDispatcher,
    pub store: Arc<InMemoryStore>,
    pub provisioner: Arc<MockProvisioner>,
    pub broadcaster: Arc<RoomBroadcaster>,
}

/// Players seeded into every test store. "creator" owns lobbies, "admin" has
/// the site role, p0..p17 fill seats.
pub fn seeded_player_names() -> Vec<String> {
    let mut names: Vec<String> = vec!["creator".to_string(), "admin".to_string()];
    for i in 0..18 {
        names.push(format!("p{}", i));
    }
    names
}

pub fn create_test_system() -> TestSystem {
    create_test_system_with_settings(LobbySettings::default())
}

pub fn create_test_system_with_settings(settings: LobbySettings) -> TestSystem {
    let store = Arc::new(InMemoryStore::new());
    for name in seeded_player_names() {
        if name == "admin" {
            store.insert_player(Player::admin(name.clone(), name));
        } else {
            store.insert_player(Player::new(name.clone(), name));
        }
    }

    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = Arc::new(RoomBroadcaster::new(registry));
    let provisioner = Arc::new(MockProvisioner::new());
    let manager = Arc::new(LobbyManager::new(
        store.clone(),
        store.clone(),
        provisioner.clone(),
        broadcaster.clone(),
        settings,
    ));

    let mut dispatcher = EventDispatcher::new();
    register_lobby_handlers(&mut dispatcher, manager.clone());

    TestSystem {
        manager,
        dispatcher,
        store,
        provisioner,
        broadcaster,
    }
}

/// A connected test client: its context plus the receiving end of its sink.
pub struct TestClient {
    pub ctx: ConnectionContext,
    pub rx: mpsc::UnboundedReceiver<Notification>,
}

impl TestClient {
    /// Drain everything currently queued on this client's sink.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut received = Vec::new();
        while let Ok(notification) = self.rx.try_recv() {
            received.push(notification);
        }
        received
    }

    /// Drain and keep only notifications for the given event name.
    pub fn drain_event(&mut self, event: &str) -> Vec<Notification> {
        self.drain()
            .into_iter()
            .filter(|n| n.event.as_deref() == Some(event))
            .collect()
    }

    pub fn connection(&self) -> ConnectionId {
        self.ctx.connection
    }
}

/// Connect a named player to the system.
pub fn connect_player(system: &TestSystem, player: &str) -> TestClient {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = generate_connection_id();
    system
        .broadcaster
        .register_connection(connection, Some(player.to_string()), tx)
        .expect("register test connection");
    TestClient {
        ctx: ConnectionContext::authenticated(connection, player.to_string()),
        rx,
    }
}

/// The (team, class) pairs that fill a Sixes lobby, in join order.
pub fn sixes_seats() -> Vec<(&'static str, &'static str)> {
    let classes = ["scout1", "scout2", "roamer", "pocket", "demoman", "medic"];
    let mut seats = Vec::new();
    for team in ["red", "blu"] {
        for class in classes {
            seats.push((team, class));
        }
    }
    seats
}

/// The (team, class) pairs that fill an Ultiduo lobby.
pub fn ultiduo_seats() -> Vec<(&'static str, &'static str)> {
    vec![
        ("red", "soldier"),
        ("red", "medic"),
        ("blu", "soldier"),
        ("blu", "medic"),
    ]
}
