//! Room broadcaster: best-effort fan-out to connected clients
//!
//! Delivery goes through one unbounded mpsc sink per connection, so a publish
//! never blocks on a slow subscriber and per-connection ordering follows the
//! transport's single-writer discipline. There is no redelivery: a connection
//! mid-disconnect just misses the message.

use crate::broadcast::registry::ConnectionRegistry;
use crate::error::LobbyError;
use crate::types::{ConnectionId, Notification, PlayerId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Outbound sink for a single connection.
pub type ConnectionSink = mpsc::UnboundedSender<Notification>;

/// Fan-out engine over the shared [`ConnectionRegistry`].
///
/// Also keeps the identity → connection map used for direct delivery. The map
/// is last-writer-wins: a reconnecting player displaces their previous socket.
pub struct RoomBroadcaster {
    registry: Arc<ConnectionRegistry>,
    sinks: RwLock<HashMap<ConnectionId, ConnectionSink>>,
    players: RwLock<HashMap<PlayerId, ConnectionId>>,
    identities: RwLock<HashMap<ConnectionId, PlayerId>>,
}

impl RoomBroadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            sinks: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
            identities: RwLock::new(HashMap::new()),
        }
    }

    /// The registry this broadcaster fans out over.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Register a connection's outbound sink, optionally bound to a player
    /// identity for direct delivery.
    pub fn register_connection(
        &self,
        connection: ConnectionId,
        player: Option<PlayerId>,
        sink: ConnectionSink,
    ) -> Result<(), LobbyError> {
        let mut sinks = self.sinks.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire sinks lock".to_string(),
        })?;
        sinks.insert(connection, sink);
        drop(sinks);

        if let Some(player_id) = player {
            let mut players = self.players.write().map_err(|_| LobbyError::Internal {
                message: "Failed to acquire players lock".to_string(),
            })?;
            let mut identities = self.identities.write().map_err(|_| LobbyError::Internal {
                message: "Failed to acquire identities lock".to_string(),
            })?;
            if let Some(previous) = players.insert(player_id.clone(), connection) {
                identities.remove(&previous);
                debug!(
                    "Player {} reconnected, displacing connection {}",
                    player_id, previous
                );
            }
            identities.insert(connection, player_id);
        }
        Ok(())
    }

    /// Tear down a connection: drop its subscriptions, sink, and identity
    /// binding. Returns the rooms the connection was subscribed to.
    pub fn drop_connection(&self, connection: ConnectionId) -> Result<Vec<String>, LobbyError> {
        let dropped_rooms = self.registry.unsubscribe_all(connection)?;

        let mut sinks = self.sinks.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire sinks lock".to_string(),
        })?;
        sinks.remove(&connection);
        drop(sinks);

        let mut identities = self.identities.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire identities lock".to_string(),
        })?;
        if let Some(player_id) = identities.remove(&connection) {
            let mut players = self.players.write().map_err(|_| LobbyError::Internal {
                message: "Failed to acquire players lock".to_string(),
            })?;
            // Only unmap if this connection is still the player's active one
            if players.get(&player_id) == Some(&connection) {
                players.remove(&player_id);
            }
        }
        Ok(dropped_rooms)
    }

    /// Deliver a message to every current subscriber of a room. Send failures
    /// are isolated per connection; returns how many sends succeeded.
    pub fn publish(&self, room: &str, message: &Notification) -> Result<usize, LobbyError> {
        let subscribers = self.registry.subscribers_of(room)?;
        if subscribers.is_empty() {
            trace!("No subscribers in room {}", room);
            return Ok(0);
        }

        let sinks = self.sinks.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire sinks lock".to_string(),
        })?;

        let mut delivered = 0;
        for connection in subscribers {
            match sinks.get(&connection) {
                Some(sink) => {
                    if sink.send(message.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        debug!(
                            "Dropping message for connection {} in room {}: sink closed",
                            connection, room
                        );
                    }
                }
                None => {
                    debug!(
                        "Subscriber {} of room {} has no registered sink",
                        connection, room
                    );
                }
            }
        }
        Ok(delivered)
    }

    /// Deliver a message to the single active connection of a player, if any.
    /// An offline player is not an error; returns whether delivery happened.
    pub fn send_direct(&self, player: &PlayerId, message: Notification) -> Result<bool, LobbyError> {
        let connection = match self.connection_for(player)? {
            Some(connection) => connection,
            None => {
                trace!("Player {} is offline, dropping direct message", player);
                return Ok(false);
            }
        };

        let sinks = self.sinks.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire sinks lock".to_string(),
        })?;
        match sinks.get(&connection) {
            Some(sink) => Ok(sink.send(message).is_ok()),
            None => Ok(false),
        }
    }

    /// Active connection for a player identity, if one is registered.
    pub fn connection_for(&self, player: &PlayerId) -> Result<Option<ConnectionId>, LobbyError> {
        let players = self.players.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire players lock".to_string(),
        })?;
        Ok(players.get(player).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_connection_id;
    use serde_json::json;

    fn setup() -> (Arc<ConnectionRegistry>, RoomBroadcaster) {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = RoomBroadcaster::new(Arc::clone(&registry));
        (registry, broadcaster)
    }

    fn connect(
        broadcaster: &RoomBroadcaster,
        player: Option<&str>,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = generate_connection_id();
        broadcaster
            .register_connection(connection, player.map(|p| p.to_string()), tx)
            .unwrap();
        (connection, rx)
    }

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let (registry, broadcaster) = setup();
        let (conn_a, mut rx_a) = connect(&broadcaster, Some("alice"));
        let (conn_b, mut rx_b) = connect(&broadcaster, Some("bob"));
        registry.subscribe(conn_a, "1_public").unwrap();
        registry.subscribe(conn_b, "1_public").unwrap();

        let message = Notification::event("lobbyData", json!({"id": 1}));
        let delivered = broadcaster.publish("1_public", &message).unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(rx_a.try_recv().unwrap(), message);
        assert_eq!(rx_b.try_recv().unwrap(), message);
    }

    #[test]
    fn test_publish_skips_non_subscribers() {
        let (registry, broadcaster) = setup();
        let (conn_a, _rx_a) = connect(&broadcaster, Some("alice"));
        let (_conn_b, mut rx_b) = connect(&broadcaster, Some("bob"));
        registry.subscribe(conn_a, "1_private").unwrap();

        let message = Notification::event("lobbyReadyUp", json!({"timeout": 30}));
        let delivered = broadcaster.publish("1_private", &message).unwrap();

        assert_eq!(delivered, 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_closed_sink_does_not_stall_fanout() {
        let (registry, broadcaster) = setup();
        let (conn_a, rx_a) = connect(&broadcaster, Some("alice"));
        let (conn_b, mut rx_b) = connect(&broadcaster, Some("bob"));
        registry.subscribe(conn_a, "2_public").unwrap();
        registry.subscribe(conn_b, "2_public").unwrap();

        // Receiver gone mid-disconnect; the other subscriber still gets it
        drop(rx_a);

        let message = Notification::event("lobbyData", json!({"id": 2}));
        let delivered = broadcaster.publish("2_public", &message).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(rx_b.try_recv().unwrap(), message);
    }

    #[test]
    fn test_send_direct_to_offline_player_is_silent() {
        let (_registry, broadcaster) = setup();
        let sent = broadcaster
            .send_direct(
                &"ghost".to_string(),
                Notification::event("lobbyStart", json!({})),
            )
            .unwrap();
        assert!(!sent);
    }

    #[test]
    fn test_reconnect_displaces_previous_connection() {
        let (_registry, broadcaster) = setup();
        let (old_conn, _old_rx) = connect(&broadcaster, Some("alice"));
        let (new_conn, mut new_rx) = connect(&broadcaster, Some("alice"));

        assert_eq!(
            broadcaster.connection_for(&"alice".to_string()).unwrap(),
            Some(new_conn)
        );

        broadcaster
            .send_direct(
                &"alice".to_string(),
                Notification::event("lobbyStart", json!({})),
            )
            .unwrap();
        assert!(new_rx.try_recv().is_ok());

        // Dropping the stale connection must not unmap the new one
        broadcaster.drop_connection(old_conn).unwrap();
        assert_eq!(
            broadcaster.connection_for(&"alice".to_string()).unwrap(),
            Some(new_conn)
        );
    }

    #[test]
    fn test_drop_connection_cleans_subscriptions() {
        let (registry, broadcaster) = setup();
        let (conn, _rx) = connect(&broadcaster, Some("alice"));
        registry.subscribe(conn, "3_public").unwrap();
        registry.subscribe(conn, "3_private").unwrap();

        let mut dropped = broadcaster.drop_connection(conn).unwrap();
        dropped.sort();
        assert_eq!(dropped, vec!["3_private", "3_public"]);
        assert!(registry.subscribers_of("3_public").unwrap().is_empty());
        assert_eq!(
            broadcaster.connection_for(&"alice".to_string()).unwrap(),
            None
        );
    }
}
