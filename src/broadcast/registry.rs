//! Connection registry: which rooms each connection subscribes to
//!
//! The registry is an explicitly constructed, injected instance shared between
//! the broadcaster and the lobby manager. It only tracks membership; callers
//! broadcast the membership changes themselves.

use crate::error::LobbyError;
use crate::types::ConnectionId;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// In-memory map of connection ↔ room subscriptions.
///
/// All operations are idempotent where repetition is plausible: subscribing a
/// connection to a room it already subscribes to is a no-op, so fan-out never
/// delivers duplicates.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    connections: RwLock<HashMap<ConnectionId, HashSet<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room. Idempotent.
    pub fn subscribe(&self, connection: ConnectionId, room: &str) -> Result<(), LobbyError> {
        let mut rooms = self.rooms.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire rooms lock".to_string(),
        })?;
        let mut connections = self.connections.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire connections lock".to_string(),
        })?;

        rooms.entry(room.to_string()).or_default().insert(connection);
        connections
            .entry(connection)
            .or_default()
            .insert(room.to_string());
        Ok(())
    }

    /// Unsubscribe a connection from a room. Unknown pairs are a no-op.
    pub fn unsubscribe(&self, connection: ConnectionId, room: &str) -> Result<(), LobbyError> {
        let mut rooms = self.rooms.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire rooms lock".to_string(),
        })?;
        let mut connections = self.connections.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire connections lock".to_string(),
        })?;

        if let Some(members) = rooms.get_mut(room) {
            members.remove(&connection);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
        if let Some(subscribed) = connections.get_mut(&connection) {
            subscribed.remove(room);
            if subscribed.is_empty() {
                connections.remove(&connection);
            }
        }
        Ok(())
    }

    /// Drop every subscription held by a connection, returning the rooms it
    /// was removed from. Mandatory on disconnect.
    pub fn unsubscribe_all(&self, connection: ConnectionId) -> Result<Vec<String>, LobbyError> {
        let mut rooms = self.rooms.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire rooms lock".to_string(),
        })?;
        let mut connections = self.connections.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire connections lock".to_string(),
        })?;

        let subscribed: Vec<String> = connections
            .remove(&connection)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();

        for room in &subscribed {
            if let Some(members) = rooms.get_mut(room) {
                members.remove(&connection);
                if members.is_empty() {
                    rooms.remove(room);
                }
            }
        }
        Ok(subscribed)
    }

    /// Current subscribers of a room. A room with no subscribers is simply
    /// empty, never an error.
    pub fn subscribers_of(&self, room: &str) -> Result<Vec<ConnectionId>, LobbyError> {
        let rooms = self.rooms.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire rooms lock".to_string(),
        })?;
        Ok(rooms
            .get(room)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Rooms a connection currently subscribes to.
    pub fn rooms_of(&self, connection: ConnectionId) -> Result<Vec<String>, LobbyError> {
        let connections = self.connections.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire connections lock".to_string(),
        })?;
        Ok(connections
            .get(&connection)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
