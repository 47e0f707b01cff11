//! Persistence collaborator traits and the in-memory implementation
//!
//! The engine treats the store as synchronous-per-operation, authoritative,
//! and durable; it never caches results across operations. Durability itself
//! is the store's problem, not ours.

use crate::error::LobbyError;
use crate::lobby::instance::LobbySnapshot;
use crate::types::{BanType, LobbyId, Player, PlayerId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// A store-level ban row
#[derive(Debug, Clone)]
pub struct BanRecord {
    pub ban_type: BanType,
    pub until: DateTime<Utc>,
    pub reason: String,
}

/// Player records and ban lookups
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn load_player(&self, id: &PlayerId) -> Result<Option<Player>, LobbyError>;

    async fn save_player(&self, player: &Player) -> Result<(), LobbyError>;

    /// Expiry of an active ban of the given type, or `None`. An expired ban is
    /// treated as absent; rows are not garbage-collected here.
    async fn active_ban(
        &self,
        id: &PlayerId,
        ban_type: BanType,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LobbyError>;

    async fn ban_until(
        &self,
        id: &PlayerId,
        ban_type: BanType,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), LobbyError>;
}

/// Lobby records. Close never deletes; records only ever accumulate state.
#[async_trait]
pub trait LobbyStore: Send + Sync {
    async fn load_lobby(&self, id: LobbyId) -> Result<Option<LobbySnapshot>, LobbyError>;

    async fn save_lobby(&self, snapshot: &LobbySnapshot) -> Result<(), LobbyError>;
}

/// Parse a compact ban duration of the form `1y2m3w4d5h`.
///
/// Every segment is optional but at least one must be present. Years and
/// months are flattened to days (365/30) since ban precision does not warrant
/// calendar math.
pub fn parse_ban_duration(input: &str) -> Result<Duration, LobbyError> {
    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut matched = false;

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let amount: i64 = digits.parse().map_err(|_| LobbyError::Validation {
            reason: format!("Invalid time duration: {}", input),
        })?;
        digits.clear();
        matched = true;
        total = total
            + match ch {
                'y' => Duration::days(365 * amount),
                'm' => Duration::days(30 * amount),
                'w' => Duration::weeks(amount),
                'd' => Duration::days(amount),
                'h' => Duration::hours(amount),
                _ => {
                    return Err(LobbyError::Validation {
                        reason: format!("Invalid time duration: {}", input),
                    })
                }
            };
    }

    if !matched || !digits.is_empty() {
        return Err(LobbyError::Validation {
            reason: format!("Invalid time duration: {}", input),
        });
    }
    Ok(total)
}

/// In-memory store backing both collaborator traits. Production deployments
/// swap in a database-backed implementation behind the same traits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    players: RwLock<HashMap<PlayerId, Player>>,
    bans: RwLock<HashMap<(PlayerId, BanType), BanRecord>>,
    lobbies: RwLock<HashMap<LobbyId, LobbySnapshot>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a player record. Convenience for wiring and tests.
    pub fn insert_player(&self, player: Player) {
        if let Ok(mut players) = self.players.write() {
            players.insert(player.id.clone(), player);
        }
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.read().map(|l| l.len()).unwrap_or(0)
    }
}

#[async_trait]
impl PlayerStore for InMemoryStore {
    async fn load_player(&self, id: &PlayerId) -> Result<Option<Player>, LobbyError> {
        let players = self.players.read().map_err(|_| LobbyError::Store {
            message: "Failed to acquire players lock".to_string(),
        })?;
        Ok(players.get(id).cloned())
    }

    async fn save_player(&self, player: &Player) -> Result<(), LobbyError> {
        let mut players = self.players.write().map_err(|_| LobbyError::Store {
            message: "Failed to acquire players lock".to_string(),
        })?;
        players.insert(player.id.clone(), player.clone());
        Ok(())
    }

    async fn active_ban(
        &self,
        id: &PlayerId,
        ban_type: BanType,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LobbyError> {
        let bans = self.bans.read().map_err(|_| LobbyError::Store {
            message: "Failed to acquire bans lock".to_string(),
        })?;
        Ok(bans
            .get(&(id.clone(), ban_type))
            .filter(|record| record.until > now)
            .map(|record| record.until))
    }

    async fn ban_until(
        &self,
        id: &PlayerId,
        ban_type: BanType,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), LobbyError> {
        let mut bans = self.bans.write().map_err(|_| LobbyError::Store {
            message: "Failed to acquire bans lock".to_string(),
        })?;
        bans.insert(
            (id.clone(), ban_type),
            BanRecord {
                ban_type,
                until,
                reason: reason.to_string(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl LobbyStore for InMemoryStore {
    async fn load_lobby(&self, id: LobbyId) -> Result<Option<LobbySnapshot>, LobbyError> {
        let lobbies = self.lobbies.read().map_err(|_| LobbyError::Store {
            message: "Failed to acquire lobbies lock".to_string(),
        })?;
        Ok(lobbies.get(&id).cloned())
    }

    async fn save_lobby(&self, snapshot: &LobbySnapshot) -> Result<(), LobbyError> {
        let mut lobbies = self.lobbies.write().map_err(|_| LobbyError::Store {
            message: "Failed to acquire lobbies lock".to_string(),
        })?;
        lobbies.insert(snapshot.id, snapshot.clone());
        Ok(())
    }
}
