//! Lobby manager implementation for handling multiple lobby instances
//!
//! The manager owns every live lobby behind a per-lobby async mutex, enforces
//! the cross-lobby invariants a single instance cannot see (one seat per
//! player anywhere), keeps room subscriptions in step with membership, and
//! publishes the notifications that make state changes visible.
//!
//! Locking discipline: the outer map lock is held only to fetch a lobby
//! handle. Per-lobby mutexes serialize all operations on one lobby; when a
//! seat switch spans two lobbies both are locked in id order. Persistence
//! happens under the lobby lock so a store failure can roll the in-memory
//! mutation back; broadcasts always happen after the locks are released.

use crate::broadcast::{room_name, RoomBroadcaster, RoomScope};
use crate::config::LobbySettings;
use crate::error::LobbyError;
use crate::lobby::instance::{JoinOutcome, LobbyInstance, LobbyOptions, LobbySnapshot, LobbyState};
use crate::lobby::slots;
use crate::lobby::timer::ReadyUpScheduler;
use crate::provision::{GameServerLifecycle, ServerSettings};
use crate::store::{LobbyStore, PlayerStore};
use crate::types::{BanType, LobbyId, LobbyType, Notification, Player, PlayerId, Team};
use crate::utils::current_timestamp;
use chrono::Duration;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Statistics about lobby manager operations
#[derive(Debug, Clone, Default)]
pub struct LobbyManagerStats {
    /// Total number of lobbies created
    pub lobbies_created: u64,
    /// Total number of lobbies closed
    pub lobbies_closed: u64,
    /// Total number of successful joins
    pub players_joined: u64,
    /// Total number of ready-up phases started
    pub ready_ups_started: u64,
    /// Total number of ready-up phases that expired
    pub ready_ups_expired: u64,
    /// Total number of matches started (all players confirmed)
    pub matches_started: u64,
    /// Current number of lobbies not yet ended
    pub active_lobbies: usize,
    /// Current number of seated players across all lobbies
    pub players_seated: usize,
}

/// Request to create a new lobby
#[derive(Debug, Clone, Default)]
pub struct CreateLobbyRequest {
    pub lobby_type: LobbyType,
    pub server: ServerSettings,
    pub password: Option<String>,
    pub steam_group: Option<String>,
    pub allowed_players: Option<HashSet<PlayerId>>,
}

/// Result of a successful join through the manager
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSummary {
    pub lobby_id: LobbyId,
    pub slot: usize,
    pub became_full: bool,
}

/// The main lobby manager
pub struct LobbyManager {
    /// Map of lobbies by id; each lobby serializes its own operations
    lobbies: RwLock<HashMap<LobbyId, Arc<Mutex<LobbyInstance>>>>,
    /// Authoritative player → lobby index for the single-seat invariant
    seated: RwLock<HashMap<PlayerId, LobbyId>>,
    /// Player → lobbies currently spectated
    spectating: RwLock<HashMap<PlayerId, HashSet<LobbyId>>>,
    next_lobby_id: AtomicU64,
    player_store: Arc<dyn PlayerStore>,
    lobby_store: Arc<dyn LobbyStore>,
    provisioner: Arc<dyn GameServerLifecycle>,
    broadcaster: Arc<RoomBroadcaster>,
    scheduler: ReadyUpScheduler,
    settings: LobbySettings,
    stats: RwLock<LobbyManagerStats>,
}

impl LobbyManager {
    pub fn new(
        player_store: Arc<dyn PlayerStore>,
        lobby_store: Arc<dyn LobbyStore>,
        provisioner: Arc<dyn GameServerLifecycle>,
        broadcaster: Arc<RoomBroadcaster>,
        settings: LobbySettings,
    ) -> Self {
        Self {
            lobbies: RwLock::new(HashMap::new()),
            seated: RwLock::new(HashMap::new()),
            spectating: RwLock::new(HashMap::new()),
            next_lobby_id: AtomicU64::new(1),
            player_store,
            lobby_store,
            provisioner,
            broadcaster,
            scheduler: ReadyUpScheduler::new(),
            settings,
            stats: RwLock::new(LobbyManagerStats::default()),
        }
    }

    /// Create a new lobby. Provisioning failure aborts the creation.
    pub async fn create_lobby(
        &self,
        creator: &PlayerId,
        request: CreateLobbyRequest,
    ) -> Result<LobbyId, LobbyError> {
        let now = current_timestamp();
        self.require_player(creator).await?;

        if let Some(until) = self
            .player_store
            .active_ban(creator, BanType::Create, now)
            .await?
        {
            return Err(LobbyError::PlayerBanned {
                activity: BanType::Create.activity().to_string(),
                until,
            });
        }

        if self.get_stats()?.active_lobbies >= self.settings.max_active_lobbies {
            return Err(LobbyError::TooManyLobbies);
        }

        let lobby_id = self.next_lobby_id.fetch_add(1, Ordering::SeqCst);
        self.provisioner.provision(lobby_id, &request.server).await?;

        let lobby = LobbyInstance::new(
            lobby_id,
            request.lobby_type,
            creator.clone(),
            LobbyOptions {
                password: request.password,
                steam_group: request.steam_group,
                allowed_players: request.allowed_players,
                ready_up_grace: Duration::seconds(self.settings.ready_up_grace_seconds),
            },
            now,
        );
        let snapshot = lobby.snapshot();

        if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
            error!("Failed to persist new lobby {}: {}", lobby_id, e);
            if let Err(release_err) = self.provisioner.release(lobby_id).await {
                warn!(
                    "Failed to release server for aborted lobby {}: {}",
                    lobby_id, release_err
                );
            }
            return Err(e);
        }

        let mut lobbies = self.lobbies_mut()?;
        lobbies.insert(lobby_id, Arc::new(Mutex::new(lobby)));
        drop(lobbies);

        self.with_stats(|stats| {
            stats.lobbies_created += 1;
            stats.active_lobbies += 1;
        })?;

        info!(
            "Created {} lobby {} for player {}",
            request.lobby_type, lobby_id, creator
        );
        Ok(lobby_id)
    }

    /// Seat a player in a lobby. A player seated elsewhere is switched over
    /// atomically: the target seat is validated before the old one is vacated,
    /// so a failed switch never leaves the player seatless.
    pub async fn join(
        self: &Arc<Self>,
        lobby_id: LobbyId,
        player_id: &PlayerId,
        team: Team,
        class: &str,
        password: Option<&str>,
    ) -> Result<JoinSummary, LobbyError> {
        let now = current_timestamp();
        self.require_player(player_id).await?;

        if let Some(until) = self
            .player_store
            .active_ban(player_id, BanType::Join, now)
            .await?
        {
            return Err(LobbyError::PlayerBanned {
                activity: BanType::Join.activity().to_string(),
                until,
            });
        }

        let target = self.lobby_handle(lobby_id)?;
        let previous = self.seated_lobby(player_id)?.filter(|id| *id != lobby_id);

        let (outcome, snapshot, previous_snapshot) = match previous {
            None => {
                let mut lobby = target.lock().await;
                let slot = slots::slot_for(lobby.lobby_type(), team, class)?;
                let rollback = lobby.clone();
                let outcome = lobby.join(player_id, slot, password, now)?;
                let snapshot = lobby.snapshot();
                if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                    *lobby = rollback;
                    return Err(e);
                }
                (outcome, snapshot, None)
            }
            Some(previous_id) => {
                let previous_handle = self.lobby_handle(previous_id)?;
                // Lock both lobbies in id order to rule out a switch deadlock
                let (mut old, mut new) = if previous_id < lobby_id {
                    let old = previous_handle.lock().await;
                    let new = target.lock().await;
                    (old, new)
                } else {
                    let new = target.lock().await;
                    let old = previous_handle.lock().await;
                    (old, new)
                };

                let slot = slots::slot_for(new.lobby_type(), team, class)?;
                // Look before you leap: the target seat must be provably
                // joinable before the old one is given up
                new.check_join(player_id, slot, password)?;

                let rollback_old = old.clone();
                let rollback_new = new.clone();
                old.vacate(player_id)?;
                let outcome = match new.join(player_id, slot, password, now) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        *old = rollback_old;
                        return Err(e);
                    }
                };

                let previous_snapshot = old.snapshot();
                let snapshot = new.snapshot();
                let saved = self.lobby_store.save_lobby(&previous_snapshot).await;
                let saved = match saved {
                    Ok(()) => self.lobby_store.save_lobby(&snapshot).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = saved {
                    *old = rollback_old;
                    *new = rollback_new;
                    return Err(e);
                }
                (outcome, snapshot, Some((previous_id, previous_snapshot)))
            }
        };

        self.commit_join(lobby_id, player_id, &outcome, &snapshot, previous_snapshot)?;
        Ok(JoinSummary {
            lobby_id,
            slot: outcome.slot,
            became_full: outcome.became_full,
        })
    }

    /// Post-commit bookkeeping for a join: indices, subscriptions, broadcasts,
    /// and the ready-up timer when the lobby filled.
    fn commit_join(
        self: &Arc<Self>,
        lobby_id: LobbyId,
        player_id: &PlayerId,
        outcome: &JoinOutcome,
        snapshot: &LobbySnapshot,
        previous: Option<(LobbyId, LobbySnapshot)>,
    ) -> Result<(), LobbyError> {
        {
            let mut seated = self.seated_mut()?;
            seated.insert(player_id.clone(), lobby_id);
        }
        {
            let mut spectating = self.spectating_mut()?;
            if let Some(set) = spectating.get_mut(player_id) {
                set.remove(&lobby_id);
            }
        }

        if let Some(connection) = self.broadcaster.connection_for(player_id)? {
            if let Some((previous_id, _)) = &previous {
                let registry = self.broadcaster.registry();
                registry.unsubscribe(connection, &room_name(*previous_id, RoomScope::Public))?;
                registry.unsubscribe(connection, &room_name(*previous_id, RoomScope::Private))?;
            }
            let registry = self.broadcaster.registry();
            registry.subscribe(connection, &room_name(lobby_id, RoomScope::Public))?;
            registry.subscribe(connection, &room_name(lobby_id, RoomScope::Private))?;
        }

        if let Some((previous_id, previous_snapshot)) = &previous {
            self.publish_lobby_data(*previous_id, previous_snapshot)?;
        }
        self.publish_lobby_data(lobby_id, snapshot)?;

        if outcome.became_full {
            self.with_stats(|stats| stats.ready_ups_started += 1)?;
            self.arm_ready_up(lobby_id)?;
            self.broadcaster.publish(
                &room_name(lobby_id, RoomScope::Private),
                &Notification::event(
                    "lobbyReadyUp",
                    json!({ "timeout": self.settings.ready_up_grace_seconds }),
                ),
            )?;
        }

        self.with_stats(|stats| stats.players_joined += 1)?;
        self.refresh_seated_gauge()?;
        Ok(())
    }

    /// Vacate the caller's seat, demoting them to spectator of the same lobby.
    pub async fn leave(&self, lobby_id: LobbyId, player_id: &PlayerId) -> Result<(), LobbyError> {
        let handle = self.lobby_handle(lobby_id)?;
        let snapshot = {
            let mut lobby = handle.lock().await;
            let rollback = lobby.clone();
            lobby.leave(player_id)?;
            let snapshot = lobby.snapshot();
            if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                *lobby = rollback;
                return Err(e);
            }
            snapshot
        };

        self.unseat_index(player_id, lobby_id)?;
        {
            let mut spectating = self.spectating_mut()?;
            spectating
                .entry(player_id.clone())
                .or_default()
                .insert(lobby_id);
        }
        // Spectators keep the public room but lose the private one
        if let Some(connection) = self.broadcaster.connection_for(player_id)? {
            self.broadcaster
                .registry()
                .unsubscribe(connection, &room_name(lobby_id, RoomScope::Private))?;
        }

        self.publish_lobby_data(lobby_id, &snapshot)?;
        self.refresh_seated_gauge()?;
        Ok(())
    }

    /// Kick a player out of a lobby. Creator/admin only; the target becomes a
    /// spectator in data but loses both room subscriptions.
    pub async fn kick(
        &self,
        lobby_id: LobbyId,
        actor_id: &PlayerId,
        target_id: &PlayerId,
    ) -> Result<(), LobbyError> {
        self.remove_by_actor(lobby_id, actor_id, target_id, false)
            .await
    }

    /// Kick plus a lobby-instance ban blocking any rejoin.
    pub async fn ban_from_lobby(
        &self,
        lobby_id: LobbyId,
        actor_id: &PlayerId,
        target_id: &PlayerId,
    ) -> Result<(), LobbyError> {
        self.remove_by_actor(lobby_id, actor_id, target_id, true)
            .await
    }

    async fn remove_by_actor(
        &self,
        lobby_id: LobbyId,
        actor_id: &PlayerId,
        target_id: &PlayerId,
        ban: bool,
    ) -> Result<(), LobbyError> {
        let action = if ban { "ban" } else { "kick" };
        if actor_id == target_id {
            return Err(LobbyError::CannotTargetSelf {
                action: action.to_string(),
            });
        }
        let actor = self.require_player(actor_id).await?;

        let handle = self.lobby_handle(lobby_id)?;
        let snapshot = {
            let mut lobby = handle.lock().await;
            let rollback = lobby.clone();
            if ban {
                lobby.ban_player(&actor, target_id)?;
            } else {
                lobby.kick(&actor, target_id)?;
            }
            let snapshot = lobby.snapshot();
            if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                *lobby = rollback;
                return Err(e);
            }
            snapshot
        };

        self.unseat_index(target_id, lobby_id)?;
        {
            let mut spectating = self.spectating_mut()?;
            spectating
                .entry(target_id.clone())
                .or_default()
                .insert(lobby_id);
        }
        if let Some(connection) = self.broadcaster.connection_for(target_id)? {
            let registry = self.broadcaster.registry();
            registry.unsubscribe(connection, &room_name(lobby_id, RoomScope::Public))?;
            registry.unsubscribe(connection, &room_name(lobby_id, RoomScope::Private))?;
        }

        self.publish_lobby_data(lobby_id, &snapshot)?;
        self.broadcaster.send_direct(
            target_id,
            Notification::event(
                "sendNotification",
                json!({
                    "notification":
                        format!("You have been removed from Lobby #{}", lobby_id)
                }),
            ),
        )?;
        self.refresh_seated_gauge()?;
        debug!(
            "Player {} {}ed from lobby {} by {}",
            target_id, action, lobby_id, actor_id
        );
        Ok(())
    }

    /// Add a player to a lobby's spectator set. A seat held in a different
    /// lobby and any other spectated lobbies are vacated first; the target is
    /// validated before anything is given up.
    pub async fn spectate(&self, lobby_id: LobbyId, player_id: &PlayerId) -> Result<(), LobbyError> {
        self.require_player(player_id).await?;
        let target = self.lobby_handle(lobby_id)?;

        // Already involved in this lobby: just refresh the client's view
        let seat_here = self.seated_lobby(player_id)? == Some(lobby_id);
        let spectating_here = self.spectated_lobbies(player_id)?.contains(&lobby_id);
        if seat_here || spectating_here {
            let snapshot = target.lock().await.snapshot();
            self.broadcaster.send_direct(
                player_id,
                Notification::event("lobbyData", serde_json::to_value(&snapshot).unwrap_or_default()),
            )?;
            return Ok(());
        }

        let previous_seat = self.seated_lobby(player_id)?;
        let (snapshot, vacated_snapshot) = match previous_seat {
            None => {
                let mut lobby = target.lock().await;
                let rollback = lobby.clone();
                lobby.add_spectator(player_id)?;
                let snapshot = lobby.snapshot();
                if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                    *lobby = rollback;
                    return Err(e);
                }
                (snapshot, None)
            }
            Some(previous_id) => {
                let previous_handle = self.lobby_handle(previous_id)?;
                let (mut old, mut new) = if previous_id < lobby_id {
                    let old = previous_handle.lock().await;
                    let new = target.lock().await;
                    (old, new)
                } else {
                    let new = target.lock().await;
                    let old = previous_handle.lock().await;
                    (old, new)
                };

                if new.state() == LobbyState::Ended {
                    return Err(LobbyError::LobbyClosed);
                }
                let rollback_old = old.clone();
                let rollback_new = new.clone();
                old.vacate(player_id)?;
                if let Err(e) = new.add_spectator(player_id) {
                    *old = rollback_old;
                    return Err(e);
                }

                let vacated = old.snapshot();
                let snapshot = new.snapshot();
                let saved = match self.lobby_store.save_lobby(&vacated).await {
                    Ok(()) => self.lobby_store.save_lobby(&snapshot).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = saved {
                    *old = rollback_old;
                    *new = rollback_new;
                    return Err(e);
                }
                (snapshot, Some((previous_id, vacated)))
            }
        };

        if let Some((previous_id, _)) = &vacated_snapshot {
            self.unseat_index(player_id, *previous_id)?;
        }
        // Leave every other spectated lobby
        let others: Vec<LobbyId> = self
            .spectated_lobbies(player_id)?
            .into_iter()
            .filter(|id| *id != lobby_id)
            .collect();
        for other_id in others {
            if let Err(e) = self.unspectate(other_id, player_id).await {
                debug!(
                    "Could not drop {} from spectated lobby {}: {}",
                    player_id, other_id, e
                );
            }
        }
        {
            let mut spectating = self.spectating_mut()?;
            spectating
                .entry(player_id.clone())
                .or_default()
                .insert(lobby_id);
        }

        if let Some(connection) = self.broadcaster.connection_for(player_id)? {
            let registry = self.broadcaster.registry();
            if let Some((previous_id, _)) = &vacated_snapshot {
                registry.unsubscribe(connection, &room_name(*previous_id, RoomScope::Public))?;
                registry.unsubscribe(connection, &room_name(*previous_id, RoomScope::Private))?;
            }
            registry.subscribe(connection, &room_name(lobby_id, RoomScope::Public))?;
        }

        if let Some((previous_id, vacated)) = &vacated_snapshot {
            self.publish_lobby_data(*previous_id, vacated)?;
        }
        self.publish_lobby_data(lobby_id, &snapshot)?;
        self.broadcaster.send_direct(
            player_id,
            Notification::event("lobbyData", serde_json::to_value(&snapshot).unwrap_or_default()),
        )?;
        self.refresh_seated_gauge()?;
        Ok(())
    }

    /// Remove a player from a lobby's spectator set.
    pub async fn unspectate(
        &self,
        lobby_id: LobbyId,
        player_id: &PlayerId,
    ) -> Result<(), LobbyError> {
        let handle = self.lobby_handle(lobby_id)?;
        let snapshot = {
            let mut lobby = handle.lock().await;
            let rollback = lobby.clone();
            lobby.remove_spectator(player_id)?;
            let snapshot = lobby.snapshot();
            if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                *lobby = rollback;
                return Err(e);
            }
            snapshot
        };

        {
            let mut spectating = self.spectating_mut()?;
            if let Some(set) = spectating.get_mut(player_id) {
                set.remove(&lobby_id);
                if set.is_empty() {
                    spectating.remove(player_id);
                }
            }
        }
        if let Some(connection) = self.broadcaster.connection_for(player_id)? {
            self.broadcaster
                .registry()
                .unsubscribe(connection, &room_name(lobby_id, RoomScope::Public))?;
        }
        self.publish_lobby_data(lobby_id, &snapshot)?;
        Ok(())
    }

    /// Close a lobby. Creator/admin only; clears all membership, cancels the
    /// ready-up timer, and releases the game server (release failure is logged
    /// and the close proceeds).
    pub async fn close(&self, lobby_id: LobbyId, actor_id: &PlayerId) -> Result<(), LobbyError> {
        let actor = self.require_player(actor_id).await?;

        let handle = self.lobby_handle(lobby_id)?;
        let (outcome, snapshot) = {
            let mut lobby = handle.lock().await;
            let rollback = lobby.clone();
            let outcome = lobby.close(&actor)?;
            let snapshot = lobby.snapshot();
            if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                *lobby = rollback;
                return Err(e);
            }
            (outcome, snapshot)
        };

        self.scheduler.cancel(lobby_id)?;
        if let Err(e) = self.provisioner.release(lobby_id).await {
            warn!("Failed to release server for lobby {}: {}", lobby_id, e);
        }

        // Notify while members are still subscribed, then drop the rooms
        self.broadcaster.publish(
            &room_name(lobby_id, RoomScope::Public),
            &Notification::event(
                "sendNotification",
                json!({ "notification": format!("Lobby closed by {}", actor.name) }),
            ),
        )?;
        self.publish_lobby_data(lobby_id, &snapshot)?;

        let registry = self.broadcaster.registry();
        for player in outcome.seated.iter().chain(outcome.spectators.iter()) {
            if let Some(connection) = self.broadcaster.connection_for(player)? {
                registry.unsubscribe(connection, &room_name(lobby_id, RoomScope::Public))?;
                registry.unsubscribe(connection, &room_name(lobby_id, RoomScope::Private))?;
            }
        }
        for player in &outcome.seated {
            self.unseat_index(player, lobby_id)?;
        }
        {
            let mut spectating = self.spectating_mut()?;
            for player in &outcome.spectators {
                if let Some(set) = spectating.get_mut(player) {
                    set.remove(&lobby_id);
                    if set.is_empty() {
                        spectating.remove(player);
                    }
                }
            }
        }

        self.with_stats(|stats| {
            stats.lobbies_closed += 1;
            stats.active_lobbies = stats.active_lobbies.saturating_sub(1);
        })?;
        self.refresh_seated_gauge()?;
        info!("Lobby {} closed by {}", lobby_id, actor_id);
        Ok(())
    }

    /// Record a seated player's ready confirmation. When the last player
    /// confirms, the lobby goes `InProgress` and each seated player receives a
    /// direct start notification.
    pub async fn confirm_ready(
        &self,
        lobby_id: LobbyId,
        player_id: &PlayerId,
    ) -> Result<bool, LobbyError> {
        let handle = self.lobby_handle(lobby_id)?;
        let (all_ready, snapshot) = {
            let mut lobby = handle.lock().await;
            let rollback = lobby.clone();
            let all_ready = lobby.confirm_ready(player_id)?;
            let snapshot = lobby.snapshot();
            if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                *lobby = rollback;
                return Err(e);
            }
            (all_ready, snapshot)
        };

        self.publish_lobby_data(lobby_id, &snapshot)?;
        if all_ready {
            self.scheduler.cancel(lobby_id)?;
            self.with_stats(|stats| stats.matches_started += 1)?;
            for slot in &snapshot.slots {
                if let Some(player) = &slot.player {
                    self.broadcaster.send_direct(
                        player,
                        Notification::event("lobbyStart", json!({ "id": lobby_id })),
                    )?;
                }
            }
            info!("Lobby {} fully confirmed, match starting", lobby_id);
        }
        Ok(all_ready)
    }

    /// Ready-up deadline passed. Invoked by the scheduler, but safe to call
    /// from anywhere: a lobby that already progressed or closed is left alone.
    pub async fn expire_ready_up(&self, lobby_id: LobbyId) -> Result<(), LobbyError> {
        let handle = match self.lobby_handle(lobby_id) {
            Ok(handle) => handle,
            // Lobby vanished before the timer fired; nothing to expire
            Err(_) => return Ok(()),
        };

        let (outcome, snapshot) = {
            let mut lobby = handle.lock().await;
            let rollback = lobby.clone();
            let outcome = lobby.expire_ready_up();
            if !outcome.reverted {
                return Ok(());
            }
            let snapshot = lobby.snapshot();
            if let Err(e) = self.lobby_store.save_lobby(&snapshot).await {
                *lobby = rollback;
                return Err(e);
            }
            (outcome, snapshot)
        };

        let registry = self.broadcaster.registry();
        for player in &outcome.removed {
            self.unseat_index(player, lobby_id)?;
            if let Some(connection) = self.broadcaster.connection_for(player)? {
                registry.unsubscribe(connection, &room_name(lobby_id, RoomScope::Public))?;
                registry.unsubscribe(connection, &room_name(lobby_id, RoomScope::Private))?;
            }
            self.broadcaster.send_direct(
                player,
                Notification::event(
                    "sendNotification",
                    json!({
                        "notification":
                            format!("You were removed from Lobby #{}: ready-up expired", lobby_id)
                    }),
                ),
            )?;
        }

        self.publish_lobby_data(lobby_id, &snapshot)?;
        self.with_stats(|stats| stats.ready_ups_expired += 1)?;
        self.refresh_seated_gauge()?;
        info!(
            "Ready-up expired for lobby {}, removed {} unready players",
            lobby_id,
            outcome.removed.len()
        );
        Ok(())
    }

    /// Transport closed: drop subscriptions only. The seat is the
    /// authoritative membership state and survives a reconnect.
    pub fn handle_disconnect(&self, connection: crate::types::ConnectionId) -> Result<(), LobbyError> {
        let dropped = self.broadcaster.drop_connection(connection)?;
        debug!(
            "Connection {} disconnected, dropped {} room subscriptions",
            connection,
            dropped.len()
        );
        Ok(())
    }

    /// Snapshots of all lobbies currently open for joining, newest first.
    pub async fn list_waiting(&self) -> Result<Vec<LobbySnapshot>, LobbyError> {
        let handles: Vec<Arc<Mutex<LobbyInstance>>> = {
            let lobbies = self.lobbies_ref()?;
            lobbies.values().cloned().collect()
        };

        let mut waiting = Vec::new();
        for handle in handles {
            let lobby = handle.lock().await;
            if lobby.state() == LobbyState::Waiting {
                waiting.push(lobby.snapshot());
            }
        }
        waiting.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(waiting)
    }

    /// Point-in-time snapshot of one lobby.
    pub async fn snapshot(&self, lobby_id: LobbyId) -> Result<LobbySnapshot, LobbyError> {
        let handle = self.lobby_handle(lobby_id)?;
        let lobby = handle.lock().await;
        Ok(lobby.snapshot())
    }

    /// The lobby a player is currently seated in, if any.
    pub fn seated_lobby(&self, player_id: &PlayerId) -> Result<Option<LobbyId>, LobbyError> {
        let seated = self.seated.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire seated lock".to_string(),
        })?;
        Ok(seated.get(player_id).copied())
    }

    /// Lobbies a player currently spectates.
    pub fn spectated_lobbies(&self, player_id: &PlayerId) -> Result<Vec<LobbyId>, LobbyError> {
        let spectating = self.spectating.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire spectating lock".to_string(),
        })?;
        Ok(spectating
            .get(player_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Get current manager statistics
    pub fn get_stats(&self) -> Result<LobbyManagerStats, LobbyError> {
        let stats = self.stats.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        Ok(stats.clone())
    }

    /// Number of armed ready-up timers. Exposed for tests and health checks.
    pub fn armed_timers(&self) -> usize {
        self.scheduler.armed_count()
    }

    /// Abort background timers. Used on shutdown.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn arm_ready_up(self: &Arc<Self>, lobby_id: LobbyId) -> Result<(), LobbyError> {
        let weak = Arc::downgrade(self);
        let delay = std::time::Duration::from_secs(self.settings.ready_up_grace_seconds as u64);
        self.scheduler.arm(lobby_id, delay, move || async move {
            // Reference the lobby by id, never by captured state; the expiry
            // path re-checks the current state under the lobby lock
            if let Some(manager) = weak.upgrade() {
                if let Err(e) = manager.expire_ready_up(lobby_id).await {
                    error!("Ready-up expiry for lobby {} failed: {}", lobby_id, e);
                }
            }
        })
    }

    fn publish_lobby_data(
        &self,
        lobby_id: LobbyId,
        snapshot: &LobbySnapshot,
    ) -> Result<(), LobbyError> {
        let data = serde_json::to_value(snapshot).map_err(|e| LobbyError::Internal {
            message: format!("Failed to serialize lobby snapshot: {}", e),
        })?;
        self.broadcaster.publish(
            &room_name(lobby_id, RoomScope::Public),
            &Notification::event("lobbyData", data),
        )?;
        Ok(())
    }

    async fn require_player(&self, player_id: &PlayerId) -> Result<Player, LobbyError> {
        self.player_store
            .load_player(player_id)
            .await?
            .ok_or_else(|| LobbyError::PlayerNotFound {
                player_id: player_id.clone(),
            })
    }

    fn lobby_handle(&self, lobby_id: LobbyId) -> Result<Arc<Mutex<LobbyInstance>>, LobbyError> {
        let lobbies = self.lobbies_ref()?;
        lobbies
            .get(&lobby_id)
            .cloned()
            .ok_or(LobbyError::LobbyNotFound { lobby_id })
    }

    fn unseat_index(&self, player_id: &PlayerId, lobby_id: LobbyId) -> Result<(), LobbyError> {
        let mut seated = self.seated_mut()?;
        if seated.get(player_id) == Some(&lobby_id) {
            seated.remove(player_id);
        }
        Ok(())
    }

    fn refresh_seated_gauge(&self) -> Result<(), LobbyError> {
        let count = {
            let seated = self.seated.read().map_err(|_| LobbyError::Internal {
                message: "Failed to acquire seated lock".to_string(),
            })?;
            seated.len()
        };
        self.with_stats(|stats| stats.players_seated = count)
    }

    fn lobbies_ref(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<LobbyId, Arc<Mutex<LobbyInstance>>>>, LobbyError>
    {
        self.lobbies.read().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire lobbies lock".to_string(),
        })
    }

    fn lobbies_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<LobbyId, Arc<Mutex<LobbyInstance>>>>, LobbyError>
    {
        self.lobbies.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire lobbies lock".to_string(),
        })
    }

    fn seated_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PlayerId, LobbyId>>, LobbyError> {
        self.seated.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire seated lock".to_string(),
        })
    }

    fn spectating_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PlayerId, HashSet<LobbyId>>>, LobbyError>
    {
        self.spectating.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire spectating lock".to_string(),
        })
    }

    fn with_stats(&self, update: impl FnOnce(&mut LobbyManagerStats)) -> Result<(), LobbyError> {
        let mut stats = self.stats.write().map_err(|_| LobbyError::Internal {
            message: "Failed to acquire stats lock".to_string(),
        })?;
        update(&mut stats);
        Ok(())
    }
}
