//! Lobby instance implementation and lifecycle management
//!
//! This module contains the core lobby state machine: slot occupancy,
//! spectators, the ready-up protocol, and the transitions between
//! `Waiting → ReadyingUp → InProgress → Ended`.
//!
//! An instance only mutates itself; cross-lobby invariants (a player seated in
//! at most one lobby) and everything involving connections or broadcasts live
//! in the manager. Every mutating operation validates fully before touching
//! state, so a failed call leaves the lobby exactly as it was.

use crate::error::LobbyError;
use crate::lobby::slots;
use crate::types::{LobbyId, LobbyType, Player, PlayerId, Role, Team};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Possible states of a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyState {
    /// Lobby has open seats
    Waiting,
    /// All seats filled, waiting for every player to confirm within the grace period
    ReadyingUp,
    /// Every seated player confirmed; the match is running
    InProgress,
    /// Closed. Terminal: no transition leaves this state.
    Ended,
}

impl std::fmt::Display for LobbyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyState::Waiting => write!(f, "waiting"),
            LobbyState::ReadyingUp => write!(f, "readyingUp"),
            LobbyState::InProgress => write!(f, "inProgress"),
            LobbyState::Ended => write!(f, "ended"),
        }
    }
}

/// A single occupied seat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub player: PlayerId,
    pub ready: bool,
}

/// Creation-time options for a lobby
#[derive(Debug, Clone)]
pub struct LobbyOptions {
    /// Join password. Empty strings are normalized to no password.
    pub password: Option<String>,
    /// Steam group slug stored for collaborators that resolve membership.
    pub steam_group: Option<String>,
    /// Explicit allow-list of player ids; `None` means open to everyone.
    pub allowed_players: Option<HashSet<PlayerId>>,
    /// Grace period granted once the lobby fills.
    pub ready_up_grace: Duration,
}

impl Default for LobbyOptions {
    fn default() -> Self {
        Self {
            password: None,
            steam_group: None,
            allowed_players: None,
            ready_up_grace: Duration::seconds(30),
        }
    }
}

impl LobbyOptions {
    pub fn with_grace_seconds(seconds: i64) -> Self {
        Self {
            ready_up_grace: Duration::seconds(seconds),
            ..Default::default()
        }
    }
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    /// The slot the player now occupies
    pub slot: usize,
    /// True when this join filled the last seat and started the ready-up phase
    pub became_full: bool,
    /// The ready-up deadline, set iff `became_full`
    pub deadline: Option<DateTime<Utc>>,
}

/// Players affected by closing a lobby
#[derive(Debug, Clone, Default)]
pub struct CloseOutcome {
    pub seated: Vec<PlayerId>,
    pub spectators: Vec<PlayerId>,
}

/// Players removed by a ready-up expiry
#[derive(Debug, Clone, Default)]
pub struct ExpiryOutcome {
    /// Occupants that never confirmed; their seats were vacated
    pub removed: Vec<PlayerId>,
    /// True when the expiry actually reverted a ready-up (false on the no-op path)
    pub reverted: bool,
}

/// One lobby's mutable state and its transition rules.
#[derive(Debug, Clone)]
pub struct LobbyInstance {
    id: LobbyId,
    lobby_type: LobbyType,
    created_by: PlayerId,
    state: LobbyState,
    seats: Vec<Option<Seat>>,
    spectators: HashSet<PlayerId>,
    banned: HashSet<PlayerId>,
    password: Option<String>,
    steam_group: Option<String>,
    allowed_players: Option<HashSet<PlayerId>>,
    ready_up_grace: Duration,
    ready_up_deadline: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl LobbyInstance {
    pub fn new(
        id: LobbyId,
        lobby_type: LobbyType,
        created_by: PlayerId,
        options: LobbyOptions,
        now: DateTime<Utc>,
    ) -> Self {
        let capacity = slots::capacity_of(lobby_type);
        let grace = if options.ready_up_grace > Duration::zero() {
            options.ready_up_grace
        } else {
            Duration::seconds(30)
        };
        Self {
            id,
            lobby_type,
            created_by,
            state: LobbyState::Waiting,
            seats: vec![None; capacity],
            spectators: HashSet::new(),
            banned: HashSet::new(),
            password: options.password.filter(|p| !p.is_empty()),
            steam_group: options.steam_group,
            allowed_players: options.allowed_players,
            ready_up_grace: grace,
            ready_up_deadline: None,
            created_at: now,
        }
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn lobby_type(&self) -> LobbyType {
        self.lobby_type
    }

    pub fn state(&self) -> LobbyState {
        self.state
    }

    pub fn created_by(&self) -> &PlayerId {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn steam_group(&self) -> Option<&str> {
        self.steam_group.as_deref()
    }

    pub fn ready_up_deadline(&self) -> Option<DateTime<Utc>> {
        self.ready_up_deadline
    }

    pub fn capacity(&self) -> usize {
        self.seats.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.seats.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.occupied_count() == self.capacity()
    }

    /// The slot a player occupies in this lobby, if any.
    pub fn seat_of(&self, player: &PlayerId) -> Option<usize> {
        self.seats
            .iter()
            .position(|seat| seat.as_ref().is_some_and(|s| &s.player == player))
    }

    pub fn is_seated(&self, player: &PlayerId) -> bool {
        self.seat_of(player).is_some()
    }

    pub fn is_spectating(&self, player: &PlayerId) -> bool {
        self.spectators.contains(player)
    }

    pub fn seated_players(&self) -> Vec<PlayerId> {
        self.seats
            .iter()
            .flatten()
            .map(|seat| seat.player.clone())
            .collect()
    }

    pub fn spectators(&self) -> Vec<PlayerId> {
        self.spectators.iter().cloned().collect()
    }

    fn can_manage(&self, actor: &Player) -> bool {
        actor.id == self.created_by || actor.role == Role::Admin
    }

    /// Validate a join without mutating anything. This is the
    /// look-before-you-leap half of cross-lobby switching: the manager calls
    /// it on the target lobby before vacating the player's old seat.
    pub fn check_join(
        &self,
        player: &PlayerId,
        slot: usize,
        password: Option<&str>,
    ) -> Result<(), LobbyError> {
        match self.state {
            LobbyState::Ended => return Err(LobbyError::LobbyClosed),
            LobbyState::InProgress => return Err(LobbyError::LobbyInProgress),
            LobbyState::Waiting | LobbyState::ReadyingUp => {}
        }
        if slot >= self.capacity() {
            return Err(LobbyError::InvalidSlot {
                slot: format!("index {}", slot),
            });
        }
        if self.banned.contains(player) {
            return Err(LobbyError::BannedFromLobby);
        }
        if let Some(allowed) = &self.allowed_players {
            if !allowed.contains(player) {
                return Err(LobbyError::NotAuthorized {
                    action: "join this lobby".to_string(),
                });
            }
        }
        if let Some(expected) = &self.password {
            if password != Some(expected.as_str()) {
                return Err(LobbyError::WrongPassword);
            }
        }
        if self.seats[slot].is_some() {
            return Err(LobbyError::SlotOccupied { slot });
        }
        Ok(())
    }

    /// Seat a player. Switching slots within the same lobby vacates the old
    /// seat as part of the same call; a seated player is never a spectator.
    pub fn join(
        &mut self,
        player: &PlayerId,
        slot: usize,
        password: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, LobbyError> {
        self.check_join(player, slot, password)?;

        if let Some(previous) = self.seat_of(player) {
            self.seats[previous] = None;
        }
        self.spectators.remove(player);
        self.seats[slot] = Some(Seat {
            player: player.clone(),
            ready: false,
        });

        let mut became_full = false;
        if self.state == LobbyState::Waiting && self.is_full() {
            self.state = LobbyState::ReadyingUp;
            self.ready_up_deadline = Some(now + self.ready_up_grace);
            became_full = true;
        }

        Ok(JoinOutcome {
            slot,
            became_full,
            deadline: self.ready_up_deadline.filter(|_| became_full),
        })
    }

    /// Vacate a player's seat without the spectator demotion. Used when the
    /// player is switching to a different lobby.
    pub fn vacate(&mut self, player: &PlayerId) -> Result<(), LobbyError> {
        match self.state {
            LobbyState::Ended => return Err(LobbyError::LobbyClosed),
            LobbyState::InProgress => return Err(LobbyError::LobbyInProgress),
            LobbyState::Waiting | LobbyState::ReadyingUp => {}
        }
        let slot = self.seat_of(player).ok_or(LobbyError::PlayerNotSeated)?;
        self.seats[slot] = None;
        if self.state == LobbyState::ReadyingUp {
            // No longer full; the armed timer becomes a no-op via the
            // state re-check at fire time.
            self.revert_to_waiting();
        }
        Ok(())
    }

    /// Vacate a player's seat and demote them to spectator.
    pub fn leave(&mut self, player: &PlayerId) -> Result<(), LobbyError> {
        self.vacate_and_spectate(player)
    }

    /// Same effect as [`leave`](Self::leave) but attributed to another actor.
    /// Room-subscription removal for the target is the manager's half.
    pub fn kick(&mut self, actor: &Player, target: &PlayerId) -> Result<(), LobbyError> {
        if !self.can_manage(actor) {
            return Err(LobbyError::NotAuthorized {
                action: "kick players".to_string(),
            });
        }
        self.vacate_and_spectate(target)
    }

    /// Kick plus a lobby-local ban: the target cannot rejoin this instance.
    pub fn ban_player(&mut self, actor: &Player, target: &PlayerId) -> Result<(), LobbyError> {
        self.kick(actor, target)?;
        self.banned.insert(target.clone());
        Ok(())
    }

    fn vacate_and_spectate(&mut self, player: &PlayerId) -> Result<(), LobbyError> {
        self.vacate(player)?;
        self.spectators.insert(player.clone());
        Ok(())
    }

    /// Add a spectator. Idempotent; only a closed lobby refuses.
    pub fn add_spectator(&mut self, player: &PlayerId) -> Result<(), LobbyError> {
        if self.state == LobbyState::Ended {
            return Err(LobbyError::LobbyClosed);
        }
        self.spectators.insert(player.clone());
        Ok(())
    }

    pub fn remove_spectator(&mut self, player: &PlayerId) -> Result<(), LobbyError> {
        if !self.spectators.remove(player) {
            return Err(LobbyError::NotSpectating);
        }
        Ok(())
    }

    /// Force the lobby to `Ended`, clearing all membership. Terminal.
    pub fn close(&mut self, actor: &Player) -> Result<CloseOutcome, LobbyError> {
        if !self.can_manage(actor) {
            return Err(LobbyError::NotAuthorized {
                action: "close lobby".to_string(),
            });
        }
        if self.state == LobbyState::Ended {
            return Err(LobbyError::AlreadyClosed);
        }

        let outcome = CloseOutcome {
            seated: self.seated_players(),
            spectators: self.spectators(),
        };
        for seat in self.seats.iter_mut() {
            *seat = None;
        }
        self.spectators.clear();
        self.ready_up_deadline = None;
        self.state = LobbyState::Ended;
        Ok(outcome)
    }

    /// Mark a seated player's ready confirmation. When the last seat confirms,
    /// the lobby transitions to `InProgress`. Returns whether everyone has
    /// confirmed.
    pub fn confirm_ready(&mut self, player: &PlayerId) -> Result<bool, LobbyError> {
        match self.state {
            LobbyState::Ended => return Err(LobbyError::LobbyClosed),
            LobbyState::InProgress => return Err(LobbyError::LobbyInProgress),
            LobbyState::Waiting => return Err(LobbyError::NotReadyingUp),
            LobbyState::ReadyingUp => {}
        }
        let slot = self.seat_of(player).ok_or(LobbyError::PlayerNotSeated)?;
        if let Some(seat) = self.seats[slot].as_mut() {
            seat.ready = true;
        }

        let all_ready = self
            .seats
            .iter()
            .all(|seat| seat.as_ref().is_some_and(|s| s.ready));
        if all_ready {
            self.state = LobbyState::InProgress;
            self.ready_up_deadline = None;
        }
        Ok(all_ready)
    }

    /// Ready-up deadline passed without full confirmation: vacate every seat
    /// that never confirmed, reset the confirmations that did arrive, and fall
    /// back to `Waiting`. Idempotent — calling this against a lobby that
    /// already progressed or closed changes nothing.
    pub fn expire_ready_up(&mut self) -> ExpiryOutcome {
        if self.state != LobbyState::ReadyingUp {
            return ExpiryOutcome::default();
        }

        let mut removed = Vec::new();
        for seat in self.seats.iter_mut() {
            match seat {
                Some(s) if !s.ready => {
                    removed.push(s.player.clone());
                    *seat = None;
                }
                Some(s) => s.ready = false,
                None => {}
            }
        }
        self.state = LobbyState::Waiting;
        self.ready_up_deadline = None;
        ExpiryOutcome {
            removed,
            reverted: true,
        }
    }

    fn revert_to_waiting(&mut self) {
        self.state = LobbyState::Waiting;
        self.ready_up_deadline = None;
        for seat in self.seats.iter_mut().flatten() {
            seat.ready = false;
        }
    }

    /// Serializable view used for store writes and `lobbyData` payloads.
    pub fn snapshot(&self) -> LobbySnapshot {
        let slots = self
            .seats
            .iter()
            .enumerate()
            .map(|(index, seat)| {
                let (team, class) = slots::slot_info(self.lobby_type, index)
                    .expect("seat index within capacity");
                SlotSnapshot {
                    slot: index,
                    team,
                    class: class.to_string(),
                    player: seat.as_ref().map(|s| s.player.clone()),
                    ready: seat.as_ref().map(|s| s.ready).unwrap_or(false),
                }
            })
            .collect();

        LobbySnapshot {
            id: self.id,
            lobby_type: self.lobby_type,
            state: self.state,
            created_by: self.created_by.clone(),
            slots,
            spectators: self.spectators(),
            ready_up_deadline: self.ready_up_deadline,
            created_at: self.created_at,
        }
    }
}

/// One slot in a [`LobbySnapshot`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub slot: usize,
    pub team: Team,
    pub class: String,
    pub player: Option<PlayerId>,
    pub ready: bool,
}

/// Point-in-time serializable view of a lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub id: LobbyId,
    #[serde(rename = "type")]
    pub lobby_type: LobbyType,
    pub state: LobbyState,
    pub created_by: PlayerId,
    pub slots: Vec<SlotSnapshot>,
    pub spectators: Vec<PlayerId>,
    pub ready_up_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::current_timestamp;

    fn test_lobby(lobby_type: LobbyType) -> LobbyInstance {
        LobbyInstance::new(
            1,
            lobby_type,
            "creator".to_string(),
            LobbyOptions::default(),
            current_timestamp(),
        )
    }

    fn fill_lobby(lobby: &mut LobbyInstance) -> DateTime<Utc> {
        let now = current_timestamp();
        for slot in 0..lobby.capacity() {
            let player = format!("player{}", slot);
            lobby.join(&player, slot, None, now).unwrap();
        }
        now
    }

    #[test]
    fn test_new_lobby_is_waiting_and_empty() {
        let lobby = test_lobby(LobbyType::Sixes);
        assert_eq!(lobby.state(), LobbyState::Waiting);
        assert_eq!(lobby.capacity(), 12);
        assert_eq!(lobby.occupied_count(), 0);
        assert!(lobby.ready_up_deadline().is_none());
    }

    #[test]
    fn test_join_occupies_slot() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let outcome = lobby
            .join(&"alice".to_string(), 0, None, current_timestamp())
            .unwrap();
        assert_eq!(outcome.slot, 0);
        assert!(!outcome.became_full);
        assert!(lobby.is_seated(&"alice".to_string()));
        assert_eq!(lobby.occupied_count(), 1);
    }

    #[test]
    fn test_join_occupied_slot_fails() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let now = current_timestamp();
        lobby.join(&"alice".to_string(), 0, None, now).unwrap();

        let err = lobby.join(&"bob".to_string(), 0, None, now).unwrap_err();
        assert_eq!(err, LobbyError::SlotOccupied { slot: 0 });
        // Failed join mutates nothing
        assert!(!lobby.is_seated(&"bob".to_string()));
    }

    #[test]
    fn test_join_out_of_range_slot_fails() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        let err = lobby
            .join(&"alice".to_string(), 4, None, current_timestamp())
            .unwrap_err();
        assert!(matches!(err, LobbyError::InvalidSlot { .. }));
    }

    #[test]
    fn test_in_lobby_slot_switch_vacates_old_seat() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let now = current_timestamp();
        lobby.join(&"alice".to_string(), 0, None, now).unwrap();
        lobby.join(&"alice".to_string(), 5, None, now).unwrap();

        assert_eq!(lobby.seat_of(&"alice".to_string()), Some(5));
        assert_eq!(lobby.occupied_count(), 1);
    }

    #[test]
    fn test_password_checked_on_join() {
        let now = current_timestamp();
        let mut lobby = LobbyInstance::new(
            1,
            LobbyType::Ultiduo,
            "creator".to_string(),
            LobbyOptions {
                password: Some("hunter2".to_string()),
                ..Default::default()
            },
            now,
        );

        assert_eq!(
            lobby.join(&"alice".to_string(), 0, None, now).unwrap_err(),
            LobbyError::WrongPassword
        );
        assert_eq!(
            lobby
                .join(&"alice".to_string(), 0, Some("wrong"), now)
                .unwrap_err(),
            LobbyError::WrongPassword
        );
        assert!(lobby
            .join(&"alice".to_string(), 0, Some("hunter2"), now)
            .is_ok());
    }

    #[test]
    fn test_empty_password_means_open_lobby() {
        let now = current_timestamp();
        let mut lobby = LobbyInstance::new(
            1,
            LobbyType::Ultiduo,
            "creator".to_string(),
            LobbyOptions {
                password: Some(String::new()),
                ..Default::default()
            },
            now,
        );
        assert!(lobby.join(&"alice".to_string(), 0, None, now).is_ok());
    }

    #[test]
    fn test_allow_list_rejects_outsiders() {
        let now = current_timestamp();
        let mut allowed = HashSet::new();
        allowed.insert("alice".to_string());
        let mut lobby = LobbyInstance::new(
            1,
            LobbyType::Ultiduo,
            "creator".to_string(),
            LobbyOptions {
                allowed_players: Some(allowed),
                ..Default::default()
            },
            now,
        );

        assert!(matches!(
            lobby.join(&"bob".to_string(), 0, None, now).unwrap_err(),
            LobbyError::NotAuthorized { .. }
        ));
        assert!(lobby.join(&"alice".to_string(), 0, None, now).is_ok());
    }

    #[test]
    fn test_filling_last_slot_starts_ready_up() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        let now = current_timestamp();
        lobby.join(&"p0".to_string(), 0, None, now).unwrap();
        lobby.join(&"p1".to_string(), 1, None, now).unwrap();
        lobby.join(&"p2".to_string(), 2, None, now).unwrap();
        assert_eq!(lobby.state(), LobbyState::Waiting);

        let outcome = lobby.join(&"p3".to_string(), 3, None, now).unwrap();
        assert!(outcome.became_full);
        assert_eq!(lobby.state(), LobbyState::ReadyingUp);
        assert_eq!(outcome.deadline, Some(now + Duration::seconds(30)));
        assert_eq!(lobby.ready_up_deadline(), outcome.deadline);
    }

    #[test]
    fn test_join_then_leave_restores_slot_configuration() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let now = current_timestamp();
        lobby.join(&"alice".to_string(), 2, None, now).unwrap();
        let before: Vec<Option<Seat>> = lobby.seats.clone();

        lobby.join(&"bob".to_string(), 7, None, now).unwrap();
        lobby.leave(&"bob".to_string()).unwrap();

        assert_eq!(lobby.seats, before);
        assert!(lobby.is_spectating(&"bob".to_string()));
    }

    #[test]
    fn test_leave_when_not_seated_fails() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        assert_eq!(
            lobby.leave(&"ghost".to_string()).unwrap_err(),
            LobbyError::PlayerNotSeated
        );
    }

    #[test]
    fn test_leave_during_ready_up_reverts_to_waiting() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        fill_lobby(&mut lobby);
        assert_eq!(lobby.state(), LobbyState::ReadyingUp);
        lobby.confirm_ready(&"player0".to_string()).unwrap();

        lobby.leave(&"player1".to_string()).unwrap();

        assert_eq!(lobby.state(), LobbyState::Waiting);
        assert!(lobby.ready_up_deadline().is_none());
        // Prior confirmations do not survive the revert
        let seat0 = lobby.seats[0].as_ref().unwrap();
        assert!(!seat0.ready);
    }

    #[test]
    fn test_kick_requires_creator_or_admin() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let now = current_timestamp();
        lobby.join(&"alice".to_string(), 0, None, now).unwrap();
        lobby.join(&"bob".to_string(), 1, None, now).unwrap();

        let peon = Player::new("bob", "Bob");
        let err = lobby.kick(&peon, &"alice".to_string()).unwrap_err();
        assert!(matches!(err, LobbyError::NotAuthorized { .. }));
        // Rejection mutates nothing
        assert!(lobby.is_seated(&"alice".to_string()));

        let creator = Player::new("creator", "Creator");
        lobby.kick(&creator, &"alice".to_string()).unwrap();
        assert!(!lobby.is_seated(&"alice".to_string()));
        assert!(lobby.is_spectating(&"alice".to_string()));

        let admin = Player::admin("site_admin", "Admin");
        lobby.kick(&admin, &"bob".to_string()).unwrap();
        assert!(!lobby.is_seated(&"bob".to_string()));
    }

    #[test]
    fn test_ban_blocks_rejoin() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let now = current_timestamp();
        lobby.join(&"alice".to_string(), 0, None, now).unwrap();

        let creator = Player::new("creator", "Creator");
        lobby.ban_player(&creator, &"alice".to_string()).unwrap();

        assert_eq!(
            lobby.join(&"alice".to_string(), 0, None, now).unwrap_err(),
            LobbyError::BannedFromLobby
        );
        // Kick alone does not block rejoin
        lobby.join(&"bob".to_string(), 1, None, now).unwrap();
        lobby.kick(&creator, &"bob".to_string()).unwrap();
        assert!(lobby.join(&"bob".to_string(), 1, None, now).is_ok());
    }

    #[test]
    fn test_spectators() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        lobby.add_spectator(&"watcher".to_string()).unwrap();
        lobby.add_spectator(&"watcher".to_string()).unwrap();
        assert_eq!(lobby.spectators().len(), 1);

        lobby.remove_spectator(&"watcher".to_string()).unwrap();
        assert_eq!(
            lobby.remove_spectator(&"watcher".to_string()).unwrap_err(),
            LobbyError::NotSpectating
        );
    }

    #[test]
    fn test_close_clears_membership_and_is_terminal() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let now = current_timestamp();
        lobby.join(&"p0".to_string(), 0, None, now).unwrap();
        lobby.join(&"p1".to_string(), 1, None, now).unwrap();
        lobby.join(&"p2".to_string(), 2, None, now).unwrap();
        lobby.add_spectator(&"watcher".to_string()).unwrap();

        let creator = Player::new("creator", "Creator");
        let outcome = lobby.close(&creator).unwrap();

        assert_eq!(lobby.state(), LobbyState::Ended);
        assert_eq!(outcome.seated.len(), 3);
        assert_eq!(outcome.spectators, vec!["watcher".to_string()]);
        assert_eq!(lobby.occupied_count(), 0);
        assert!(lobby.spectators().is_empty());

        assert_eq!(lobby.close(&creator).unwrap_err(), LobbyError::AlreadyClosed);
        // Every slot-affecting operation now fails LobbyClosed
        assert_eq!(
            lobby.join(&"p0".to_string(), 0, None, now).unwrap_err(),
            LobbyError::LobbyClosed
        );
        assert_eq!(
            lobby.add_spectator(&"p0".to_string()).unwrap_err(),
            LobbyError::LobbyClosed
        );
    }

    #[test]
    fn test_close_requires_authorization() {
        let mut lobby = test_lobby(LobbyType::Sixes);
        let outsider = Player::new("random", "Random");
        assert!(matches!(
            lobby.close(&outsider).unwrap_err(),
            LobbyError::NotAuthorized { .. }
        ));
        assert_eq!(lobby.state(), LobbyState::Waiting);
    }

    #[test]
    fn test_all_confirmations_start_the_match() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        fill_lobby(&mut lobby);

        for slot in 0..3 {
            let all_ready = lobby.confirm_ready(&format!("player{}", slot)).unwrap();
            assert!(!all_ready);
            assert_eq!(lobby.state(), LobbyState::ReadyingUp);
        }
        let all_ready = lobby.confirm_ready(&"player3".to_string()).unwrap();
        assert!(all_ready);
        assert_eq!(lobby.state(), LobbyState::InProgress);
        assert!(lobby.ready_up_deadline().is_none());
    }

    #[test]
    fn test_confirm_ready_outside_ready_up_fails() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        assert_eq!(
            lobby.confirm_ready(&"player0".to_string()).unwrap_err(),
            LobbyError::NotReadyingUp
        );
    }

    #[test]
    fn test_expiry_removes_unready_and_unreadies_rest() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        fill_lobby(&mut lobby);
        lobby.confirm_ready(&"player0".to_string()).unwrap();
        lobby.confirm_ready(&"player2".to_string()).unwrap();

        let outcome = lobby.expire_ready_up();

        assert!(outcome.reverted);
        let mut removed = outcome.removed.clone();
        removed.sort();
        assert_eq!(removed, vec!["player1".to_string(), "player3".to_string()]);
        assert_eq!(lobby.state(), LobbyState::Waiting);
        assert!(lobby.ready_up_deadline().is_none());
        // Confirmed players stay seated but are no longer ready
        assert!(lobby.is_seated(&"player0".to_string()));
        assert!(!lobby.seats[0].as_ref().unwrap().ready);
        // Removed players are gone entirely, not demoted to spectator
        assert!(!lobby.is_seated(&"player1".to_string()));
        assert!(!lobby.is_spectating(&"player1".to_string()));
    }

    #[test]
    fn test_expiry_is_a_noop_outside_ready_up() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        fill_lobby(&mut lobby);
        for slot in 0..4 {
            lobby.confirm_ready(&format!("player{}", slot)).unwrap();
        }
        assert_eq!(lobby.state(), LobbyState::InProgress);

        let outcome = lobby.expire_ready_up();
        assert!(!outcome.reverted);
        assert!(outcome.removed.is_empty());
        assert_eq!(lobby.state(), LobbyState::InProgress);

        let mut ended = test_lobby(LobbyType::Ultiduo);
        let creator = Player::new("creator", "Creator");
        ended.close(&creator).unwrap();
        let outcome = ended.expire_ready_up();
        assert!(!outcome.reverted);
        assert_eq!(ended.state(), LobbyState::Ended);
    }

    #[test]
    fn test_occupancy_never_exceeds_capacity() {
        for &lobby_type in slots::ALL_LOBBY_TYPES {
            let mut lobby = test_lobby(lobby_type);
            let now = current_timestamp();
            for slot in 0..lobby.capacity() {
                lobby.join(&format!("p{}", slot), slot, None, now).unwrap();
            }
            assert_eq!(lobby.occupied_count(), lobby.capacity());

            // Every further join attempt fails without changing occupancy
            assert!(lobby.join(&"extra".to_string(), 0, None, now).is_err());
            assert_eq!(lobby.occupied_count(), lobby.capacity());

            // No player holds two seats
            let mut players = lobby.seated_players();
            players.sort();
            players.dedup();
            assert_eq!(players.len(), lobby.capacity());
        }
    }

    #[test]
    fn test_snapshot_reflects_seating() {
        let mut lobby = test_lobby(LobbyType::Ultiduo);
        let now = current_timestamp();
        lobby.join(&"alice".to_string(), 1, None, now).unwrap();
        lobby.add_spectator(&"watcher".to_string()).unwrap();

        let snapshot = lobby.snapshot();
        assert_eq!(snapshot.slots.len(), 4);
        assert_eq!(snapshot.slots[1].player, Some("alice".to_string()));
        assert_eq!(snapshot.slots[1].team, Team::Red);
        assert_eq!(snapshot.slots[1].class, "medic");
        assert_eq!(snapshot.spectators, vec!["watcher".to_string()]);
    }
}
