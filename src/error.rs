//! Error types for the lobby coordination service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application, plus the numeric wire codes clients use to
//! distinguish failure classes without string matching.

use chrono::{DateTime, Utc};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for lobby and dispatch scenarios.
///
/// Wire codes: negative codes denote client-caused errors, positive codes
/// denote state-conflict or transient errors a client may retry after.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LobbyError {
    #[error("Invalid event payload: {reason}")]
    Validation { reason: String },

    #[error("No such request: {event}")]
    UnknownEvent { event: String },

    #[error("Player isn't logged in")]
    NotLoggedIn,

    #[error("No such slot: {slot}")]
    InvalidSlot { slot: String },

    #[error("Wrong lobby password")]
    WrongPassword,

    #[error("You have been banned from {activity} till {until}")]
    PlayerBanned {
        activity: String,
        until: DateTime<Utc>,
    },

    #[error("You have been banned from this lobby")]
    BannedFromLobby,

    #[error("Not authorized to {action}")]
    NotAuthorized { action: String },

    #[error("Player can't {action} himself")]
    CannotTargetSelf { action: String },

    #[error("Slot {slot} is already taken")]
    SlotOccupied { slot: usize },

    #[error("Lobby has closed")]
    LobbyClosed,

    #[error("Lobby is in progress")]
    LobbyInProgress,

    #[error("Lobby already closed")]
    AlreadyClosed,

    #[error("Lobby is not readying up")]
    NotReadyingUp,

    #[error("Player is not seated in this lobby")]
    PlayerNotSeated,

    #[error("Player is not spectating this lobby")]
    NotSpectating,

    #[error("Maximum number of active lobbies reached")]
    TooManyLobbies,

    #[error("Lobby not found: {lobby_id}")]
    LobbyNotFound { lobby_id: u64 },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: String },

    #[error("Store operation failed: {message}")]
    Store { message: String },

    #[error("Game server provisioning failed: {message}")]
    Provision { message: String },

    #[error("Internal service error: {message}")]
    Internal { message: String },
}

impl LobbyError {
    /// Numeric code reported to clients alongside the message.
    pub fn code(&self) -> i32 {
        match self {
            LobbyError::Validation { .. } => -2,
            LobbyError::UnknownEvent { .. } => -3,
            LobbyError::NotLoggedIn => -4,
            LobbyError::InvalidSlot { .. } => -1,
            LobbyError::WrongPassword => -1,
            LobbyError::PlayerBanned { .. } => -1,
            LobbyError::BannedFromLobby => -1,
            LobbyError::NotAuthorized { .. } => -1,
            LobbyError::CannotTargetSelf { .. } => -1,
            LobbyError::SlotOccupied { .. } => 1,
            LobbyError::LobbyClosed => 1,
            LobbyError::LobbyInProgress => 1,
            LobbyError::AlreadyClosed => 1,
            LobbyError::NotReadyingUp => 1,
            LobbyError::TooManyLobbies => 1,
            LobbyError::PlayerNotSeated => 2,
            LobbyError::NotSpectating => 2,
            LobbyError::LobbyNotFound { .. } => 2,
            LobbyError::PlayerNotFound { .. } => 2,
            LobbyError::Store { .. } => 10,
            LobbyError::Provision { .. } => 10,
            LobbyError::Internal { .. } => 10,
        }
    }

    /// True for errors the client caused (negative wire codes).
    pub fn is_client_error(&self) -> bool {
        self.code() < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_have_negative_codes() {
        assert!(LobbyError::WrongPassword.code() < 0);
        assert!(LobbyError::NotLoggedIn.code() < 0);
        assert!(LobbyError::Validation {
            reason: "missing field".to_string()
        }
        .code()
            < 0);
        assert!(LobbyError::NotAuthorized {
            action: "close lobby".to_string()
        }
        .is_client_error());
    }

    #[test]
    fn test_state_conflicts_have_positive_codes() {
        assert!(LobbyError::SlotOccupied { slot: 3 }.code() > 0);
        assert!(LobbyError::LobbyClosed.code() > 0);
        assert!(LobbyError::LobbyInProgress.code() > 0);
        assert!(LobbyError::PlayerNotSeated.code() > 0);
        assert!(!LobbyError::AlreadyClosed.is_client_error());
    }
}
