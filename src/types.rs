//! Common types used throughout the lobby coordination service

use crate::error::LobbyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stable external identity for players (Steam id equivalent)
pub type PlayerId = String;

/// Unique identifier for lobbies
pub type LobbyId = u64;

/// Unique identifier for live connections
pub type ConnectionId = Uuid;

/// Team side within a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    Red,
    Blu,
}

impl Team {
    /// Wire names accepted in event payloads.
    pub const WIRE_NAMES: &'static [&'static str] = &["red", "blu"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blu => "blu",
        }
    }

    pub fn from_wire(s: &str) -> Option<Team> {
        match s {
            "red" => Some(Team::Red),
            "blu" => Some(Team::Blu),
            _ => None,
        }
    }

    /// Zero-based team index used for slot layout.
    pub fn index(&self) -> usize {
        match self {
            Team::Red => 0,
            Team::Blu => 1,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format of a lobby, fixing its slot layout and capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LobbyType {
    Debug,
    Sixes,
    Highlander,
    Ultiduo,
    Bball,
    Fours,
}

impl LobbyType {
    /// Wire names accepted in event payloads.
    pub const WIRE_NAMES: &'static [&'static str] =
        &["debug", "6s", "highlander", "ultiduo", "bball", "4v4"];

    pub fn as_str(&self) -> &'static str {
        match self {
            LobbyType::Debug => "debug",
            LobbyType::Sixes => "6s",
            LobbyType::Highlander => "highlander",
            LobbyType::Ultiduo => "ultiduo",
            LobbyType::Bball => "bball",
            LobbyType::Fours => "4v4",
        }
    }

    pub fn from_wire(s: &str) -> Option<LobbyType> {
        match s {
            "debug" => Some(LobbyType::Debug),
            "6s" => Some(LobbyType::Sixes),
            "highlander" => Some(LobbyType::Highlander),
            "ultiduo" => Some(LobbyType::Ultiduo),
            "bball" => Some(LobbyType::Bball),
            "4v4" => Some(LobbyType::Fours),
            _ => None,
        }
    }
}

impl Default for LobbyType {
    fn default() -> Self {
        LobbyType::Sixes
    }
}

impl std::fmt::Display for LobbyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Site-wide role of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Normal,
    Admin,
}

/// Category of a store-level ban
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BanType {
    Join,
    Create,
    Chat,
    Full,
}

impl BanType {
    /// Human-readable activity the ban blocks, used in error messages.
    pub fn activity(&self) -> &'static str {
        match self {
            BanType::Join => "joining lobbies",
            BanType::Create => "creating lobbies",
            BanType::Chat => "chatting",
            BanType::Full => "the website",
        }
    }
}

/// Player information as seen by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Role::Normal,
        }
    }

    pub fn admin(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: Role::Admin,
        }
    }
}

/// Outbound notification delivered to connections.
///
/// Success results carry `{event, data}`; failures carry `{event, error, code}`
/// where the code follows the sign convention in [`LobbyError::code`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl Notification {
    /// Build a success notification wrapping a payload.
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self {
            event: Some(name.into()),
            data: Some(data),
            error: None,
            code: None,
        }
    }

    /// Build a failure notification for an event (or `None` when the event
    /// name itself could not be determined).
    pub fn failure(event: Option<&str>, error: &LobbyError) -> Self {
        Self {
            event: event.map(|e| e.to_string()),
            data: None,
            error: Some(error.to_string()),
            code: Some(error.code()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
