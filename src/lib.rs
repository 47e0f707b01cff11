//! Ready Room - Lobby coordination service for slot-based multiplayer games
//!
//! This crate tracks which connection belongs to which lobby room, enacts
//! typed slot assignment, enforces a time-boxed ready-up protocol, and fans
//! state-change notifications out to exactly the right set of connected
//! clients.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod provision;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LobbyError, Result};
pub use types::*;

// Re-export key components
pub use broadcast::{room_name, ConnectionRegistry, RoomBroadcaster, RoomScope};
pub use dispatch::{ConnectionContext, EventDispatcher};
pub use lobby::{LobbyManager, LobbySnapshot, LobbyState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
