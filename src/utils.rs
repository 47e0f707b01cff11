//! Utility functions for the lobby coordination service

use crate::types::ConnectionId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique connection ID
pub fn generate_connection_id() -> ConnectionId {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}
