//! Room naming convention
//!
//! Every broadcast room is derived from a lobby id and an audience scope.
//! Other collaborators construct these strings independently, so the format
//! here is a stable contract: `"{lobby_id}_public"` and `"{lobby_id}_private"`.

use crate::types::LobbyId;

/// Audience scope of a lobby room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomScope {
    /// Seated players and spectators
    Public,
    /// Seated players only
    Private,
}

impl RoomScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomScope::Public => "public",
            RoomScope::Private => "private",
        }
    }
}

/// The single point where room names are constructed.
pub fn room_name(lobby_id: LobbyId, scope: RoomScope) -> String {
    format!("{}_{}", lobby_id, scope.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_format() {
        assert_eq!(room_name(42, RoomScope::Public), "42_public");
        assert_eq!(room_name(42, RoomScope::Private), "42_private");
    }

    #[test]
    fn test_rooms_distinct_per_lobby_and_scope() {
        assert_ne!(room_name(1, RoomScope::Public), room_name(2, RoomScope::Public));
        assert_ne!(
            room_name(1, RoomScope::Public),
            room_name(1, RoomScope::Private)
        );
    }
}
