//! Slot layout tables per lobby type
//!
//! Static configuration data mapping (team, class) to fixed slot indices.
//! Slots are laid out team-major: all Red seats first, then all Blu seats,
//! so `slot = team_index * classes_per_team + class_index`.

use crate::error::LobbyError;
use crate::types::{LobbyType, Team};

const DEBUG_CLASSES: &[&str] = &["scout"];
const SIXES_CLASSES: &[&str] = &["scout1", "scout2", "roamer", "pocket", "demoman", "medic"];
const HIGHLANDER_CLASSES: &[&str] = &[
    "scout",
    "soldier",
    "pyro",
    "demoman",
    "heavy",
    "engineer",
    "medic",
    "sniper",
    "spy",
];
const ULTIDUO_CLASSES: &[&str] = &["soldier", "medic"];
const BBALL_CLASSES: &[&str] = &["soldier1", "soldier2"];
const FOURS_CLASSES: &[&str] = &["scout1", "scout2", "soldier1", "soldier2"];

/// Per-team class list for a lobby type.
pub fn class_list(lobby_type: LobbyType) -> &'static [&'static str] {
    match lobby_type {
        LobbyType::Debug => DEBUG_CLASSES,
        LobbyType::Sixes => SIXES_CLASSES,
        LobbyType::Highlander => HIGHLANDER_CLASSES,
        LobbyType::Ultiduo => ULTIDUO_CLASSES,
        LobbyType::Bball => BBALL_CLASSES,
        LobbyType::Fours => FOURS_CLASSES,
    }
}

/// Total seat count for a lobby type (both teams).
pub fn capacity_of(lobby_type: LobbyType) -> usize {
    2 * class_list(lobby_type).len()
}

/// Slot index for a (team, class) pair, or `InvalidSlot` when the combination
/// does not exist for this lobby type.
pub fn slot_for(lobby_type: LobbyType, team: Team, class: &str) -> Result<usize, LobbyError> {
    let classes = class_list(lobby_type);
    let class_index = classes
        .iter()
        .position(|c| *c == class)
        .ok_or_else(|| LobbyError::InvalidSlot {
            slot: format!("{} {}", team, class),
        })?;
    Ok(team.index() * classes.len() + class_index)
}

/// Inverse lookup: the (team, class) a slot index addresses, used when
/// broadcasting slot-specific notifications.
pub fn slot_info(
    lobby_type: LobbyType,
    slot: usize,
) -> Result<(Team, &'static str), LobbyError> {
    let classes = class_list(lobby_type);
    if slot >= 2 * classes.len() {
        return Err(LobbyError::InvalidSlot {
            slot: format!("index {}", slot),
        });
    }
    let team = if slot < classes.len() {
        Team::Red
    } else {
        Team::Blu
    };
    Ok((team, classes[slot % classes.len()]))
}

/// All lobby types, for table-driven tests and lobby listings.
pub const ALL_LOBBY_TYPES: &[LobbyType] = &[
    LobbyType::Debug,
    LobbyType::Sixes,
    LobbyType::Highlander,
    LobbyType::Ultiduo,
    LobbyType::Bball,
    LobbyType::Fours,
];
