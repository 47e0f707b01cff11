//! Room-scoped broadcast engine
//!
//! Tracks which connection subscribes to which room and fans payloads out to
//! exactly that set, with direct per-player delivery on the side.

pub mod broadcaster;
pub mod registry;
pub mod rooms;

pub use broadcaster::{ConnectionSink, RoomBroadcaster};
pub use registry::ConnectionRegistry;
pub use rooms::{room_name, RoomScope};
