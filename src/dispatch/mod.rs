//! Inbound event dispatch
//!
//! Maps named events from connections to handlers, with declarative payload
//! validation ahead of every handler invocation.

pub mod dispatcher;
pub mod handlers;
pub mod schema;

pub use dispatcher::{ConnectionContext, EventDispatcher, EventHandler};
pub use handlers::register_lobby_handlers;
pub use schema::{EventSchema, FieldKind, FieldSpec};
