//! Event dispatcher: one handler per inbound event
//!
//! The dispatcher validates the payload against the handler's declared schema,
//! enforces the authentication requirement, and wraps the outcome in the wire
//! notification shape. The returned notification goes to the originating
//! connection only — a handler's broadcasts are the sole way its side effects
//! become visible to anyone else.

use crate::dispatch::schema::EventSchema;
use crate::error::LobbyError;
use crate::types::{ConnectionId, Notification, PlayerId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Identity context of the connection that sent an event
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub connection: ConnectionId,
    /// Resolved player identity; `None` for anonymous connections
    pub player: Option<PlayerId>,
}

impl ConnectionContext {
    pub fn authenticated(connection: ConnectionId, player: PlayerId) -> Self {
        Self {
            connection,
            player: Some(player),
        }
    }

    pub fn anonymous(connection: ConnectionId) -> Self {
        Self {
            connection,
            player: None,
        }
    }

    /// The player identity, or `NotLoggedIn` for anonymous connections.
    pub fn require_player(&self) -> Result<&PlayerId, LobbyError> {
        self.player.as_ref().ok_or(LobbyError::NotLoggedIn)
    }
}

/// A handler for one named inbound event
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Event name this handler answers to
    fn name(&self) -> &'static str;

    /// Declared payload shape, validated before `handle` runs
    fn schema(&self) -> &EventSchema;

    /// Whether an anonymous connection may send this event
    fn requires_auth(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError>;
}

/// Routes inbound events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its event name. The last registration for a
    /// name wins; exactly one handler ever executes per event.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn registered_events(&self) -> Vec<&'static str> {
        let mut events: Vec<&'static str> = self.handlers.keys().copied().collect();
        events.sort_unstable();
        events
    }

    /// Dispatch an inbound event. The returned notification is the reply for
    /// the originating connection; errors are never broadcast.
    pub async fn dispatch(
        &self,
        ctx: &ConnectionContext,
        event: &str,
        payload: &Value,
    ) -> Notification {
        let handler = match self.handlers.get(event) {
            Some(handler) => handler,
            None => {
                debug!("Unknown event '{}' from {}", event, ctx.connection);
                return Notification::failure(
                    Some(event),
                    &LobbyError::UnknownEvent {
                        event: event.to_string(),
                    },
                );
            }
        };

        if handler.requires_auth() && ctx.player.is_none() {
            return Notification::failure(Some(event), &LobbyError::NotLoggedIn);
        }

        if let Err(e) = handler.schema().validate(payload) {
            return Notification::failure(Some(event), &e);
        }

        match handler.handle(ctx, payload).await {
            Ok(data) => Notification::event(event, data),
            Err(e) => {
                debug!(
                    "Event '{}' from {} failed: {} (code {})",
                    event,
                    ctx.connection,
                    e,
                    e.code()
                );
                Notification::failure(Some(event), &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::schema::{FieldKind, FieldSpec};
    use crate::utils::generate_connection_id;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static ECHO_SCHEMA: EventSchema =
        EventSchema::new(&[FieldSpec::required("value", FieldKind::Uint)]);

    struct EchoHandler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for EchoHandler {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn schema(&self) -> &EventSchema {
            &ECHO_SCHEMA
        }

        async fn handle(&self, _ctx: &ConnectionContext, args: &Value) -> Result<Value, LobbyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"value": args["value"]}))
        }
    }

    struct PublicHandler;

    #[async_trait]
    impl EventHandler for PublicHandler {
        fn name(&self) -> &'static str {
            "publicPing"
        }

        fn schema(&self) -> &EventSchema {
            static SCHEMA: EventSchema = EventSchema::new(&[]);
            &SCHEMA
        }

        fn requires_auth(&self) -> bool {
            false
        }

        async fn handle(&self, _ctx: &ConnectionContext, _args: &Value) -> Result<Value, LobbyError> {
            Ok(json!({"pong": true}))
        }
    }

    fn authed_ctx() -> ConnectionContext {
        ConnectionContext::authenticated(generate_connection_id(), "alice".to_string())
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::new(EchoHandler {
            calls: AtomicUsize::new(0),
        }));

        let reply = dispatcher
            .dispatch(&authed_ctx(), "echo", &json!({"value": 7}))
            .await;
        assert_eq!(reply.event.as_deref(), Some("echo"));
        assert_eq!(reply.data.as_ref().unwrap()["value"], 7);
        assert!(!reply.is_error());
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let dispatcher = EventDispatcher::new();
        let reply = dispatcher
            .dispatch(&authed_ctx(), "nonsense", &json!({}))
            .await;
        assert!(reply.is_error());
        assert_eq!(reply.code, Some(-3));
    }

    #[tokio::test]
    async fn test_anonymous_connection_rejected() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::new(EchoHandler {
            calls: AtomicUsize::new(0),
        }));

        let ctx = ConnectionContext::anonymous(generate_connection_id());
        let reply = dispatcher.dispatch(&ctx, "echo", &json!({"value": 7})).await;
        assert_eq!(reply.code, Some(-4));
    }

    #[tokio::test]
    async fn test_anonymous_connection_allowed_on_public_event() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Arc::new(PublicHandler));

        let ctx = ConnectionContext::anonymous(generate_connection_id());
        let reply = dispatcher.dispatch(&ctx, "publicPing", &json!({})).await;
        assert!(!reply.is_error());
    }

    #[tokio::test]
    async fn test_schema_rejection_skips_handler() {
        let handler = Arc::new(EchoHandler {
            calls: AtomicUsize::new(0),
        });
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(handler.clone());

        let reply = dispatcher
            .dispatch(&authed_ctx(), "echo", &json!({"value": "not a number"}))
            .await;
        assert_eq!(reply.code, Some(-2));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let first = Arc::new(EchoHandler {
            calls: AtomicUsize::new(0),
        });
        let second = Arc::new(EchoHandler {
            calls: AtomicUsize::new(0),
        });
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(first.clone());
        dispatcher.register(second.clone());

        dispatcher
            .dispatch(&authed_ctx(), "echo", &json!({"value": 1}))
            .await;
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }
}
