//! Main application state and service coordination
//!
//! Wires the registry, broadcaster, lobby manager, and dispatcher into one
//! injectable state object with an explicit lifecycle. Nothing here is a
//! module-level global; everything the transport layer needs hangs off
//! `AppState`.

use crate::auth::{Authenticator, StaticAuthenticator};
use crate::broadcast::{ConnectionRegistry, ConnectionSink, RoomBroadcaster};
use crate::config::AppConfig;
use crate::dispatch::{register_lobby_handlers, ConnectionContext, EventDispatcher};
use crate::error::LobbyError;
use crate::lobby::manager::LobbyManager;
use crate::metrics::MetricsCollector;
use crate::provision::{GameServerLifecycle, NoopProvisioner};
use crate::store::{InMemoryStore, LobbyStore, PlayerStore};
use crate::types::{ConnectionId, Notification};
use crate::utils::{current_timestamp, generate_connection_id};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Application state shared across the transport and monitoring layers.
pub struct AppState {
    config: AppConfig,
    manager: Arc<LobbyManager>,
    dispatcher: Arc<EventDispatcher>,
    broadcaster: Arc<RoomBroadcaster>,
    authenticator: Arc<dyn Authenticator>,
    metrics: Arc<MetricsCollector>,
    running: RwLock<bool>,
    started_at: DateTime<Utc>,
}

impl AppState {
    /// Build the default component graph: in-memory store, no-op provisioner,
    /// static authenticator.
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = Arc::new(InMemoryStore::new());
        Self::with_collaborators(
            config,
            store.clone(),
            store,
            Arc::new(NoopProvisioner),
            Arc::new(StaticAuthenticator::new()),
        )
    }

    /// Build with explicit collaborator implementations.
    pub fn with_collaborators(
        config: AppConfig,
        player_store: Arc<dyn PlayerStore>,
        lobby_store: Arc<dyn LobbyStore>,
        provisioner: Arc<dyn GameServerLifecycle>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(RoomBroadcaster::new(registry));
        let manager = Arc::new(LobbyManager::new(
            player_store,
            lobby_store,
            provisioner,
            broadcaster.clone(),
            config.lobby.clone(),
        ));

        let mut dispatcher = EventDispatcher::new();
        register_lobby_handlers(&mut dispatcher, manager.clone());

        let metrics = Arc::new(MetricsCollector::new().context("Failed to create metrics")?);

        Ok(Self {
            config,
            manager,
            dispatcher: Arc::new(dispatcher),
            broadcaster,
            authenticator,
            metrics,
            running: RwLock::new(false),
            started_at: current_timestamp(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn manager(&self) -> Arc<LobbyManager> {
        self.manager.clone()
    }

    pub fn broadcaster(&self) -> Arc<RoomBroadcaster> {
        self.broadcaster.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn uptime_seconds(&self) -> i64 {
        (current_timestamp() - self.started_at).num_seconds()
    }

    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.write().await;
        *running = true;
        info!(
            "Service '{}' started, {} events registered",
            self.config.service.name,
            self.dispatcher.registered_events().len()
        );
        Ok(())
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        self.manager.shutdown();
        info!("Service '{}' stopped", self.config.service.name);
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Accept a new connection: resolve the credential (if any) to a player
    /// identity and register the outbound sink.
    pub async fn attach_connection(
        &self,
        credential: Option<&str>,
        sink: ConnectionSink,
    ) -> Result<ConnectionContext, LobbyError> {
        let connection = generate_connection_id();
        let player = match credential {
            Some(credential) => self.authenticator.resolve(credential).await?,
            None => None,
        };

        self.broadcaster
            .register_connection(connection, player.clone(), sink)?;
        info!(
            "Connection {} attached ({})",
            connection,
            player.as_deref().unwrap_or("anonymous")
        );
        Ok(ConnectionContext { connection, player })
    }

    /// Transport closed. Drops subscriptions only; lobby seats survive.
    pub fn detach_connection(&self, connection: ConnectionId) {
        if let Err(e) = self.manager.handle_disconnect(connection) {
            warn!("Disconnect cleanup for {} failed: {}", connection, e);
        }
    }

    /// Dispatch one inbound event. The returned notification is the reply for
    /// the sending connection.
    pub async fn handle_event(
        &self,
        ctx: &ConnectionContext,
        event: &str,
        payload: &Value,
    ) -> Notification {
        let reply = self.dispatcher.dispatch(ctx, event, payload).await;
        self.metrics.record_dispatch(event, !reply.is_error());
        if let Ok(stats) = self.manager.get_stats() {
            self.metrics.update_from_lobby_stats(&stats);
        }
        reply
    }
}
