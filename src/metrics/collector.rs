//! Metrics collection using Prometheus
//!
//! Scaled to the lobby domain: lobby lifecycle counters, broadcast fan-out
//! counters, and dispatch outcomes.

use crate::lobby::manager::LobbyManagerStats;
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Main metrics collector for the lobby service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    service_metrics: ServiceMetrics,
    lobby_metrics: LobbyMetrics,
    broadcast_metrics: BroadcastMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Dispatched events by name and outcome (ok/error)
    pub events_dispatched_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Lobby lifecycle metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Number of lobbies not yet ended
    pub active_lobbies: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounter,

    /// Total lobbies closed
    pub lobbies_closed_total: IntCounter,

    /// Total successful joins
    pub players_joined_total: IntCounter,

    /// Ready-up phases started
    pub ready_ups_started_total: IntCounter,

    /// Ready-up phases that expired back to waiting
    pub ready_ups_expired_total: IntCounter,

    /// Matches started (all seats confirmed)
    pub matches_started_total: IntCounter,

    /// Players currently seated across all lobbies
    pub players_seated: IntGauge,
}

/// Broadcast fan-out metrics
#[derive(Clone)]
pub struct BroadcastMetrics {
    /// Room publishes performed
    pub room_publishes_total: IntCounter,

    /// Direct per-player deliveries performed
    pub direct_messages_total: IntCounter,
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds = IntGauge::with_opts(Opts::new(
            "service_uptime_seconds",
            "Service uptime in seconds",
        ))?;
        let events_dispatched_total = IntCounterVec::new(
            Opts::new(
                "events_dispatched_total",
                "Dispatched events by name and outcome",
            ),
            &["event", "outcome"],
        )?;
        let health_status = IntGauge::with_opts(Opts::new(
            "health_status",
            "Health check status (0=unhealthy, 1=degraded, 2=healthy)",
        ))?;

        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(events_dispatched_total.clone()))?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            events_dispatched_total,
            health_status,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies = IntGauge::with_opts(Opts::new(
            "active_lobbies",
            "Number of lobbies not yet ended",
        ))?;
        let lobbies_created_total =
            IntCounter::with_opts(Opts::new("lobbies_created_total", "Total lobbies created"))?;
        let lobbies_closed_total =
            IntCounter::with_opts(Opts::new("lobbies_closed_total", "Total lobbies closed"))?;
        let players_joined_total =
            IntCounter::with_opts(Opts::new("players_joined_total", "Total successful joins"))?;
        let ready_ups_started_total = IntCounter::with_opts(Opts::new(
            "ready_ups_started_total",
            "Ready-up phases started",
        ))?;
        let ready_ups_expired_total = IntCounter::with_opts(Opts::new(
            "ready_ups_expired_total",
            "Ready-up phases that expired",
        ))?;
        let matches_started_total = IntCounter::with_opts(Opts::new(
            "matches_started_total",
            "Matches started after full confirmation",
        ))?;
        let players_seated = IntGauge::with_opts(Opts::new(
            "players_seated",
            "Players currently seated across all lobbies",
        ))?;

        registry.register(Box::new(active_lobbies.clone()))?;
        registry.register(Box::new(lobbies_created_total.clone()))?;
        registry.register(Box::new(lobbies_closed_total.clone()))?;
        registry.register(Box::new(players_joined_total.clone()))?;
        registry.register(Box::new(ready_ups_started_total.clone()))?;
        registry.register(Box::new(ready_ups_expired_total.clone()))?;
        registry.register(Box::new(matches_started_total.clone()))?;
        registry.register(Box::new(players_seated.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            lobbies_closed_total,
            players_joined_total,
            ready_ups_started_total,
            ready_ups_expired_total,
            matches_started_total,
            players_seated,
        })
    }
}

impl BroadcastMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let room_publishes_total =
            IntCounter::with_opts(Opts::new("room_publishes_total", "Room publishes performed"))?;
        let direct_messages_total = IntCounter::with_opts(Opts::new(
            "direct_messages_total",
            "Direct per-player deliveries performed",
        ))?;

        registry.register(Box::new(room_publishes_total.clone()))?;
        registry.register(Box::new(direct_messages_total.clone()))?;

        Ok(Self {
            room_publishes_total,
            direct_messages_total,
        })
    }
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let broadcast_metrics = BroadcastMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lobby_metrics,
            broadcast_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    pub fn broadcast(&self) -> &BroadcastMetrics {
        &self.broadcast_metrics
    }

    /// Record a dispatched event and its outcome.
    pub fn record_dispatch(&self, event: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.service_metrics
            .events_dispatched_total
            .with_label_values(&[event, outcome])
            .inc();
    }

    /// Sync the gauges and counters derived from lobby manager stats.
    pub fn update_from_lobby_stats(&self, stats: &LobbyManagerStats) {
        self.lobby_metrics
            .active_lobbies
            .set(stats.active_lobbies as i64);
        self.lobby_metrics
            .players_seated
            .set(stats.players_seated as i64);

        set_counter(&self.lobby_metrics.lobbies_created_total, stats.lobbies_created);
        set_counter(&self.lobby_metrics.lobbies_closed_total, stats.lobbies_closed);
        set_counter(&self.lobby_metrics.players_joined_total, stats.players_joined);
        set_counter(
            &self.lobby_metrics.ready_ups_started_total,
            stats.ready_ups_started,
        );
        set_counter(
            &self.lobby_metrics.ready_ups_expired_total,
            stats.ready_ups_expired,
        );
        set_counter(
            &self.lobby_metrics.matches_started_total,
            stats.matches_started,
        );
    }
}

/// Counters are monotonic; advance to the target value without ever going back.
fn set_counter(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}
