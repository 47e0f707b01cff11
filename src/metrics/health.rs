//! Health check endpoints and Prometheus metrics server
//!
//! HTTP endpoints for health probes and metrics scraping using Axum.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the health server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub app_state: Option<Arc<AppState>>,
}

/// Health server that provides HTTP endpoints for monitoring
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    /// Create a new health server
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                app_state: None,
            },
            shutdown_tx,
        }
    }

    /// Set the application state for health checks
    pub fn with_app_state(mut self, app_state: Arc<AppState>) -> Self {
        self.state.app_state = Some(app_state);
        self
    }

    /// Start the health server; serves until `shutdown` is called.
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;
        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;
        Ok(())
    }

    /// Signal the serving task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }
}

async fn liveness_handler(State(state): State<HealthServerState>) -> Response {
    let status = match &state.app_state {
        Some(app_state) => HealthCheck::liveness_check(app_state.clone()).await,
        None => HealthStatus::Degraded,
    };
    status_response(status)
}

async fn readiness_handler(State(state): State<HealthServerState>) -> Response {
    let status = match &state.app_state {
        Some(app_state) => HealthCheck::readiness_check(app_state.clone()).await,
        None => HealthStatus::Degraded,
    };
    status_response(status)
}

async fn health_handler(State(state): State<HealthServerState>) -> Response {
    let app_state = match &state.app_state {
        Some(app_state) => app_state.clone(),
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "degraded", "reason": "no app state attached"})),
            )
                .into_response()
        }
    };

    match HealthCheck::check(app_state).await {
        Ok(health) => {
            let code = match health.status {
                HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
            };
            (code, Json(serde_json::to_value(&health).unwrap_or_default())).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "unhealthy", "error": e.to_string()})),
        )
            .into_response(),
    }
}

async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    // Refresh gauges from live stats before scraping
    if let Some(app_state) = &state.app_state {
        if let Ok(stats) = app_state.manager().get_stats() {
            state.metrics_collector.update_from_lobby_stats(&stats);
        }
        state
            .metrics_collector
            .service()
            .uptime_seconds
            .set(app_state.uptime_seconds());
    }

    let encoder = TextEncoder::new();
    let metric_families = state.metrics_collector.registry().gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

fn status_response(status: HealthStatus) -> Response {
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(json!({ "status": status.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HealthServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_router_builds_without_app_state() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        let server = HealthServer::new(HealthServerConfig::default(), collector);
        let _router = server.create_router();
        server.shutdown();
    }
}
