//! Health check functionality
//!
//! Liveness and readiness probes over the application state, plus the
//! statistics block reported by the health endpoint and CLI health mode.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub active_lobbies: usize,
    pub players_seated: usize,
    pub lobbies_created: u64,
    pub matches_started: u64,
    pub ready_ups_expired: u64,
    pub uptime_seconds: i64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let manager_check = Self::check_lobby_manager(&app_state);
        if manager_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if manager_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(manager_check);

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            timestamp: chrono::Utc::now(),
            checks,
            stats: Self::gather_service_stats(&app_state),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> HealthStatus {
        if app_state.is_running().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(app_state: Arc<AppState>) -> HealthStatus {
        if !app_state.is_running().await {
            return HealthStatus::Unhealthy;
        }
        Self::check_lobby_manager(&app_state).status
    }

    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };
        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
        }
    }

    fn check_lobby_manager(app_state: &AppState) -> ComponentCheck {
        let (status, message) = match app_state.manager().get_stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => (
                HealthStatus::Degraded,
                Some(format!("Stats check failed: {}", e)),
            ),
        };
        ComponentCheck {
            name: "lobby_manager".to_string(),
            status,
            message,
        }
    }

    fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        match app_state.manager().get_stats() {
            Ok(stats) => ServiceStats {
                active_lobbies: stats.active_lobbies,
                players_seated: stats.players_seated,
                lobbies_created: stats.lobbies_created,
                matches_started: stats.matches_started,
                ready_ups_expired: stats.ready_ups_expired,
                uptime_seconds: app_state.uptime_seconds(),
            },
            Err(e) => {
                debug!("Failed to get lobby stats for health check: {}", e);
                ServiceStats::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
