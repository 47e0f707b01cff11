//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! ready-room lobby service, including environment variable loading,
//! TOML file loading, and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub lobby: LobbySettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health check and metrics endpoints
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Lobby-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySettings {
    /// Grace period for the ready-up phase in seconds
    pub ready_up_grace_seconds: i64,
    /// Maximum number of lobbies open at once (Waiting/ReadyingUp/InProgress)
    pub max_active_lobbies: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "ready-room".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            ready_up_grace_seconds: 30,
            max_active_lobbies: 500,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Lobby settings
        if let Ok(grace) = env::var("READY_UP_GRACE_SECONDS") {
            config.lobby.ready_up_grace_seconds = grace
                .parse()
                .map_err(|_| anyhow!("Invalid READY_UP_GRACE_SECONDS value: {}", grace))?;
        }
        if let Ok(max_lobbies) = env::var("MAX_ACTIVE_LOBBIES") {
            config.lobby.max_active_lobbies = max_lobbies
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_ACTIVE_LOBBIES value: {}", max_lobbies))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.lobby.ready_up_grace_seconds <= 0 {
        return Err(anyhow!("Ready-up grace period must be greater than 0"));
    }
    if config.lobby.max_active_lobbies == 0 {
        return Err(anyhow!("Max active lobbies must be greater than 0"));
    }

    Ok(())
}
