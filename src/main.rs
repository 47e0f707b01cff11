//! Main entry point for the Ready Room lobby service
//!
//! Initializes and runs the lobby coordination service with proper error
//! handling, logging, and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use ready_room::config::AppConfig;
use ready_room::metrics::{HealthServer, HealthServerConfig};
use ready_room::service::{AppState, HealthCheck, HealthStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Ready Room Lobby Service - slot-based lobby coordination with ready-up
#[derive(Parser)]
#[command(
    name = "ready-room",
    version,
    about = "A lobby coordination service for slot-based multiplayer ready-up flows",
    long_about = "Ready Room tracks lobby membership for connected players, assigns typed \
                 (team, class) slots, runs the time-boxed ready-up protocol once a lobby \
                 fills, and fans state changes out to exactly the affected rooms."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Health/metrics port override
    #[arg(long, value_name = "PORT", help = "Override health server port")]
    health_port: Option<u16>,

    /// Ready-up grace period override
    #[arg(
        long,
        value_name = "SECONDS",
        help = "Override the ready-up grace period in seconds"
    )]
    ready_up_grace: Option<i64>,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Perform health check and return appropriate exit code
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = Arc::new(AppState::new(config)?);
    app_state.start().await?;

    match HealthCheck::check(app_state).await {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            println!("  Active Lobbies: {}", health.stats.active_lobbies);
            println!("  Players Seated: {}", health.stats.players_seated);
            println!("  Matches Started: {}", health.stats.matches_started);
            println!("  Uptime: {}s", health.stats.uptime_seconds);

            if health.status == HealthStatus::Healthy {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Ready Room Lobby Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!(
        "   Ready-up grace: {}s",
        config.lobby.ready_up_grace_seconds
    );
    info!("   Max active lobbies: {}", config.lobby.max_active_lobbies);
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }
    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }
    if let Some(grace) = args.ready_up_grace {
        config.lobby.ready_up_grace_seconds = grace;
    }

    ready_room::config::validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    // Health and metrics endpoints
    let health_server = Arc::new(
        HealthServer::new(
            HealthServerConfig {
                port: config.service.health_port,
                host: "0.0.0.0".to_string(),
            },
            app_state.metrics(),
        )
        .with_app_state(app_state.clone()),
    );
    let health_task = {
        let health_server = health_server.clone();
        tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {}", e);
            }
        })
    };

    info!("Ready Room Lobby Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    health_server.shutdown();
    app_state.stop().await;

    let shutdown_timeout = config.shutdown_timeout();
    match tokio::time::timeout(shutdown_timeout, health_task).await {
        Ok(_) => {
            info!("Graceful shutdown completed successfully");
        }
        Err(_) => {
            warn!("Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("Ready Room Lobby Service stopped");
    Ok(())
}
