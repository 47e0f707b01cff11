//! Metrics and monitoring for the lobby service

pub mod collector;
pub mod health;

pub use collector::MetricsCollector;
pub use health::{HealthServer, HealthServerConfig};
