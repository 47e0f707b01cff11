//! Service coordination and health monitoring

pub mod app;
pub mod health;

pub use app::AppState;
pub use health::{HealthCheck, HealthStatus};
