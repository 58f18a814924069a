//! Service layer for the ranked-arena service
//!
//! Application state, health checks and background task management for the
//! production binary.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{ComponentCheck, HealthCheck, HealthStatus, ServiceStats};
