//! Metrics and monitoring for the ranked-arena service
//!
//! Prometheus collection for escrow and settlement, plus the HTTP endpoints
//! that expose health, readiness, metrics and reservation state.

pub mod collector;
pub mod health;

pub use collector::{
    EscrowMetrics, MetricsCollector, MetricsTimer, ServiceMetrics, SettlementMetrics,
};
pub use health::{HealthEndpoints, HealthServer, HealthServerConfig};
