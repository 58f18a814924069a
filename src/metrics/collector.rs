//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the ranked arena escrow and
//! settlement core using Prometheus metrics.

use crate::matchmaking::OrchestratorStats;
use crate::types::{Currency, MatchKind, MatchStatus};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the arena service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Fee escrow metrics
    escrow_metrics: EscrowMetrics,

    /// Settlement metrics
    settlement_metrics: SettlementMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,

    /// Failed operations by operation and error code
    pub failures_total: IntCounterVec,

    /// Operation durations
    pub operation_duration: HistogramVec,
}

/// Fee escrow metrics
#[derive(Clone)]
pub struct EscrowMetrics {
    /// Successful reservations by currency
    pub reservations_total: IntCounterVec,

    /// Successful fee commits by currency
    pub commits_total: IntCounterVec,

    /// Successful releases by reason
    pub releases_total: IntCounterVec,

    /// Matches with reservations that are neither started nor released
    pub in_flight_reservations: IntGauge,

    /// Matches purged by the expired-reservation cleanup
    pub expired_reservations_total: IntCounter,
}

/// Settlement metrics
#[derive(Clone)]
pub struct SettlementMetrics {
    /// Settled matches by kind and terminal status
    pub settlements_total: IntCounterVec,

    /// Rank levels gained through settlements
    pub promotions_total: IntCounter,

    /// Time spent settling a match
    pub settlement_duration: Histogram,
}

fn currency_label(currency: Currency) -> &'static str {
    currency.as_str()
}

fn kind_label(kind: MatchKind) -> &'static str {
    match kind {
        MatchKind::Ranked => "ranked",
        MatchKind::Casual => "casual",
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
        let escrow_metrics = EscrowMetrics::new(&registry)?;
        let settlement_metrics = SettlementMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            escrow_metrics,
            settlement_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn escrow(&self) -> &EscrowMetrics {
        &self.escrow_metrics
    }

    pub fn settlement(&self) -> &SettlementMetrics {
        &self.settlement_metrics
    }

    /// Refresh gauges from orchestrator stats
    pub fn update_from_orchestrator_stats(&self, stats: &OrchestratorStats) {
        self.escrow_metrics
            .in_flight_reservations
            .set(stats.in_flight_reservations as i64);
    }

    pub fn record_reservation(&self, currency: Currency) {
        self.escrow_metrics
            .reservations_total
            .with_label_values(&[currency_label(currency)])
            .inc();
    }

    pub fn record_commit(&self, currency: Currency) {
        self.escrow_metrics
            .commits_total
            .with_label_values(&[currency_label(currency)])
            .inc();
    }

    /// Record a release; `reason` is e.g. "cancelled", "expired" or "refunded"
    pub fn record_release(&self, reason: &str) {
        self.escrow_metrics
            .releases_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_expired_reservations(&self, count: usize) {
        self.escrow_metrics
            .expired_reservations_total
            .inc_by(count as u64);
    }

    pub fn set_in_flight_reservations(&self, count: usize) {
        self.escrow_metrics.in_flight_reservations.set(count as i64);
    }

    /// Record a completed settlement
    pub fn record_settlement(
        &self,
        kind: MatchKind,
        status: MatchStatus,
        promotions: usize,
        duration: Duration,
    ) {
        self.settlement_metrics
            .settlements_total
            .with_label_values(&[kind_label(kind), status.as_str()])
            .inc();
        self.settlement_metrics
            .promotions_total
            .inc_by(promotions as u64);
        self.settlement_metrics
            .settlement_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a failed operation with its error code
    pub fn record_failure(&self, operation: &str, code: &str) {
        self.service_metrics
            .failures_total
            .with_label_values(&[operation, code])
            .inc();
    }

    pub fn record_operation(&self, operation: &str, duration: Duration) {
        self.service_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("ranked_arena_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "ranked_arena_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("ranked_arena_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        let failures_total = IntCounterVec::new(
            Opts::new("ranked_arena_failures_total", "Failed operations"),
            &["operation", "code"],
        )?;
        registry.register(Box::new(failures_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "ranked_arena_operation_duration_seconds",
                "Escrow and match operation duration",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
            failures_total,
            operation_duration,
        })
    }
}

impl EscrowMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let reservations_total = IntCounterVec::new(
            Opts::new("ranked_arena_reservations_total", "Fee reservations"),
            &["currency"],
        )?;
        registry.register(Box::new(reservations_total.clone()))?;

        let commits_total = IntCounterVec::new(
            Opts::new("ranked_arena_commits_total", "Fee commits"),
            &["currency"],
        )?;
        registry.register(Box::new(commits_total.clone()))?;

        let releases_total = IntCounterVec::new(
            Opts::new("ranked_arena_releases_total", "Fee releases"),
            &["reason"],
        )?;
        registry.register(Box::new(releases_total.clone()))?;

        let in_flight_reservations = IntGauge::new(
            "ranked_arena_in_flight_reservations",
            "Matches holding reservations that have not started",
        )?;
        registry.register(Box::new(in_flight_reservations.clone()))?;

        let expired_reservations_total = IntCounter::new(
            "ranked_arena_expired_reservations_total",
            "Abandoned matches cleaned up after their reservations expired",
        )?;
        registry.register(Box::new(expired_reservations_total.clone()))?;

        Ok(Self {
            reservations_total,
            commits_total,
            releases_total,
            in_flight_reservations,
            expired_reservations_total,
        })
    }
}

impl SettlementMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let settlements_total = IntCounterVec::new(
            Opts::new("ranked_arena_settlements_total", "Settled matches"),
            &["kind", "status"],
        )?;
        registry.register(Box::new(settlements_total.clone()))?;

        let promotions_total = IntCounter::new(
            "ranked_arena_promotions_total",
            "Rank levels gained through settlements",
        )?;
        registry.register(Box::new(promotions_total.clone()))?;

        let settlement_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ranked_arena_settlement_duration_seconds",
                "Settlement time",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(settlement_duration.clone()))?;

        Ok(Self {
            settlements_total,
            promotions_total,
            settlement_duration,
        })
    }
}
