//! Main application state and service coordination
//!
//! Wires the store, the matchmaking orchestrator and the metrics collector
//! together and owns the background maintenance tasks.

use crate::config::AppConfig;
use crate::matchmaking::MatchmakingOrchestrator;
use crate::metrics::MetricsCollector;
use crate::store::{ArenaStore, InMemoryArenaStore};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Backing store for participants, matches and audit rows
    store: Arc<dyn ArenaStore>,

    /// Escrow and settlement façade
    orchestrator: Arc<MatchmakingOrchestrator>,

    /// Prometheus metrics shared with the health server
    metrics_collector: Arc<MetricsCollector>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        let store: Arc<dyn ArenaStore> = Arc::new(InMemoryArenaStore::new());
        Self::with_store(config, store).await
    }

    /// Initialize the application on top of an existing store
    pub async fn with_store(
        config: AppConfig,
        store: Arc<dyn ArenaStore>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing ranked-arena service");
        info!(
            "Configuration: service={}, reservation_ttl={}s, duplicate guard={}",
            config.service.name,
            config.matchmaking.reservation_ttl_seconds,
            config.ledger.reject_duplicate_reservations
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let orchestrator = Arc::new(
            MatchmakingOrchestrator::with_metrics(
                store.clone(),
                &config,
                metrics_collector.clone(),
            )
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize orchestrator: {}", e),
            })?,
        );

        Ok(Self {
            config,
            store,
            orchestrator,
            metrics_collector,
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start background maintenance tasks
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting ranked-arena service");

        *self.is_running.write().await = true;
        self.start_background_tasks().await;

        info!("✅ Ranked-arena service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of ranked-arena service");

        *self.is_running.write().await = false;
        self.stop_background_tasks().await;

        let final_stats =
            self.orchestrator
                .get_stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        if final_stats.in_flight_reservations > 0 {
            warn!(
                "{} matches still hold reservations at shutdown",
                final_stats.in_flight_reservations
            );
        }
        info!("✅ Ranked-arena service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn store(&self) -> Arc<dyn ArenaStore> {
        self.store.clone()
    }

    pub fn orchestrator(&self) -> Arc<MatchmakingOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    async fn start_background_tasks(&self) {
        info!("Starting background maintenance tasks...");

        info!(
            "Starting reservation cleanup task ({}s interval)...",
            self.config.cleanup_interval().as_secs()
        );
        let cleanup_task = self.orchestrator.clone().start_cleanup_task();

        info!("Starting metrics update task (30s interval)...");
        let metrics_task = {
            let orchestrator = self.orchestrator.clone();
            let metrics_collector = self.metrics_collector.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("Metrics update task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match orchestrator.get_stats() {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - in flight: {}, settled: {}",
                                stats.in_flight_reservations, stats.settlements
                            );
                            metrics_collector.update_from_orchestrator_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get orchestrator stats for metrics update: {}", e);
                        }
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        info!("Starting health metrics task (60s interval)...");
        let health_metrics_task = {
            let store = self.store.clone();
            let metrics_collector = self.metrics_collector.clone();
            let is_running = self.is_running.clone();
            let started_at = self.started_at;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = started_at.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    let store_healthy = match store.stats().await {
                        Ok(_) => true,
                        Err(e) => {
                            error!("Store health probe failed: {}", e);
                            false
                        }
                    };
                    metrics_collector.update_component_health("store", store_healthy);
                    metrics_collector.update_component_health("orchestrator", true);
                    metrics_collector.update_health_status(if store_healthy { 2 } else { 0 });

                    debug!(
                        "Updated service health metrics - uptime: {}s",
                        uptime_seconds
                    );
                }

                info!("Health metrics task stopped");
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(cleanup_task);
        tasks.push(metrics_task);
        tasks.push(health_metrics_task);

        info!("{} background maintenance tasks started", tasks.len());
    }

    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}
