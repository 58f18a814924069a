//! Matchmaking orchestration
//!
//! Sequences eligibility, match creation, fee escrow and settlement for the
//! game client, and keeps a non-authoritative view of in-flight reservations.

pub mod monitor;
pub mod orchestrator;

pub use monitor::{ReservationEntry, ReservationMonitor};
pub use orchestrator::{MatchmakingOrchestrator, OrchestratorStats};
