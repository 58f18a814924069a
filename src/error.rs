//! Error types for the ranked arena core
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Callers that need to react to a specific failure
//! downcast to [`ArenaError`].

use crate::types::{Currency, MatchId, ParticipantId};

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for escrow and settlement scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArenaError {
    #[error("Participant not found: {participant_id}")]
    ParticipantNotFound { participant_id: ParticipantId },

    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: MatchId },

    #[error(
        "Insufficient {currency} for participant {participant_id}: required {required}, available {available}"
    )]
    InsufficientFunds {
        participant_id: ParticipantId,
        currency: Currency,
        required: u64,
        available: u64,
    },

    #[error("Fee for match {match_id} has not been reserved by {participant_id}")]
    NotReserved {
        participant_id: ParticipantId,
        match_id: MatchId,
    },

    #[error("Nothing reserved by {participant_id} for match {match_id}")]
    NothingReserved {
        participant_id: ParticipantId,
        match_id: MatchId,
    },

    #[error("Fee for match {match_id} is already reserved by {participant_id}")]
    DuplicateReservation {
        participant_id: ParticipantId,
        match_id: MatchId,
    },

    #[error("Invalid match transition: {reason}")]
    InvalidTransition { reason: String },

    #[error("Match {match_id} has already been settled")]
    AlreadySettled { match_id: MatchId },

    #[error("Participant {winner_id} did not play in match {match_id}")]
    InvalidWinner {
        winner_id: ParticipantId,
        match_id: MatchId,
    },

    #[error("Invalid match status: {status}")]
    InvalidStatus { status: String },

    #[error("Invalid currency type: {value}")]
    InvalidCurrency { value: String },

    #[error("Cannot create ranked match: {details}")]
    EligibilityFailed { details: String },

    #[error("Operation failed, state unchanged: {message}")]
    StorageFailure { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl ArenaError {
    /// Look through an `anyhow::Error` for the arena error that caused it
    pub fn classify(error: &anyhow::Error) -> Option<&ArenaError> {
        error.downcast_ref::<ArenaError>()
    }

    /// Short machine-readable code for logs and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            ArenaError::ParticipantNotFound { .. } => "participant_not_found",
            ArenaError::MatchNotFound { .. } => "match_not_found",
            ArenaError::InsufficientFunds { .. } => "insufficient_funds",
            ArenaError::NotReserved { .. } => "not_reserved",
            ArenaError::NothingReserved { .. } => "nothing_reserved",
            ArenaError::DuplicateReservation { .. } => "duplicate_reservation",
            ArenaError::InvalidTransition { .. } => "invalid_transition",
            ArenaError::AlreadySettled { .. } => "already_settled",
            ArenaError::InvalidWinner { .. } => "invalid_winner",
            ArenaError::InvalidStatus { .. } => "invalid_status",
            ArenaError::InvalidCurrency { .. } => "invalid_currency",
            ArenaError::EligibilityFailed { .. } => "eligibility_failed",
            ArenaError::StorageFailure { .. } => "storage_failure",
            ArenaError::ConfigurationError { .. } => "configuration_error",
            ArenaError::InternalError { .. } => "internal_error",
        }
    }
}

/// Metrics label for any error, arena or otherwise
pub fn error_code(error: &anyhow::Error) -> &'static str {
    ArenaError::classify(error)
        .map(ArenaError::code)
        .unwrap_or("unknown")
}
