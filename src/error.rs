//! Error types for accord

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

use crate::value::{ProposalStatus, ProposalType};

#[derive(Error, Debug)]
pub enum AccordError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Contract incomplete, missing: {}", format_dimensions(.missing))]
    IncompleteContract { missing: Vec<ProposalType> },

    #[error("Cannot move proposal from {from} to {to}")]
    InvalidTransition {
        from: ProposalStatus,
        to: ProposalStatus,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AccordError {
    /// Whether the operation may succeed if retried against fresh state
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccordError::Conflict(_))
    }
}

fn format_dimensions(missing: &[ProposalType]) -> String {
    missing
        .iter()
        .map(|d| d.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<DieselError> for AccordError {
    fn from(e: DieselError) -> Self {
        match e {
            DieselError::NotFound => AccordError::NotFound("record".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                AccordError::Conflict(format!("Concurrent write rejected: {}", info.message()))
            }
            DieselError::DatabaseError(kind, info) if is_lock_contention(info.message()) => {
                AccordError::Conflict(format!("Store busy ({:?}): {}", kind, info.message()))
            }
            other => AccordError::Database(other.to_string()),
        }
    }
}

/// SQLite reports writer contention as SQLITE_BUSY / SQLITE_LOCKED text
fn is_lock_contention(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("database is locked") || message.contains("busy")
}
