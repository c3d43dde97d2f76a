//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! Enumerated columns are stored as TEXT; typed accessors parse them and
//! report corrupt rows as internal errors.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;
use crate::error::AccordError;
use crate::value::{ProposalStatus, ProposalType, ProposalValue};

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Current UTC timestamp as ISO 8601 with millisecond precision.
///
/// Acceptance order of goals is derived from these strings, so they must
/// sort lexically. Equal timestamps are ordered by the proposal `seq`.
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ============================================================================
// Project Models
// ============================================================================

/// Project row from SELECT query
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = projects)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub administrator_id: String,
    pub budget: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: String,
    pub activated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    pub fn is_negotiating(&self) -> bool {
        self.status == project_statuses::PENDING
    }
}

/// New project for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = projects)]
pub struct NewProject<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub administrator_id: &'a str,
    pub status: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Proposal Models
// ============================================================================

/// Proposal row from SELECT query
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = proposals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Proposal {
    pub id: String,
    pub project_id: String,
    pub proposal_type: String,
    pub value: String,
    pub status: String,
    pub proposer_id: String,
    pub validator_id: Option<String>,
    pub decided_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Proposal {
    pub fn kind(&self) -> Result<ProposalType, AccordError> {
        self.proposal_type.parse().map_err(|_| {
            AccordError::Internal(format!(
                "Proposal {} has unknown type {}",
                self.id, self.proposal_type
            ))
        })
    }

    pub fn current_status(&self) -> Result<ProposalStatus, AccordError> {
        self.status.parse().map_err(|_| {
            AccordError::Internal(format!(
                "Proposal {} has unknown status {}",
                self.id, self.status
            ))
        })
    }

    /// Stored text parsed back into its typed form
    pub fn typed_value(&self) -> Result<ProposalValue, AccordError> {
        let kind = self.kind()?;
        ProposalValue::parse(kind, &self.value).map_err(|e| {
            AccordError::Internal(format!("Proposal {} holds an invalid value: {}", self.id, e))
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == proposal_statuses::PENDING
    }
}

/// New proposal for INSERT (validator and decided_at stay NULL while pending)
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = proposals)]
pub struct NewProposal<'a> {
    pub id: &'a str,
    pub seq: i64,
    pub project_id: &'a str,
    pub proposal_type: &'a str,
    pub value: &'a str,
    pub status: &'a str,
    pub proposer_id: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Constants
// ============================================================================

pub mod project_statuses {
    pub const PENDING: &str = "pending";
    pub const ACTIVE: &str = "active";
    pub const COMPLETED: &str = "completed";
    pub const REJECTED: &str = "rejected";
    pub const CANCELED: &str = "canceled";
}

pub mod proposal_statuses {
    pub const PENDING: &str = "pending";
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_lexically() {
        let earlier = current_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = current_timestamp();
        assert!(earlier < later);
        assert_eq!(earlier.len(), "2025-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn test_corrupt_type_is_internal() {
        let proposal = Proposal {
            id: "x".into(),
            project_id: "p".into(),
            proposal_type: "deadline".into(),
            value: "soon".into(),
            status: "pending".into(),
            proposer_id: "u".into(),
            validator_id: None,
            decided_at: None,
            created_at: current_timestamp(),
            updated_at: current_timestamp(),
        };
        assert!(matches!(proposal.kind(), Err(AccordError::Internal(_))));
    }
}
