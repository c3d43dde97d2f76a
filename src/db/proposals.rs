//! Proposal store operations
//!
//! Keyed storage of proposals, queryable by project, by project + type, and
//! by id. Value edits and deletes are proposer-gated and only touch pending
//! rows. Status writes are exposed as conditional primitives
//! (`transition_status`, `retire_siblings`) for the mutual-exclusion
//! enforcer, which is the only caller allowed to change a proposal's status.

use std::collections::HashMap;

use diesel::dsl::{count_star, max};
use diesel::prelude::*;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::diesel_schema::proposals;
use super::models::{current_timestamp, proposal_statuses, NewProposal, Proposal};
use super::projects;
use crate::error::AccordError;
use crate::value::{ProposalStatus, ProposalType, ProposalValue};

// ============================================================================
// Query Types
// ============================================================================

/// Filters for listing proposals of one project
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalQuery {
    pub project_id: String,
    #[serde(default)]
    pub proposal_type: Option<ProposalType>,
    #[serde(default)]
    pub status: Option<ProposalStatus>,
}

impl ProposalQuery {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, proposal_type: ProposalType) -> Self {
        self.proposal_type = Some(proposal_type);
        self
    }

    pub fn with_status(mut self, status: ProposalStatus) -> Self {
        self.status = Some(status);
        self
    }
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get a proposal by ID
pub fn get_proposal(conn: &mut SqliteConnection, id: &str) -> Result<Proposal, AccordError> {
    proposals::table
        .find(id)
        .select(Proposal::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AccordError::NotFound(format!("proposal {}", id)))
}

/// List proposals of a project in submission order
pub fn list_proposals(
    conn: &mut SqliteConnection,
    query: &ProposalQuery,
) -> Result<Vec<Proposal>, AccordError> {
    let mut q = proposals::table
        .filter(proposals::project_id.eq(&query.project_id))
        .select(Proposal::as_select())
        .into_boxed();

    if let Some(proposal_type) = query.proposal_type {
        q = q.filter(proposals::proposal_type.eq(proposal_type.as_str()));
    }

    if let Some(status) = query.status {
        q = q.filter(proposals::status.eq(status.as_str()));
    }

    q.order(proposals::seq.asc())
        .load(conn)
        .map_err(|e| AccordError::Database(format!("Failed to list proposals: {}", e)))
}

/// Accepted proposals of a project in acceptance order
///
/// Ties on the decision timestamp fall back to submission order.
pub fn accepted_proposals(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<Vec<Proposal>, AccordError> {
    proposals::table
        .filter(proposals::project_id.eq(project_id))
        .filter(proposals::status.eq(proposal_statuses::ACCEPTED))
        .select(Proposal::as_select())
        .order((proposals::decided_at.asc(), proposals::seq.asc()))
        .load(conn)
        .map_err(|e| AccordError::Database(format!("Failed to load accepted proposals: {}", e)))
}

/// Count proposals by status, optionally for one project
pub fn count_by_status(
    conn: &mut SqliteConnection,
    project_id: Option<&str>,
) -> Result<HashMap<String, i64>, AccordError> {
    let results: Vec<(String, i64)> = match project_id {
        Some(project_id) => proposals::table
            .filter(proposals::project_id.eq(project_id))
            .group_by(proposals::status)
            .select((proposals::status, count_star()))
            .load(conn),
        None => proposals::table
            .group_by(proposals::status)
            .select((proposals::status, count_star()))
            .load(conn),
    }
    .map_err(|e| AccordError::Database(format!("Failed to count proposals: {}", e)))?;

    Ok(results.into_iter().collect())
}

// ============================================================================
// Proposer Operations
// ============================================================================

/// Create a pending proposal. The project must exist and still be negotiating.
pub fn create_proposal(
    conn: &mut SqliteConnection,
    project_id: &str,
    proposer_id: &str,
    value: &ProposalValue,
    raw_value: &str,
) -> Result<Proposal, AccordError> {
    conn.immediate_transaction(|conn| {
        let project = projects::get_project(conn, project_id)?;
        if !project.is_negotiating() {
            return Err(AccordError::PreconditionFailed(format!(
                "project {} is {}, proposals are only accepted while pending",
                project_id, project.status
            )));
        }

        let id = Uuid::new_v4().to_string();
        let now = current_timestamp();

        // Serialized by the write lock, so the next value is unique
        let last_seq: Option<i64> = proposals::table.select(max(proposals::seq)).first(conn)?;

        let new_proposal = NewProposal {
            id: &id,
            seq: last_seq.unwrap_or(0) + 1,
            project_id,
            proposal_type: value.kind().as_str(),
            value: raw_value,
            status: proposal_statuses::PENDING,
            proposer_id,
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(proposals::table)
            .values(&new_proposal)
            .execute(conn)?;

        debug!(
            "Created {} proposal {} for project {}",
            new_proposal.proposal_type, id, project_id
        );

        get_proposal(conn, &id)
    })
}

/// Replace the value of a pending proposal. Only its proposer may edit it.
///
/// `validate` receives the proposal's type and must accept the new value
/// before anything is written.
pub fn edit_pending_value<F>(
    conn: &mut SqliteConnection,
    id: &str,
    caller_id: &str,
    raw_value: &str,
    validate: F,
) -> Result<Proposal, AccordError>
where
    F: FnOnce(ProposalType, &str) -> Result<ProposalValue, AccordError>,
{
    conn.immediate_transaction(|conn| {
        let proposal = get_proposal(conn, id)?;
        ensure_proposer_may_modify(conn, &proposal, caller_id, "edit")?;

        validate(proposal.kind()?, raw_value)?;

        let now = current_timestamp();
        let updated = diesel::update(
            proposals::table
                .filter(proposals::id.eq(id))
                .filter(proposals::status.eq(proposal_statuses::PENDING)),
        )
        .set((proposals::value.eq(raw_value), proposals::updated_at.eq(&now)))
        .execute(conn)?;

        if updated == 0 {
            return Err(AccordError::Conflict(format!(
                "proposal {} changed while being edited",
                id
            )));
        }

        get_proposal(conn, id)
    })
}

/// Delete a pending proposal. Only its proposer may delete it.
pub fn delete_pending(
    conn: &mut SqliteConnection,
    id: &str,
    caller_id: &str,
) -> Result<Proposal, AccordError> {
    conn.immediate_transaction(|conn| {
        let proposal = get_proposal(conn, id)?;
        ensure_proposer_may_modify(conn, &proposal, caller_id, "delete")?;

        let deleted = diesel::delete(
            proposals::table
                .filter(proposals::id.eq(id))
                .filter(proposals::status.eq(proposal_statuses::PENDING)),
        )
        .execute(conn)?;

        if deleted == 0 {
            return Err(AccordError::Conflict(format!(
                "proposal {} changed while being deleted",
                id
            )));
        }

        debug!("Deleted proposal {}", id);
        Ok(proposal)
    })
}

fn ensure_proposer_may_modify(
    conn: &mut SqliteConnection,
    proposal: &Proposal,
    caller_id: &str,
    action: &str,
) -> Result<(), AccordError> {
    if proposal.proposer_id != caller_id {
        return Err(AccordError::Forbidden(format!(
            "only the proposer may {} proposal {}",
            action, proposal.id
        )));
    }

    if !proposal.is_pending() {
        return Err(AccordError::Forbidden(format!(
            "cannot {} proposal {}: it is already {}",
            action, proposal.id, proposal.status
        )));
    }

    let project = projects::get_project(conn, &proposal.project_id)?;
    if !project.is_negotiating() {
        return Err(AccordError::PreconditionFailed(format!(
            "project {} is {}, negotiation is closed",
            project.id, project.status
        )));
    }

    Ok(())
}

// ============================================================================
// Status Primitives (mutual-exclusion enforcer only)
// ============================================================================

/// Move one proposal from `expected` to `next`, stamping or clearing the
/// decision fields. Returns the number of rows changed: 0 means the row no
/// longer holds `expected`.
pub(crate) fn transition_status(
    conn: &mut SqliteConnection,
    id: &str,
    expected: ProposalStatus,
    next: ProposalStatus,
    validator_id: Option<&str>,
    decided_at: Option<&str>,
) -> Result<usize, AccordError> {
    let now = current_timestamp();

    diesel::update(
        proposals::table
            .filter(proposals::id.eq(id))
            .filter(proposals::status.eq(expected.as_str())),
    )
    .set((
        proposals::status.eq(next.as_str()),
        proposals::validator_id.eq(validator_id),
        proposals::decided_at.eq(decided_at),
        proposals::updated_at.eq(&now),
    ))
    .execute(conn)
    .map_err(AccordError::from)
}

/// Reject every other accepted or pending proposal of the same project and
/// type as `winner`. Returns the ids that were retired.
pub(crate) fn retire_siblings(
    conn: &mut SqliteConnection,
    winner: &Proposal,
    validator_id: &str,
    decided_at: &str,
) -> Result<Vec<String>, AccordError> {
    let retired: Vec<String> = proposals::table
        .filter(proposals::project_id.eq(&winner.project_id))
        .filter(proposals::proposal_type.eq(&winner.proposal_type))
        .filter(proposals::id.ne(&winner.id))
        .filter(proposals::status.eq_any([proposal_statuses::ACCEPTED, proposal_statuses::PENDING]))
        .select(proposals::id)
        .load(conn)?;

    if retired.is_empty() {
        return Ok(retired);
    }

    diesel::update(proposals::table.filter(proposals::id.eq_any(&retired)))
        .set((
            proposals::status.eq(proposal_statuses::REJECTED),
            proposals::validator_id.eq(Some(validator_id)),
            proposals::decided_at.eq(Some(decided_at)),
            proposals::updated_at.eq(decided_at),
        ))
        .execute(conn)?;

    debug!(
        winner = %winner.id,
        count = retired.len(),
        "Retired sibling {} proposals",
        winner.proposal_type
    );

    Ok(retired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::projects::{create_project, CreateProjectInput};
    use crate::db::AccordDb;

    fn setup() -> (AccordDb, String) {
        let db = AccordDb::open_in_memory().unwrap();
        let project = db
            .with_conn(|conn| {
                create_project(
                    conn,
                    "admin",
                    &CreateProjectInput {
                        title: "Garden".into(),
                        description: None,
                    },
                )
            })
            .unwrap();
        (db, project.id)
    }

    fn submit(db: &AccordDb, project_id: &str, proposer: &str, kind: ProposalType, raw: &str) -> Proposal {
        let value = ProposalValue::parse(kind, raw).unwrap();
        db.with_conn(|conn| create_proposal(conn, project_id, proposer, &value, raw))
            .unwrap()
    }

    #[test]
    fn test_create_is_pending_and_unstamped() {
        let (db, project_id) = setup();
        let proposal = submit(&db, &project_id, "bob", ProposalType::Budget, "1000.00");

        assert_eq!(proposal.status, proposal_statuses::PENDING);
        assert_eq!(proposal.value, "1000.00");
        assert_eq!(proposal.proposal_type, "budget");
        assert!(proposal.validator_id.is_none());
        assert!(proposal.decided_at.is_none());
    }

    #[test]
    fn test_create_for_missing_project() {
        let db = AccordDb::open_in_memory().unwrap();
        let value = ProposalValue::parse(ProposalType::Goal, "Deliver MVP").unwrap();
        let err = db
            .with_conn(|conn| create_proposal(conn, "nope", "bob", &value, "Deliver MVP"))
            .unwrap_err();
        assert!(matches!(err, AccordError::NotFound(_)));
    }

    #[test]
    fn test_list_filters_by_type_and_status() {
        let (db, project_id) = setup();
        submit(&db, &project_id, "bob", ProposalType::Goal, "Deliver MVP");
        submit(&db, &project_id, "bob", ProposalType::Budget, "10");
        submit(&db, &project_id, "eve", ProposalType::Budget, "20");

        db.with_conn(|conn| {
            let all = list_proposals(conn, &ProposalQuery::for_project(&project_id))?;
            assert_eq!(all.len(), 3);

            let budgets = list_proposals(
                conn,
                &ProposalQuery::for_project(&project_id).with_type(ProposalType::Budget),
            )?;
            assert_eq!(budgets.len(), 2);
            assert_eq!(budgets[0].value, "10");

            let accepted = list_proposals(
                conn,
                &ProposalQuery::for_project(&project_id).with_status(ProposalStatus::Accepted),
            )?;
            assert!(accepted.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_keeps_submission_order() {
        let (db, project_id) = setup();
        let values: Vec<String> = (0..25).map(|i| format!("goal {}", i)).collect();
        for value in &values {
            submit(&db, &project_id, "bob", ProposalType::Goal, value);
        }

        let listed = db
            .with_conn(|conn| list_proposals(conn, &ProposalQuery::for_project(&project_id)))
            .unwrap();
        let listed: Vec<String> = listed.into_iter().map(|p| p.value).collect();
        assert_eq!(listed, values);
    }

    #[test]
    fn test_accepted_ties_fall_back_to_submission_order() {
        let (db, project_id) = setup();
        let first = submit(&db, &project_id, "bob", ProposalType::Goal, "first");
        let second = submit(&db, &project_id, "bob", ProposalType::Goal, "second");

        db.with_conn(|conn| {
            // Same decision timestamp for both, decided in reverse
            let now = current_timestamp();
            for id in [&second.id, &first.id] {
                transition_status(
                    conn,
                    id,
                    ProposalStatus::Pending,
                    ProposalStatus::Accepted,
                    Some("admin"),
                    Some(&now),
                )?;
            }

            let accepted = accepted_proposals(conn, &project_id)?;
            let values: Vec<&str> = accepted.iter().map(|p| p.value.as_str()).collect();
            assert_eq!(values, vec!["first", "second"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_seq_stays_monotonic_after_delete() {
        let (db, project_id) = setup();
        submit(&db, &project_id, "bob", ProposalType::Goal, "a");
        let middle = submit(&db, &project_id, "bob", ProposalType::Goal, "b");
        db.with_conn(|conn| delete_pending(conn, &middle.id, "bob"))
            .unwrap();
        submit(&db, &project_id, "bob", ProposalType::Goal, "c");

        let listed = db
            .with_conn(|conn| list_proposals(conn, &ProposalQuery::for_project(&project_id)))
            .unwrap();
        let values: Vec<&str> = listed.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(values, vec!["a", "c"]);
    }

    #[test]
    fn test_edit_requires_proposer() {
        let (db, project_id) = setup();
        let proposal = submit(&db, &project_id, "bob", ProposalType::Goal, "Deliver MVP");

        let err = db
            .with_conn(|conn| {
                edit_pending_value(conn, &proposal.id, "eve", "Ship it", ProposalValue::parse)
            })
            .unwrap_err();
        assert!(matches!(err, AccordError::Forbidden(_)));

        let edited = db
            .with_conn(|conn| {
                edit_pending_value(conn, &proposal.id, "bob", "Ship it", ProposalValue::parse)
            })
            .unwrap();
        assert_eq!(edited.value, "Ship it");
    }

    #[test]
    fn test_edit_validates_against_stored_type() {
        let (db, project_id) = setup();
        let proposal = submit(&db, &project_id, "bob", ProposalType::StartDate, "2025-01-01");

        let err = db
            .with_conn(|conn| {
                edit_pending_value(conn, &proposal.id, "bob", "next week", ProposalValue::parse)
            })
            .unwrap_err();
        assert!(matches!(err, AccordError::InvalidArgument(_)));

        let unchanged = db.with_conn(|conn| get_proposal(conn, &proposal.id)).unwrap();
        assert_eq!(unchanged.value, "2025-01-01");
    }

    #[test]
    fn test_decided_proposals_are_frozen() {
        let (db, project_id) = setup();
        let proposal = submit(&db, &project_id, "bob", ProposalType::Goal, "Deliver MVP");

        db.with_conn(|conn| {
            let now = current_timestamp();
            let changed = transition_status(
                conn,
                &proposal.id,
                ProposalStatus::Pending,
                ProposalStatus::Rejected,
                Some("admin"),
                Some(&now),
            )?;
            assert_eq!(changed, 1);

            let edit = edit_pending_value(conn, &proposal.id, "bob", "x", ProposalValue::parse);
            assert!(matches!(edit, Err(AccordError::Forbidden(_))));

            let delete = delete_pending(conn, &proposal.id, "bob");
            assert!(matches!(delete, Err(AccordError::Forbidden(_))));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete_pending_by_proposer() {
        let (db, project_id) = setup();
        let proposal = submit(&db, &project_id, "bob", ProposalType::Goal, "Deliver MVP");

        let err = db
            .with_conn(|conn| delete_pending(conn, &proposal.id, "eve"))
            .unwrap_err();
        assert!(matches!(err, AccordError::Forbidden(_)));

        db.with_conn(|conn| delete_pending(conn, &proposal.id, "bob"))
            .unwrap();
        let err = db
            .with_conn(|conn| get_proposal(conn, &proposal.id))
            .unwrap_err();
        assert!(matches!(err, AccordError::NotFound(_)));
    }

    #[test]
    fn test_transition_is_conditional_on_expected_status() {
        let (db, project_id) = setup();
        let proposal = submit(&db, &project_id, "bob", ProposalType::Goal, "Deliver MVP");

        db.with_conn(|conn| {
            let stale = transition_status(
                conn,
                &proposal.id,
                ProposalStatus::Accepted,
                ProposalStatus::Pending,
                None,
                None,
            )?;
            assert_eq!(stale, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_retire_siblings_leaves_other_types_alone() {
        let (db, project_id) = setup();
        let winner = submit(&db, &project_id, "bob", ProposalType::Budget, "10");
        let sibling = submit(&db, &project_id, "eve", ProposalType::Budget, "20");
        let goal = submit(&db, &project_id, "eve", ProposalType::Goal, "Deliver MVP");

        db.with_conn(|conn| {
            let now = current_timestamp();
            let retired = retire_siblings(conn, &winner, "admin", &now)?;
            assert_eq!(retired, vec![sibling.id.clone()]);

            let sibling = get_proposal(conn, &sibling.id)?;
            assert_eq!(sibling.status, proposal_statuses::REJECTED);
            assert_eq!(sibling.validator_id.as_deref(), Some("admin"));

            assert!(get_proposal(conn, &goal.id)?.is_pending());
            assert!(get_proposal(conn, &winner.id)?.is_pending());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_count_by_status_per_project() {
        let (db, project_id) = setup();
        submit(&db, &project_id, "bob", ProposalType::Goal, "a");
        submit(&db, &project_id, "bob", ProposalType::Goal, "b");

        let counts = db
            .with_conn(|conn| count_by_status(conn, Some(&project_id)))
            .unwrap();
        assert_eq!(counts.get("pending"), Some(&2));
        assert_eq!(counts.get("accepted"), None);
    }
}
