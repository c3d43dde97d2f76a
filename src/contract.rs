//! Contract consolidator
//!
//! Derives the contract of a project from the proposal store: accepted
//! proposals grouped by dimension. Nothing here is cached; each snapshot is
//! a fresh read and may be stale as soon as another decision commits.

use diesel::prelude::*;

use crate::db::models::Proposal;
use crate::db::{projects, proposals};
use crate::error::AccordError;
use crate::value::ProposalType;

/// Accepted proposals of one project, grouped by dimension
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContractSnapshot {
    pub project_id: String,
    /// In acceptance order
    pub goals: Vec<Proposal>,
    pub start_date: Option<Proposal>,
    pub end_date: Option<Proposal>,
    pub budget: Option<Proposal>,
}

impl ContractSnapshot {
    /// Group accepted proposals (already in acceptance order) by type.
    ///
    /// A second accepted proposal for a singleton dimension means the store
    /// lost its mutual-exclusion invariant and is reported, never resolved.
    pub fn from_accepted(
        project_id: impl Into<String>,
        accepted: Vec<Proposal>,
    ) -> Result<Self, AccordError> {
        let mut snapshot = ContractSnapshot {
            project_id: project_id.into(),
            ..Default::default()
        };

        for proposal in accepted {
            let slot = match proposal.kind()? {
                ProposalType::Goal => {
                    snapshot.goals.push(proposal);
                    continue;
                }
                ProposalType::StartDate => &mut snapshot.start_date,
                ProposalType::EndDate => &mut snapshot.end_date,
                ProposalType::Budget => &mut snapshot.budget,
            };

            if let Some(existing) = slot {
                return Err(AccordError::Internal(format!(
                    "project {} has more than one accepted {} proposal ({}, {})",
                    snapshot.project_id, proposal.proposal_type, existing.id, proposal.id
                )));
            }
            *slot = Some(proposal);
        }

        Ok(snapshot)
    }

    /// Dimensions without an accepted proposal, in canonical order
    pub fn missing_dimensions(&self) -> Vec<ProposalType> {
        ProposalType::ALL
            .into_iter()
            .filter(|kind| match kind {
                ProposalType::Goal => self.goals.is_empty(),
                ProposalType::StartDate => self.start_date.is_none(),
                ProposalType::EndDate => self.end_date.is_none(),
                ProposalType::Budget => self.budget.is_none(),
            })
            .collect()
    }

    /// Accepted proposals for one dimension, as a list
    pub fn dimension(&self, kind: ProposalType) -> Vec<&Proposal> {
        match kind {
            ProposalType::Goal => self.goals.iter().collect(),
            ProposalType::StartDate => self.start_date.iter().collect(),
            ProposalType::EndDate => self.end_date.iter().collect(),
            ProposalType::Budget => self.budget.iter().collect(),
        }
    }
}

/// Current contract of `project_id`
pub fn snapshot(
    conn: &mut SqliteConnection,
    project_id: &str,
) -> Result<ContractSnapshot, AccordError> {
    projects::get_project(conn, project_id)?;
    let accepted = proposals::accepted_proposals(conn, project_id)?;
    ContractSnapshot::from_accepted(project_id, accepted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::current_timestamp;

    fn accepted(id: &str, kind: &str, value: &str) -> Proposal {
        let now = current_timestamp();
        Proposal {
            id: id.into(),
            project_id: "p1".into(),
            proposal_type: kind.into(),
            value: value.into(),
            status: "accepted".into(),
            proposer_id: "bob".into(),
            validator_id: Some("alice".into()),
            decided_at: Some(now.clone()),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_groups_by_dimension() {
        let snapshot = ContractSnapshot::from_accepted(
            "p1",
            vec![
                accepted("g1", "goal", "Deliver MVP"),
                accepted("b1", "budget", "1000.00"),
                accepted("g2", "goal", "Write docs"),
            ],
        )
        .unwrap();

        let goals: Vec<_> = snapshot.goals.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(goals, vec!["g1", "g2"]);
        assert_eq!(snapshot.budget.as_ref().map(|b| b.value.as_str()), Some("1000.00"));
        assert_eq!(
            snapshot.missing_dimensions(),
            vec![ProposalType::StartDate, ProposalType::EndDate]
        );
        assert_eq!(snapshot.dimension(ProposalType::StartDate).len(), 0);
    }

    #[test]
    fn test_duplicate_singleton_is_internal() {
        let err = ContractSnapshot::from_accepted(
            "p1",
            vec![
                accepted("e1", "end_date", "2025-06-30"),
                accepted("e2", "end_date", "2025-07-31"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, AccordError::Internal(_)));
    }

    #[test]
    fn test_empty_contract_misses_everything() {
        let snapshot = ContractSnapshot::from_accepted("p1", vec![]).unwrap();
        assert_eq!(snapshot.missing_dimensions(), ProposalType::ALL.to_vec());
    }

    #[test]
    fn test_snapshot_of_missing_project() {
        let db = crate::db::AccordDb::open_in_memory().unwrap();
        let err = db.with_conn(|conn| snapshot(conn, "nope")).unwrap_err();
        assert!(matches!(err, AccordError::NotFound(_)));
    }
}
