//! Proposal service - the lifecycle API over the proposal store
//!
//! Validates values at the boundary, routes every status change through the
//! enforcer, and emits an event after each committed write.

use std::sync::Arc;

use tracing::debug;

use crate::caller::Caller;
use crate::contract;
use crate::db::models::Proposal;
use crate::db::{projects, proposals, AccordDb, ProposalQuery};
use crate::enforcer::Enforcer;
use crate::error::AccordError;
use crate::value::{ProposalStatus, ProposalType, ProposalValue};

use super::events::{EventBus, NegotiationEvent};

/// Result of a decision, with the contract state it produced
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReport {
    pub proposal: Proposal,
    pub previous: ProposalStatus,
    /// Siblings moved to rejected by a singleton acceptance
    pub retired: Vec<String>,
    pub changed: bool,
    /// Dimensions the contract still lacks after the decision
    pub missing: Vec<ProposalType>,
}

impl DecisionReport {
    pub fn contract_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Proposal lifecycle service
pub struct ProposalService {
    db: Arc<AccordDb>,
    enforcer: Enforcer,
    events: Arc<EventBus>,
}

impl ProposalService {
    /// Create a new proposal service
    pub fn new(db: Arc<AccordDb>, enforcer: Enforcer, events: Arc<EventBus>) -> Self {
        Self {
            db,
            enforcer,
            events,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get proposal by ID
    pub fn get(&self, id: &str) -> Result<Proposal, AccordError> {
        self.db.with_conn(|conn| proposals::get_proposal(conn, id))
    }

    /// List proposals of a project, optionally by type and status
    pub fn list(&self, query: &ProposalQuery) -> Result<Vec<Proposal>, AccordError> {
        if query.project_id.is_empty() {
            return Err(AccordError::InvalidArgument("projectId is required".into()));
        }

        self.db.with_conn(|conn| {
            projects::get_project(conn, &query.project_id)?;
            proposals::list_proposals(conn, query)
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Submit a pending proposal on behalf of `caller`
    pub fn submit(
        &self,
        caller: &Caller,
        project_id: &str,
        proposal_type: &str,
        value: &str,
    ) -> Result<Proposal, AccordError> {
        let kind: ProposalType = proposal_type.parse()?;
        let typed = ProposalValue::parse(kind, value)?;

        let proposal = self.db.with_conn(|conn| {
            proposals::create_proposal(conn, project_id, &caller.user_id, &typed, value)
        })?;

        self.events.emit(NegotiationEvent::ProposalSubmitted {
            id: proposal.id.clone(),
            project_id: proposal.project_id.clone(),
            proposal_type: kind,
            proposer_id: proposal.proposer_id.clone(),
        });

        Ok(proposal)
    }

    /// Accept, reject, or revert a proposal
    pub fn decide(
        &self,
        caller: &Caller,
        id: &str,
        target: ProposalStatus,
    ) -> Result<DecisionReport, AccordError> {
        let report = self.db.with_conn(|conn| {
            let decision = self.enforcer.decide(conn, caller, id, target)?;
            let snapshot = contract::snapshot(conn, &decision.proposal.project_id)?;

            Ok(DecisionReport {
                missing: snapshot.missing_dimensions(),
                proposal: decision.proposal,
                previous: decision.previous,
                retired: decision.retired,
                changed: decision.changed,
            })
        })?;

        if report.changed {
            self.events.emit(NegotiationEvent::ProposalDecided {
                id: report.proposal.id.clone(),
                project_id: report.proposal.project_id.clone(),
                from: report.previous,
                to: target,
                validator_id: caller.user_id.clone(),
                retired: report.retired.clone(),
            });
        } else {
            debug!(proposal = %id, status = %target, "Decision left proposal unchanged");
        }

        Ok(report)
    }

    /// Replace the value of a pending proposal
    pub fn edit(&self, caller: &Caller, id: &str, value: &str) -> Result<Proposal, AccordError> {
        let proposal = self.db.with_conn(|conn| {
            proposals::edit_pending_value(conn, id, &caller.user_id, value, ProposalValue::parse)
        })?;

        self.events.emit(NegotiationEvent::ProposalEdited {
            id: proposal.id.clone(),
            project_id: proposal.project_id.clone(),
        });

        Ok(proposal)
    }

    /// Delete a pending proposal
    pub fn delete(&self, caller: &Caller, id: &str) -> Result<(), AccordError> {
        let proposal = self
            .db
            .with_conn(|conn| proposals::delete_pending(conn, id, &caller.user_id))?;

        self.events.emit(NegotiationEvent::ProposalDeleted {
            id: proposal.id,
            project_id: proposal.project_id,
        });

        Ok(())
    }
}
