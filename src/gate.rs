//! Activation gate
//!
//! Decides whether a project may leave negotiation and performs the move.
//! `activate` never trusts a snapshot handed in by a caller: it re-derives
//! the contract inside the same transaction that writes the project.

use diesel::prelude::*;
use tracing::info;

use crate::caller::Caller;
use crate::contract::{self, ContractSnapshot};
use crate::db::models::{Project, Proposal};
use crate::db::projects::{self, NegotiatedFields};
use crate::error::AccordError;
use crate::value::{format_budget, ProposalType};

/// At least one goal and one value for every singleton dimension
pub fn can_activate(snapshot: &ContractSnapshot) -> bool {
    !snapshot.goals.is_empty()
        && snapshot.start_date.is_some()
        && snapshot.end_date.is_some()
        && snapshot.budget.is_some()
}

/// Dimensions that still block activation
pub fn missing_dimensions(snapshot: &ContractSnapshot) -> Vec<ProposalType> {
    snapshot.missing_dimensions()
}

/// Copy the accepted singleton values onto the project and flip it to active
pub fn activate(
    conn: &mut SqliteConnection,
    caller: &Caller,
    project_id: &str,
) -> Result<Project, AccordError> {
    conn.immediate_transaction(|conn| {
        let project = load_pending_for_admin(conn, caller, project_id, "activate")?;

        let snapshot = contract::snapshot(conn, &project.id)?;
        let fields = match (&snapshot.start_date, &snapshot.end_date, &snapshot.budget) {
            (Some(start), Some(end), Some(budget)) if can_activate(&snapshot) => {
                negotiated_fields(start, end, budget)?
            }
            _ => {
                return Err(AccordError::IncompleteContract {
                    missing: snapshot.missing_dimensions(),
                })
            }
        };

        if projects::mark_active(conn, &project.id, &fields)? == 0 {
            return Err(AccordError::Conflict(format!(
                "project {} left pending during activation",
                project.id
            )));
        }

        info!(
            project = %project.id,
            by = %caller.user_id,
            budget = %fields.budget,
            start_date = %fields.start_date,
            end_date = %fields.end_date,
            goals = snapshot.goals.len(),
            "Project activated"
        );

        projects::get_project(conn, &project.id)
    })
}

/// Close negotiation without activating. No contract check.
pub fn reject(
    conn: &mut SqliteConnection,
    caller: &Caller,
    project_id: &str,
) -> Result<Project, AccordError> {
    conn.immediate_transaction(|conn| {
        let project = load_pending_for_admin(conn, caller, project_id, "reject")?;

        if projects::mark_rejected(conn, &project.id)? == 0 {
            return Err(AccordError::Conflict(format!(
                "project {} left pending during rejection",
                project.id
            )));
        }

        info!(project = %project.id, by = %caller.user_id, "Project rejected");
        projects::get_project(conn, &project.id)
    })
}

fn load_pending_for_admin(
    conn: &mut SqliteConnection,
    caller: &Caller,
    project_id: &str,
    action: &str,
) -> Result<Project, AccordError> {
    let project = projects::get_project(conn, project_id)?;

    if !caller.may_arbitrate(&project) {
        return Err(AccordError::Forbidden(format!(
            "{} may not {} project {}",
            caller.user_id, action, project.id
        )));
    }

    if !project.is_negotiating() {
        return Err(AccordError::PreconditionFailed(format!(
            "project {} is already {}",
            project.id, project.status
        )));
    }

    Ok(project)
}

fn negotiated_fields(
    start: &Proposal,
    end: &Proposal,
    budget: &Proposal,
) -> Result<NegotiatedFields, AccordError> {
    let amount = budget.typed_value()?.as_budget().ok_or_else(|| {
        AccordError::Internal(format!("proposal {} does not hold a budget", budget.id))
    })?;

    Ok(NegotiatedFields {
        budget: format_budget(&amount),
        start_date: start.typed_value()?.canonical_text(),
        end_date: end.typed_value()?.canonical_text(),
    })
}
