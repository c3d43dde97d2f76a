//! View types for HTTP API boundary
//!
//! These types use camelCase serialization for TypeScript clients.
//! Row types in db/models.rs use snake_case for database compatibility.
//!
//! Pattern:
//! - Services return rows and domain types (Proposal, ContractSnapshot, ...)
//! - HTTP layer converts to View types (ProposalView, ContractView, ...)
//! - ts-rs generates camelCase TypeScript from View types
//!
//! InputView types (suffix InputView) accept camelCase JSON and keep
//! enumerations as strings; services parse them so unknown values surface
//! as `InvalidArgument` rather than a deserializer error.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::contract::ContractSnapshot;
use crate::db::models::{Project, Proposal};
use crate::db::DbStats;
use crate::services::DecisionReport;
use crate::value::ProposalType;

// ============================================================================
// Proposal View
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProposalView {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub proposal_type: String,
    pub value: String,
    pub status: String,
    pub proposer_id: String,
    pub validator_id: Option<String>,
    pub decided_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Proposal> for ProposalView {
    fn from(p: Proposal) -> Self {
        Self {
            id: p.id,
            project_id: p.project_id,
            proposal_type: p.proposal_type,
            value: p.value,
            status: p.status,
            proposer_id: p.proposer_id,
            validator_id: p.validator_id,
            decided_at: p.decided_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<&Proposal> for ProposalView {
    fn from(p: &Proposal) -> Self {
        p.clone().into()
    }
}

// ============================================================================
// Project View
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProjectView {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub administrator_id: String,
    /// Fixed point with two fraction digits, set on activation
    pub budget: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: String,
    pub activated_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Project> for ProjectView {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            title: p.title,
            description: p.description,
            administrator_id: p.administrator_id,
            budget: p.budget,
            start_date: p.start_date,
            end_date: p.end_date,
            status: p.status,
            activated_at: p.activated_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

// ============================================================================
// Contract View
// ============================================================================

/// Contract snapshot. Every dimension is an array for uniformity; singleton
/// dimensions hold at most one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ContractView {
    pub project_id: String,
    pub goals: Vec<ProposalView>,
    pub start_dates: Vec<ProposalView>,
    pub end_dates: Vec<ProposalView>,
    pub budgets: Vec<ProposalView>,
    /// Whether activation would currently succeed
    pub complete: bool,
    /// Dimensions without an accepted proposal
    pub missing: Vec<String>,
}

impl From<ContractSnapshot> for ContractView {
    fn from(s: ContractSnapshot) -> Self {
        let missing = s
            .missing_dimensions()
            .iter()
            .map(|d| d.as_str().to_string())
            .collect::<Vec<_>>();
        let views = |kind| -> Vec<ProposalView> {
            s.dimension(kind).into_iter().map(ProposalView::from).collect()
        };

        Self {
            goals: views(ProposalType::Goal),
            start_dates: views(ProposalType::StartDate),
            end_dates: views(ProposalType::EndDate),
            budgets: views(ProposalType::Budget),
            complete: missing.is_empty(),
            missing,
            project_id: s.project_id,
        }
    }
}

// ============================================================================
// Decision View
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DecisionView {
    pub proposal: ProposalView,
    /// Siblings moved to rejected by this acceptance
    pub retired: Vec<String>,
    /// False when the proposal already held the requested status
    pub changed: bool,
    /// Informational: activation is still a separate call
    pub contract_complete: bool,
    pub missing: Vec<String>,
}

impl From<DecisionReport> for DecisionView {
    fn from(r: DecisionReport) -> Self {
        Self {
            proposal: r.proposal.into(),
            retired: r.retired,
            changed: r.changed,
            contract_complete: r.missing.is_empty(),
            missing: r.missing.iter().map(|d| d.as_str().to_string()).collect(),
        }
    }
}

// ============================================================================
// Health View
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HealthView {
    pub status: String,
    pub version: String,
    pub projects: u64,
    pub pending_proposals: u64,
    pub accepted_proposals: u64,
    pub rejected_proposals: u64,
}

impl From<DbStats> for HealthView {
    fn from(stats: DbStats) -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            projects: stats.project_count,
            pending_proposals: stats.pending_proposals,
            accepted_proposals: stats.accepted_proposals,
            rejected_proposals: stats.rejected_proposals,
        }
    }
}

// ============================================================================
// Input Views
// ============================================================================

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateProposalInputView {
    pub project_id: String,
    #[serde(rename = "type")]
    pub proposal_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EditProposalInputView {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DecideProposalInputView {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateProjectInputView {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<CreateProjectInputView> for crate::db::CreateProjectInput {
    fn from(v: CreateProjectInputView) -> Self {
        Self {
            title: v.title,
            description: v.description,
        }
    }
}

/// `GET /proposals` query string
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalListParams {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default, rename = "type")]
    pub proposal_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::current_timestamp;

    fn proposal(id: &str, kind: &str, value: &str) -> Proposal {
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
    fn test_proposal_view_is_camel_case_with_type_key() {
        let view = ProposalView::from(proposal("x", "start_date", "2025-01-01"));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["type"], "start_date");
        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["validatorId"], "alice");
        assert!(json.get("proposal_type").is_none());
    }

    #[test]
    fn test_contract_view_uses_arrays() {
        let snapshot = ContractSnapshot::from_accepted(
            "p1",
            vec![proposal("g1", "goal", "Deliver MVP"), proposal("b1", "budget", "2000.00")],
        )
        .unwrap();

        let view = ContractView::from(snapshot);
        assert_eq!(view.goals.len(), 1);
        assert_eq!(view.budgets.len(), 1);
        assert!(view.start_dates.is_empty());
        assert!(!view.complete);
        assert_eq!(view.missing, vec!["start_date", "end_date"]);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("startDates").is_some());
    }

    #[test]
    fn test_list_params_from_query_string() {
        let params: ProposalListParams =
            serde_urlencoded::from_str("projectId=p1&type=budget").unwrap();
        assert_eq!(params.project_id.as_deref(), Some("p1"));
        assert_eq!(params.proposal_type.as_deref(), Some("budget"));
        assert!(params.status.is_none());
    }

    #[test]
    fn test_create_input_reads_type_key() {
        let input: CreateProposalInputView =
            serde_json::from_str(r#"{"projectId":"p1","type":"goal","value":"Deliver MVP"}"#)
                .unwrap();
        assert_eq!(input.proposal_type, "goal");
    }
}
