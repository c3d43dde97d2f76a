//! Mutual-exclusion enforcer
//!
//! The only component that changes a proposal's status. Every decision runs
//! as one `BEGIN IMMEDIATE` transaction that re-reads the proposal and its
//! project, applies the guards, and for singleton acceptance retires the
//! current winner and pending siblings before promoting the target.
//!
//! Status-changing writes are conditional on the status observed inside the
//! transaction; a write that matches no row surfaces as `Conflict`, which the
//! retry policy absorbs a bounded number of times.

use std::thread;
use std::time::Duration;

use diesel::prelude::*;
use tracing::{info, warn};

use crate::caller::Caller;
use crate::db::models::{current_timestamp, Proposal};
use crate::db::{projects, proposals};
use crate::error::AccordError;
use crate::value::ProposalStatus;

// ============================================================================
// Retry Policy
// ============================================================================

/// Bounded retry with exponential backoff for operations that lost a race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// The backoff stops doubling after this many retries
    const MAX_BACKOFF_DOUBLINGS: u32 = 10;

    /// Delay after the failed `attempt` (1-based): base, 2x base, 4x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(Self::MAX_BACKOFF_DOUBLINGS);
        self.base_backoff.saturating_mul(1 << doublings)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// exhausts the attempts. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, AccordError>
    where
        F: FnMut(u32) -> Result<T, AccordError>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;

            match op(attempts) {
                Err(e) if e.is_retryable() && attempts < self.max_attempts => {
                    let delay = self.backoff(attempts);
                    warn!(
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Write conflict, retrying"
                    );
                    thread::sleep(delay);
                }
                result => return result,
            }
        }
    }
}

// ============================================================================
// Transition Table
// ============================================================================

/// What a decision does to a proposal, given its current and target status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Target equals current status; nothing is written
    Unchanged,
    /// pending/rejected -> accepted, retiring singleton siblings first
    Accept,
    /// pending -> rejected
    Reject,
    /// accepted -> pending, clearing the decision stamp
    Revert,
}

impl Transition {
    pub fn resolve(from: ProposalStatus, to: ProposalStatus) -> Result<Self, AccordError> {
        use ProposalStatus::*;

        match (from, to) {
            (Pending, Pending) | (Accepted, Accepted) | (Rejected, Rejected) => {
                Ok(Transition::Unchanged)
            }
            (Pending, Accepted) | (Rejected, Accepted) => Ok(Transition::Accept),
            (Pending, Rejected) => Ok(Transition::Reject),
            (Accepted, Pending) => Ok(Transition::Revert),
            (Rejected, Pending) | (Accepted, Rejected) => {
                Err(AccordError::InvalidTransition { from, to })
            }
        }
    }
}

// ============================================================================
// Enforcer
// ============================================================================

/// Outcome of one decision
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// The proposal as stored after the decision
    pub proposal: Proposal,
    /// Status before the decision
    pub previous: ProposalStatus,
    /// Sibling ids moved to rejected by a singleton acceptance
    pub retired: Vec<String>,
    /// False when the proposal already held the target status
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Enforcer {
    policy: RetryPolicy,
}

impl Enforcer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Move `proposal_id` to `target` on behalf of `caller`
    pub fn decide(
        &self,
        conn: &mut SqliteConnection,
        caller: &Caller,
        proposal_id: &str,
        target: ProposalStatus,
    ) -> Result<Decision, AccordError> {
        let decision = self
            .policy
            .run(|_| decide_once(conn, caller, proposal_id, target))?;

        if decision.changed {
            info!(
                proposal = %proposal_id,
                from = %decision.previous,
                to = %target,
                by = %caller.user_id,
                retired = decision.retired.len(),
                "Proposal decided"
            );
        }

        Ok(decision)
    }
}

fn decide_once(
    conn: &mut SqliteConnection,
    caller: &Caller,
    proposal_id: &str,
    target: ProposalStatus,
) -> Result<Decision, AccordError> {
    conn.immediate_transaction(|conn| {
        let proposal = proposals::get_proposal(conn, proposal_id)?;
        let project = projects::get_project(conn, &proposal.project_id)?;

        if !project.is_negotiating() {
            return Err(AccordError::PreconditionFailed(format!(
                "project {} is {}, proposals can no longer be decided",
                project.id, project.status
            )));
        }

        if !caller.may_arbitrate(&project) {
            return Err(AccordError::Forbidden(format!(
                "{} is not an arbiter of project {}",
                caller.user_id, project.id
            )));
        }

        if target.is_decided() && caller.is(&proposal.proposer_id) {
            return Err(AccordError::Forbidden(format!(
                "{} cannot decide their own proposal {}",
                caller.user_id, proposal.id
            )));
        }

        let previous = proposal.current_status()?;
        let transition = Transition::resolve(previous, target)?;

        let mut retired = Vec::new();
        let changed = match transition {
            Transition::Unchanged => 0,
            Transition::Accept => {
                let now = current_timestamp();
                // Retire before promoting: the unique index refuses a second
                // accepted singleton.
                if proposal.kind()?.is_singleton() {
                    retired =
                        proposals::retire_siblings(conn, &proposal, &caller.user_id, &now)?;
                }
                proposals::transition_status(
                    conn,
                    &proposal.id,
                    previous,
                    ProposalStatus::Accepted,
                    Some(&caller.user_id),
                    Some(&now),
                )?
            }
            Transition::Reject => {
                let now = current_timestamp();
                proposals::transition_status(
                    conn,
                    &proposal.id,
                    previous,
                    ProposalStatus::Rejected,
                    Some(&caller.user_id),
                    Some(&now),
                )?
            }
            Transition::Revert => proposals::transition_status(
                conn,
                &proposal.id,
                previous,
                ProposalStatus::Pending,
                None,
                None,
            )?,
        };

        if transition != Transition::Unchanged && changed == 0 {
            return Err(AccordError::Conflict(format!(
                "proposal {} left {} before the decision was written",
                proposal.id, previous
            )));
        }

        let proposal = if transition == Transition::Unchanged {
            proposal
        } else {
            proposals::get_proposal(conn, proposal_id)?
        };

        Ok(Decision {
            proposal,
            previous,
            retired,
            changed: transition != Transition::Unchanged,
        })
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::db::models::proposal_statuses;
    use crate::db::projects::{create_project, CreateProjectInput};
    use crate::db::AccordDb;
    use crate::value::{ProposalType, ProposalValue};

    struct Fixture {
        db: AccordDb,
        project_id: String,
        enforcer: Enforcer,
    }

    impl Fixture {
        fn new() -> Self {
            let db = AccordDb::open_in_memory().unwrap();
            let project = db
                .with_conn(|conn| {
                    create_project(
                        conn,
                        "alice",
                        &CreateProjectInput {
                            title: "Garden".into(),
                            description: None,
                        },
                    )
                })
                .unwrap();
            Self {
                db,
                project_id: project.id,
                enforcer: Enforcer::default(),
            }
        }

        fn submit(&self, proposer: &str, kind: ProposalType, raw: &str) -> Proposal {
            let value = ProposalValue::parse(kind, raw).unwrap();
            self.db
                .with_conn(|conn| {
                    proposals::create_proposal(conn, &self.project_id, proposer, &value, raw)
                })
                .unwrap()
        }

        fn decide(
            &self,
            caller: &Caller,
            id: &str,
            target: ProposalStatus,
        ) -> Result<Decision, AccordError> {
            self.db
                .with_conn(|conn| self.enforcer.decide(conn, caller, id, target))
        }

        fn status_of(&self, id: &str) -> String {
            self.db
                .with_conn(|conn| proposals::get_proposal(conn, id))
                .unwrap()
                .status
        }
    }

    #[test]
    fn test_transition_table() {
        use ProposalStatus::*;

        assert_eq!(Transition::resolve(Pending, Accepted).unwrap(), Transition::Accept);
        assert_eq!(Transition::resolve(Rejected, Accepted).unwrap(), Transition::Accept);
        assert_eq!(Transition::resolve(Pending, Rejected).unwrap(), Transition::Reject);
        assert_eq!(Transition::resolve(Accepted, Pending).unwrap(), Transition::Revert);
        assert_eq!(Transition::resolve(Accepted, Accepted).unwrap(), Transition::Unchanged);

        assert!(matches!(
            Transition::resolve(Rejected, Pending),
            Err(AccordError::InvalidTransition { .. })
        ));
        assert!(matches!(
            Transition::resolve(Accepted, Rejected),
            Err(AccordError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_retry_policy_retries_only_conflicts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(1),
        };

        let calls = Cell::new(0);
        let result: Result<(), AccordError> = policy.run(|_| {
            calls.set(calls.get() + 1);
            Err(AccordError::Conflict("lost race".into()))
        });
        assert!(matches!(result, Err(AccordError::Conflict(_))));
        assert_eq!(calls.get(), 3);

        calls.set(0);
        let result: Result<(), AccordError> = policy.run(|_| {
            calls.set(calls.get() + 1);
            Err(AccordError::Forbidden("own proposal".into()))
        });
        assert!(matches!(result, Err(AccordError::Forbidden(_))));
        assert_eq!(calls.get(), 1);

        let result = policy.run(|attempt| {
            if attempt < 2 {
                Err(AccordError::Conflict("lost race".into()))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_backoff_doubles_then_saturates() {
        let policy = RetryPolicy {
            max_attempts: 100,
            base_backoff: Duration::from_millis(25),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(25));
        assert_eq!(policy.backoff(2), Duration::from_millis(50));
        assert_eq!(policy.backoff(3), Duration::from_millis(100));

        let capped = policy.backoff(11);
        assert_eq!(capped, Duration::from_millis(25 * 1024));
        assert_eq!(policy.backoff(40), capped);
        assert_eq!(policy.backoff(u32::MAX), capped);

        let huge = RetryPolicy {
            max_attempts: 100,
            base_backoff: Duration::MAX,
        };
        assert_eq!(huge.backoff(5), Duration::MAX);
    }

    #[test]
    fn test_accept_stamps_validator() {
        let f = Fixture::new();
        let goal = f.submit("bob", ProposalType::Goal, "Deliver MVP");

        let decision = f
            .decide(&Caller::participant("alice"), &goal.id, ProposalStatus::Accepted)
            .unwrap();

        assert!(decision.changed);
        assert_eq!(decision.previous, ProposalStatus::Pending);
        assert_eq!(decision.proposal.status, proposal_statuses::ACCEPTED);
        assert_eq!(decision.proposal.validator_id.as_deref(), Some("alice"));
        assert!(decision.proposal.decided_at.is_some());
    }

    #[test]
    fn test_proposer_cannot_decide_own_proposal() {
        let f = Fixture::new();
        let own = f.submit("alice", ProposalType::Budget, "100");

        let err = f
            .decide(&Caller::participant("alice"), &own.id, ProposalStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, AccordError::Forbidden(_)));
        assert_eq!(f.status_of(&own.id), proposal_statuses::PENDING);

        f.decide(&Caller::arbiter("carol"), &own.id, ProposalStatus::Accepted)
            .unwrap();
        assert_eq!(f.status_of(&own.id), proposal_statuses::ACCEPTED);
    }

    #[test]
    fn test_non_arbiter_is_forbidden() {
        let f = Fixture::new();
        let goal = f.submit("bob", ProposalType::Goal, "Deliver MVP");

        let err = f
            .decide(&Caller::participant("eve"), &goal.id, ProposalStatus::Rejected)
            .unwrap_err();
        assert!(matches!(err, AccordError::Forbidden(_)));
    }

    #[test]
    fn test_singleton_accept_retires_winner_and_pending_siblings() {
        let f = Fixture::new();
        let first = f.submit("bob", ProposalType::EndDate, "2025-06-30");
        let second = f.submit("eve", ProposalType::EndDate, "2025-07-31");
        let third = f.submit("eve", ProposalType::EndDate, "2025-08-31");
        let admin = Caller::participant("alice");

        let decision = f
            .decide(&admin, &first.id, ProposalStatus::Accepted)
            .unwrap();
        let mut retired = decision.retired.clone();
        retired.sort();
        let mut expected = vec![second.id.clone(), third.id.clone()];
        expected.sort();
        assert_eq!(retired, expected);

        let decision = f
            .decide(&admin, &second.id, ProposalStatus::Accepted)
            .unwrap();
        assert_eq!(decision.retired, vec![first.id.clone()]);
        assert_eq!(decision.previous, ProposalStatus::Rejected);

        assert_eq!(f.status_of(&first.id), proposal_statuses::REJECTED);
        assert_eq!(f.status_of(&second.id), proposal_statuses::ACCEPTED);
        assert_eq!(f.status_of(&third.id), proposal_statuses::REJECTED);
    }

    #[test]
    fn test_goal_accept_retires_nothing() {
        let f = Fixture::new();
        let a = f.submit("bob", ProposalType::Goal, "Deliver MVP");
        let b = f.submit("eve", ProposalType::Goal, "Write docs");
        let admin = Caller::participant("alice");

        f.decide(&admin, &a.id, ProposalStatus::Accepted).unwrap();
        let decision = f.decide(&admin, &b.id, ProposalStatus::Accepted).unwrap();

        assert!(decision.retired.is_empty());
        assert_eq!(f.status_of(&a.id), proposal_statuses::ACCEPTED);
    }

    #[test]
    fn test_repeat_accept_is_a_no_op() {
        let f = Fixture::new();
        let budget = f.submit("bob", ProposalType::Budget, "1000.00");
        let admin = Caller::participant("alice");

        let first = f.decide(&admin, &budget.id, ProposalStatus::Accepted).unwrap();
        let again = f.decide(&admin, &budget.id, ProposalStatus::Accepted).unwrap();

        assert!(!again.changed);
        assert_eq!(again.proposal, first.proposal);
    }

    #[test]
    fn test_revert_clears_stamp() {
        let f = Fixture::new();
        let goal = f.submit("bob", ProposalType::Goal, "Deliver MVP");
        let admin = Caller::participant("alice");

        f.decide(&admin, &goal.id, ProposalStatus::Accepted).unwrap();
        let reverted = f.decide(&admin, &goal.id, ProposalStatus::Pending).unwrap();

        assert_eq!(reverted.proposal.status, proposal_statuses::PENDING);
        assert!(reverted.proposal.validator_id.is_none());
        assert!(reverted.proposal.decided_at.is_none());
    }

    #[test]
    fn test_rejected_cannot_return_to_pending() {
        let f = Fixture::new();
        let goal = f.submit("bob", ProposalType::Goal, "Deliver MVP");
        let admin = Caller::participant("alice");

        f.decide(&admin, &goal.id, ProposalStatus::Rejected).unwrap();
        let err = f
            .decide(&admin, &goal.id, ProposalStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, AccordError::InvalidTransition { .. }));
    }

    #[test]
    fn test_missing_proposal() {
        let f = Fixture::new();
        let err = f
            .decide(&Caller::arbiter("carol"), "nope", ProposalStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, AccordError::NotFound(_)));
    }
}
