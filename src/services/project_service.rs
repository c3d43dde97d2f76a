//! Project service - project record, contract reads, and the activation gate

use std::sync::Arc;

use crate::caller::Caller;
use crate::contract::{self, ContractSnapshot};
use crate::db::models::Project;
use crate::db::{projects, AccordDb, CreateProjectInput, DbStats};
use crate::error::AccordError;
use crate::gate;

use super::events::{EventBus, NegotiationEvent};

/// Longest project title accepted
const MAX_TITLE_CHARS: usize = 200;

/// Project service
pub struct ProjectService {
    db: Arc<AccordDb>,
    events: Arc<EventBus>,
}

impl ProjectService {
    /// Create a new project service
    pub fn new(db: Arc<AccordDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get project by ID
    pub fn get(&self, id: &str) -> Result<Project, AccordError> {
        self.db.with_conn(|conn| projects::get_project(conn, id))
    }

    /// Current contract snapshot of a project
    pub fn contract(&self, id: &str) -> Result<ContractSnapshot, AccordError> {
        self.db.with_conn(|conn| contract::snapshot(conn, id))
    }

    /// Store statistics
    pub fn stats(&self) -> Result<DbStats, AccordError> {
        self.db.stats()
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a pending project administered by `caller`
    pub fn create(&self, caller: &Caller, input: CreateProjectInput) -> Result<Project, AccordError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AccordError::InvalidArgument("title must not be empty".into()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(AccordError::InvalidArgument(format!(
                "title must be at most {} characters",
                MAX_TITLE_CHARS
            )));
        }

        let input = CreateProjectInput {
            title: title.to_string(),
            description: input.description,
        };
        let project = self
            .db
            .with_conn(|conn| projects::create_project(conn, &caller.user_id, &input))?;

        self.events.emit(NegotiationEvent::ProjectCreated {
            id: project.id.clone(),
            administrator_id: project.administrator_id.clone(),
        });

        Ok(project)
    }

    /// Delete a project and its proposals. Administrator only.
    pub fn delete(&self, caller: &Caller, id: &str) -> Result<(), AccordError> {
        let removed = self.db.with_conn(|conn| {
            let project = projects::get_project(conn, id)?;
            if !caller.is(&project.administrator_id) {
                return Err(AccordError::Forbidden(format!(
                    "only the administrator may delete project {}",
                    id
                )));
            }
            projects::delete_project(conn, id)
        })?;

        self.events.emit(NegotiationEvent::ProjectDeleted {
            id: id.to_string(),
            proposals_removed: removed,
        });

        Ok(())
    }

    /// Activate the project if its contract is complete
    pub fn activate(&self, caller: &Caller, id: &str) -> Result<Project, AccordError> {
        let project = self.db.with_conn(|conn| gate::activate(conn, caller, id))?;

        self.events.emit(NegotiationEvent::ProjectActivated {
            id: project.id.clone(),
        });

        Ok(project)
    }

    /// Reject the project, ending negotiation
    pub fn reject(&self, caller: &Caller, id: &str) -> Result<Project, AccordError> {
        let project = self.db.with_conn(|conn| gate::reject(conn, caller, id))?;

        self.events.emit(NegotiationEvent::ProjectRejected {
            id: project.id.clone(),
        });

        Ok(project)
    }
}
