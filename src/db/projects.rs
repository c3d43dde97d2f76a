//! Project record operations
//!
//! Project CRUD belongs to an external collaborator; this module keeps only
//! what the negotiation core needs: create, read, cascade delete, and the two
//! status writes performed by the activation gate.

use diesel::prelude::*;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::diesel_schema::{projects, proposals};
use super::models::{current_timestamp, project_statuses, NewProject, Project};
use crate::error::AccordError;

/// Input for creating a project
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Negotiated fields written on activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedFields {
    pub budget: String,
    pub start_date: String,
    pub end_date: String,
}

/// Create a pending project administered by `administrator_id`
pub fn create_project(
    conn: &mut SqliteConnection,
    administrator_id: &str,
    input: &CreateProjectInput,
) -> Result<Project, AccordError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    let new_project = NewProject {
        id: &id,
        title: &input.title,
        description: input.description.as_deref(),
        administrator_id,
        status: project_statuses::PENDING,
        created_at: &now,
        updated_at: &now,
    };

    diesel::insert_into(projects::table)
        .values(&new_project)
        .execute(conn)
        .map_err(|e| AccordError::Database(format!("Failed to create project: {}", e)))?;

    debug!("Created project {} administered by {}", id, administrator_id);

    get_project(conn, &id)
}

/// Get a project by ID
pub fn get_project(conn: &mut SqliteConnection, id: &str) -> Result<Project, AccordError> {
    projects::table
        .find(id)
        .select(Project::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AccordError::NotFound(format!("project {}", id)))
}

/// Count all projects
pub fn count_projects(conn: &mut SqliteConnection) -> Result<i64, AccordError> {
    projects::table
        .count()
        .get_result(conn)
        .map_err(|e| AccordError::Database(format!("Failed to count projects: {}", e)))
}

/// Delete a project and every proposal it owns. Returns the number of
/// proposals removed.
pub fn delete_project(conn: &mut SqliteConnection, id: &str) -> Result<usize, AccordError> {
    conn.immediate_transaction(|conn| {
        let removed = diesel::delete(proposals::table.filter(proposals::project_id.eq(id)))
            .execute(conn)?;

        let deleted = diesel::delete(projects::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(AccordError::NotFound(format!("project {}", id)));
        }

        debug!("Deleted project {} with {} proposals", id, removed);
        Ok(removed)
    })
}

/// Write the negotiated fields and flip pending -> active.
///
/// Returns the number of rows changed: 0 means the project left `pending`
/// concurrently.
pub fn mark_active(
    conn: &mut SqliteConnection,
    id: &str,
    fields: &NegotiatedFields,
) -> Result<usize, AccordError> {
    let now = current_timestamp();

    diesel::update(
        projects::table
            .filter(projects::id.eq(id))
            .filter(projects::status.eq(project_statuses::PENDING)),
    )
    .set((
        projects::budget.eq(Some(fields.budget.as_str())),
        projects::start_date.eq(Some(fields.start_date.as_str())),
        projects::end_date.eq(Some(fields.end_date.as_str())),
        projects::status.eq(project_statuses::ACTIVE),
        projects::activated_at.eq(Some(now.as_str())),
        projects::updated_at.eq(&now),
    ))
    .execute(conn)
    .map_err(AccordError::from)
}

/// Flip pending -> rejected. Returns the number of rows changed.
pub fn mark_rejected(conn: &mut SqliteConnection, id: &str) -> Result<usize, AccordError> {
    let now = current_timestamp();

    diesel::update(
        projects::table
            .filter(projects::id.eq(id))
            .filter(projects::status.eq(project_statuses::PENDING)),
    )
    .set((
        projects::status.eq(project_statuses::REJECTED),
        projects::updated_at.eq(&now),
    ))
    .execute(conn)
    .map_err(AccordError::from)
}
