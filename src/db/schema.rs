//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::AccordError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct SchemaVersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), AccordError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
pub fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, AccordError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| AccordError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let row = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<SchemaVersionRow>(conn)
        .optional()
        .map_err(|e| AccordError::Database(format!("Failed to read schema_version: {}", e)))?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), AccordError> {
    conn.batch_execute("DELETE FROM schema_version")
        .map_err(|e| AccordError::Database(format!("Failed to clear schema_version: {}", e)))?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<Integer, _>(version)
        .execute(conn)
        .map_err(|e| AccordError::Database(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), AccordError> {
    conn.batch_execute(PROJECTS_SCHEMA)
        .map_err(|e| AccordError::Database(format!("Failed to create projects table: {}", e)))?;

    conn.batch_execute(PROPOSALS_SCHEMA)
        .map_err(|e| AccordError::Database(format!("Failed to create proposals table: {}", e)))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| AccordError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), AccordError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)
}

/// Project record. Negotiated fields stay NULL until activation.
const PROJECTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    administrator_id TEXT NOT NULL,

    -- Written only by activation, from the accepted proposals
    budget TEXT,        -- fixed point, 8 digits with 2 after the point
    start_date TEXT,    -- YYYY-MM-DD
    end_date TEXT,      -- YYYY-MM-DD

    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'active', 'completed', 'rejected', 'canceled')),
    activated_at TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Proposal store
const PROPOSALS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS proposals (
    id TEXT PRIMARY KEY NOT NULL,
    -- Insertion order; ids are random so they cannot break ordering ties
    seq INTEGER NOT NULL UNIQUE,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    proposal_type TEXT NOT NULL
        CHECK (proposal_type IN ('goal', 'start_date', 'end_date', 'budget')),
    value TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'accepted', 'rejected')),
    proposer_id TEXT NOT NULL,
    validator_id TEXT,
    decided_at TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    -- Each half of the decision stamp is present exactly when the proposal is decided
    CHECK ((status = 'pending') = (validator_id IS NULL)
       AND (status = 'pending') = (decided_at IS NULL))
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_proposals_project_type ON proposals(project_id, proposal_type);
CREATE INDEX IF NOT EXISTS idx_proposals_project_status ON proposals(project_id, status);

-- At most one accepted proposal per singleton dimension
CREATE UNIQUE INDEX IF NOT EXISTS idx_proposals_single_accepted
    ON proposals(project_id, proposal_type)
    WHERE status = 'accepted' AND proposal_type <> 'goal';
"#;
