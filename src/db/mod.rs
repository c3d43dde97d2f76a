//! SQLite database module for the proposal store and project records
//!
//! ## Architecture
//!
//! - Diesel over SQLite, connections handed out by an r2d2 pool
//! - Status-changing writes run in `BEGIN IMMEDIATE` transactions, which
//!   take SQLite's write lock up front so concurrent decisions serialize
//! - A partial unique index backs the one-accepted-singleton rule
//!
//! ## Tables
//!
//! - `projects` - Project record with the negotiated fields (NULL until activation)
//! - `proposals` - Every proposal ever submitted, with decision stamp

pub mod schema;
pub mod diesel_schema;
pub mod models;
pub mod projects;
pub mod proposals;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AccordError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection SQLite settings applied when the pool opens a connection
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub busy_timeout: Duration,
    pub enable_wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        (|| -> QueryResult<()> {
            conn.batch_execute(&format!(
                "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
                self.busy_timeout.as_millis()
            ))?;
            if self.enable_wal {
                conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
            }
            Ok(())
        })()
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database holding projects and proposals
pub struct AccordDb {
    pool: DbPool,
}

impl AccordDb {
    /// Open or create the database file configured in `config`
    pub fn open(config: &Config) -> Result<Self, AccordError> {
        let db_path = config.database_path();
        info!("Opening SQLite database at {:?}", db_path);

        Self::open_at(
            &db_path,
            config.pool_size,
            ConnectionOptions {
                busy_timeout: Duration::from_millis(config.busy_timeout_ms),
                enable_wal: true,
            },
        )
    }

    /// Open a database file with explicit pool settings
    pub fn open_at(
        db_path: &Path,
        pool_size: u32,
        options: ConnectionOptions,
    ) -> Result<Self, AccordError> {
        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(options))
            .build(manager)
            .map_err(|e| AccordError::Pool(format!("Failed to open SQLite pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Each SQLite in-memory connection is its own database, so the pool is
    /// capped at one connection that is never recycled.
    pub fn open_in_memory() -> Result<Self, AccordError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout: Duration::from_millis(1000),
                enable_wal: false,
            }))
            .build(manager)
            .map_err(|e| AccordError::Pool(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), AccordError> {
        let mut conn = self.conn()?;
        schema::init_schema(&mut conn)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<PooledConn, AccordError> {
        self.pool
            .get()
            .map_err(|e| AccordError::Pool(format!("Failed to get connection: {}", e)))
    }

    /// Run `f` with a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AccordError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, AccordError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, AccordError> {
        self.with_conn(|conn| {
            let project_count = projects::count_projects(conn)?;
            let by_status = proposals::count_by_status(conn, None)?;

            Ok(DbStats {
                project_count: project_count as u64,
                pending_proposals: by_status.get(models::proposal_statuses::PENDING).copied().unwrap_or(0) as u64,
                accepted_proposals: by_status.get(models::proposal_statuses::ACCEPTED).copied().unwrap_or(0) as u64,
                rejected_proposals: by_status.get(models::proposal_statuses::REJECTED).copied().unwrap_or(0) as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub project_count: u64,
    pub pending_proposals: u64,
    pub accepted_proposals: u64,
    pub rejected_proposals: u64,
}

// Re-exports
pub use models::{Project, Proposal};
pub use projects::CreateProjectInput;
pub use proposals::ProposalQuery;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_stats_start_empty() {
        let db = AccordDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.project_count, 0);
        assert_eq!(stats.pending_proposals, 0);
    }

    #[test]
    fn test_in_memory_connection_is_never_recycled() {
        let db = AccordDb::open_in_memory().unwrap();
        assert_eq!(db.pool.max_size(), 1);
        assert_eq!(db.pool.max_lifetime(), None);
        assert_eq!(db.pool.idle_timeout(), None);

        db.with_conn(|conn| {
            projects::create_project(
                conn,
                "alice",
                &CreateProjectInput {
                    title: "Garden".into(),
                    description: None,
                },
            )
        })
        .unwrap();
        assert_eq!(db.stats().unwrap().project_count, 1);
    }

    #[test]
    fn test_file_database_reopens_with_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accord.db");
        let options = ConnectionOptions {
            busy_timeout: Duration::from_millis(500),
            enable_wal: true,
        };

        {
            let db = AccordDb::open_at(&path, 2, options.clone()).unwrap();
            let version = db.with_conn(schema::get_schema_version).unwrap();
            assert_eq!(version, schema::SCHEMA_VERSION);
        }

        let db = AccordDb::open_at(&path, 2, options).unwrap();
        assert_eq!(db.stats().unwrap().project_count, 0);
    }
}
