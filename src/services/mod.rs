//! Service layer for accord
//!
//! Services sit between HTTP handlers and the store. Each wraps database
//! operations with:
//! - Input validation at the boundary
//! - Routing of status changes through the enforcer and activation gate
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (lifecycle API)
//!     ↓
//! Enforcer / Consolidator / Gate
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```
//!
//! Service calls block on SQLite; async callers run them on
//! `tokio::task::spawn_blocking`.

pub mod response;
pub mod events;
pub mod proposal_service;
pub mod project_service;

// Re-exports
pub use response::*;
pub use events::{spawn_logging_listener, EventBus, EventListener, NegotiationEvent};
pub use proposal_service::{DecisionReport, ProposalService};
pub use project_service::ProjectService;

use crate::db::AccordDb;
use crate::enforcer::{Enforcer, RetryPolicy};
use std::sync::Arc;

/// Service container for dependency injection
///
/// Holds all services with a shared database pool and event bus.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub proposals: Arc<ProposalService>,
    pub projects: Arc<ProjectService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<AccordDb>, retry: RetryPolicy) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            proposals: Arc::new(ProposalService::new(
                db.clone(),
                Enforcer::new(retry),
                events.clone(),
            )),
            projects: Arc::new(ProjectService::new(db, events.clone())),
            events,
        }
    }
}
