//! Accord - proposal negotiation and contract consolidation
//!
//! Participants propose values for the negotiable dimensions of a project
//! (goals, start date, end date, budget); an arbiter who did not make the
//! proposal accepts or rejects it. Accepted proposals form the project's
//! contract, and a project may only be activated once that contract is
//! complete.
//!
//! ## Architecture
//!
//! - **Proposal Store** (`db`): SQLite via diesel, projects and proposals
//! - **Mutual-Exclusion Enforcer** (`enforcer`): the only writer of proposal
//!   status; at most one accepted proposal per singleton dimension
//! - **Contract Consolidator** (`contract`): accepted proposals grouped by
//!   dimension, always read fresh
//! - **Activation Gate** (`gate`): completeness check and the pending ->
//!   active / rejected moves
//! - **Lifecycle API** (`services`, `http`): validation, identity, events
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/accord/
//! ├── accord.db              # SQLite database (WAL mode)
//! └── config.toml            # Configuration
//! ```

pub mod caller;
pub mod config;
pub mod contract;
pub mod db;
pub mod enforcer;
pub mod error;
pub mod gate;
pub mod http;
pub mod services;
pub mod value;
pub mod views;

pub use caller::{Caller, Role};
pub use config::Config;
pub use contract::ContractSnapshot;
pub use db::{AccordDb, Project, Proposal, ProposalQuery};
pub use enforcer::{Decision, Enforcer, RetryPolicy};
pub use error::AccordError;
pub use http::HttpServer;
pub use services::{DecisionReport, EventBus, NegotiationEvent, Services};
pub use value::{ProposalStatus, ProposalType, ProposalValue};
