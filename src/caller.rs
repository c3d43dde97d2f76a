//! Caller identity passed to every lifecycle operation
//!
//! Identity and role are resolved upstream (authentication is not this
//! crate's job). Operations receive them explicitly instead of reading any
//! ambient session state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::models::Project;
use crate::error::AccordError;

/// Role resolved for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Participant,
    Arbiter,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Participant => "participant",
            Role::Arbiter => "arbiter",
        }
    }
}

impl FromStr for Role {
    type Err = AccordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "participant" => Ok(Role::Participant),
            "arbiter" => Ok(Role::Arbiter),
            other => Err(AccordError::InvalidArgument(format!("Unknown role: {}", other))),
        }
    }
}

/// The user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn participant(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Participant)
    }

    pub fn arbiter(user_id: impl Into<String>) -> Self {
        Self::new(user_id, Role::Arbiter)
    }

    /// Arbiters and the project's administrator may decide its proposals
    pub fn may_arbitrate(&self, project: &Project) -> bool {
        self.role == Role::Arbiter || project.administrator_id == self.user_id
    }

    pub fn is(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Caller({}, {})", self.user_id, self.role.as_str())
    }
}
