//! Proposal types, statuses, and the typed proposal value
//!
//! The store persists a proposal's value as text. At the API boundary the
//! text is parsed into a [`ProposalValue`] according to the proposal type, so
//! a malformed date or budget never reaches the database.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AccordError;

/// Longest goal text accepted
pub const MAX_GOAL_CHARS: usize = 2000;

/// Budget precision: 8 significant digits, 2 of them after the point
pub const BUDGET_FRACTION_DIGITS: u32 = 2;
pub const BUDGET_INTEGER_DIGITS: usize = 6;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Proposal Type (negotiable dimension)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    Goal,
    StartDate,
    EndDate,
    Budget,
}

impl ProposalType {
    pub const ALL: [ProposalType; 4] = [
        ProposalType::Goal,
        ProposalType::StartDate,
        ProposalType::EndDate,
        ProposalType::Budget,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalType::Goal => "goal",
            ProposalType::StartDate => "start_date",
            ProposalType::EndDate => "end_date",
            ProposalType::Budget => "budget",
        }
    }

    /// Singleton dimensions hold at most one accepted proposal per project
    pub fn is_singleton(&self) -> bool {
        !matches!(self, ProposalType::Goal)
    }
}

impl fmt::Display for ProposalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalType {
    type Err = AccordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goal" => Ok(ProposalType::Goal),
            "start_date" => Ok(ProposalType::StartDate),
            "end_date" => Ok(ProposalType::EndDate),
            "budget" => Ok(ProposalType::Budget),
            other => Err(AccordError::InvalidArgument(format!(
                "Unknown proposal type: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Proposal Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
        }
    }

    pub fn is_decided(&self) -> bool {
        !matches!(self, ProposalStatus::Pending)
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = AccordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProposalStatus::Pending),
            "accepted" => Ok(ProposalStatus::Accepted),
            "rejected" => Ok(ProposalStatus::Rejected),
            other => Err(AccordError::InvalidArgument(format!(
                "Unknown proposal status: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Typed Value
// ============================================================================

/// A proposal value, validated against its dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalValue {
    Goal(String),
    StartDate(NaiveDate),
    EndDate(NaiveDate),
    Budget(Decimal),
}

impl ProposalValue {
    /// Parse raw text for the given dimension, rejecting malformed values
    pub fn parse(kind: ProposalType, raw: &str) -> Result<Self, AccordError> {
        if raw.trim().is_empty() {
            return Err(AccordError::InvalidArgument(format!(
                "{} value must not be empty",
                kind
            )));
        }

        match kind {
            ProposalType::Goal => {
                if raw.chars().count() > MAX_GOAL_CHARS {
                    return Err(AccordError::InvalidArgument(format!(
                        "goal must be at most {} characters",
                        MAX_GOAL_CHARS
                    )));
                }
                Ok(ProposalValue::Goal(raw.to_string()))
            }
            ProposalType::StartDate => parse_date(raw).map(ProposalValue::StartDate),
            ProposalType::EndDate => parse_date(raw).map(ProposalValue::EndDate),
            ProposalType::Budget => parse_budget(raw).map(ProposalValue::Budget),
        }
    }

    pub fn kind(&self) -> ProposalType {
        match self {
            ProposalValue::Goal(_) => ProposalType::Goal,
            ProposalValue::StartDate(_) => ProposalType::StartDate,
            ProposalValue::EndDate(_) => ProposalType::EndDate,
            ProposalValue::Budget(_) => ProposalType::Budget,
        }
    }

    /// Canonical text, as written to the project record on activation
    pub fn canonical_text(&self) -> String {
        match self {
            ProposalValue::Goal(text) => text.clone(),
            ProposalValue::StartDate(d) | ProposalValue::EndDate(d) => {
                d.format(DATE_FORMAT).to_string()
            }
            ProposalValue::Budget(amount) => format_budget(amount),
        }
    }

    pub fn as_budget(&self) -> Option<Decimal> {
        match self {
            ProposalValue::Budget(amount) => Some(*amount),
            _ => None,
        }
    }
}

/// Budget in canonical fixed-point form, e.g. `1000.00`
pub fn format_budget(amount: &Decimal) -> String {
    let mut canonical = *amount;
    canonical.rescale(BUDGET_FRACTION_DIGITS);
    canonical.to_string()
}

fn parse_date(raw: &str) -> Result<NaiveDate, AccordError> {
    // chrono tolerates unpadded fields, ISO calendar dates are exactly 10 chars
    if raw.len() != 10 {
        return Err(AccordError::InvalidArgument(format!(
            "Expected a YYYY-MM-DD date, got: {}",
            raw
        )));
    }

    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        AccordError::InvalidArgument(format!("Invalid calendar date {}: {}", raw, e))
    })
}

fn parse_budget(raw: &str) -> Result<Decimal, AccordError> {
    let invalid = |reason: &str| {
        AccordError::InvalidArgument(format!("Invalid budget {}: {}", raw, reason))
    };

    let (integer, fraction) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw, None),
    };

    if integer.is_empty() || !integer.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected a non-negative decimal number"));
    }

    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected digits after the decimal point"));
        }
        if fraction.len() > BUDGET_FRACTION_DIGITS as usize {
            return Err(invalid("at most 2 fraction digits allowed"));
        }
    }

    let significant = integer.trim_start_matches('0');
    if significant.len() > BUDGET_INTEGER_DIGITS {
        return Err(invalid("exceeds 8 significant digits"));
    }

    Decimal::from_str(raw).map_err(|e| invalid(&e.to_string()))
}
