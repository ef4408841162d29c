//! Investigator role assignments and the PI-count rule.
//!
//! # Responsibility
//! - Define the proposal/investigator join model.
//! - Provide the pure "exactly one PI" rule applied by the enforcer.
//!
//! # Invariants
//! - `InvestigatorRef` is a tagged variant: an assignment referencing
//!   neither or both investigator kinds cannot be constructed.
//! - Co-PI count is never constrained.

use crate::model::investigator::{ExternalInvestigatorId, InvestigatorId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Role an investigator plays on one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigatorRole {
    Pi,
    CoPi,
}

impl InvestigatorRole {
    pub(crate) fn to_db(self) -> &'static str {
        match self {
            Self::Pi => "PI",
            Self::CoPi => "CO_PI",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "PI" => Some(Self::Pi),
            "CO_PI" => Some(Self::CoPi),
            _ => None,
        }
    }
}

/// Reference to exactly one investigator, internal or external.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "uuid", rename_all = "snake_case")]
pub enum InvestigatorRef {
    Internal(InvestigatorId),
    External(ExternalInvestigatorId),
}

impl Display for InvestigatorRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal(uuid) => write!(f, "internal:{uuid}"),
            Self::External(uuid) => write!(f, "external:{uuid}"),
        }
    }
}

/// One investigator's involvement on one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub investigator: InvestigatorRef,
    pub role: InvestigatorRole,
}

impl RoleAssignment {
    pub fn pi(investigator: InvestigatorRef) -> Self {
        Self {
            investigator,
            role: InvestigatorRole::Pi,
        }
    }

    pub fn co_pi(investigator: InvestigatorRef) -> Self {
        Self {
            investigator,
            role: InvestigatorRole::CoPi,
        }
    }
}

/// Violation of the "exactly one PI" aggregate rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiViolation {
    /// No assignment with role PI exists.
    Missing,
    /// More than one assignment with role PI exists.
    Multiple { count: u32 },
}

impl Display for PiViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(
                f,
                "proposal must have exactly one Principal Investigator (PI)"
            ),
            Self::Multiple { count } => write!(
                f,
                "proposal can have only one Principal Investigator (PI), found {count}"
            ),
        }
    }
}

impl Error for PiViolation {}

/// Applies the "exactly one PI" rule to a persisted PI-assignment count.
pub fn check_pi_count(count: u32) -> Result<(), PiViolation> {
    match count {
        1 => Ok(()),
        0 => Err(PiViolation::Missing),
        more => Err(PiViolation::Multiple { count: more }),
    }
}

#[cfg(test)]
mod tests {
    use super::{check_pi_count, InvestigatorRole, PiViolation};

    #[test]
    fn exactly_one_pi_passes() {
        assert!(check_pi_count(1).is_ok());
    }

    #[test]
    fn zero_and_many_pis_are_distinct_violations() {
        assert_eq!(check_pi_count(0), Err(PiViolation::Missing));
        assert_eq!(check_pi_count(2), Err(PiViolation::Multiple { count: 2 }));

        let missing = check_pi_count(0).unwrap_err().to_string();
        let multiple = check_pi_count(3).unwrap_err().to_string();
        assert!(missing.contains("must have exactly one"));
        assert!(multiple.contains("only one"));
    }

    #[test]
    fn role_round_trips_through_db_form() {
        for role in [InvestigatorRole::Pi, InvestigatorRole::CoPi] {
            assert_eq!(InvestigatorRole::parse(role.to_db()), Some(role));
        }
        assert_eq!(InvestigatorRole::parse("ADVISOR"), None);
    }
}
