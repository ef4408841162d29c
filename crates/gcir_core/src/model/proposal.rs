//! Proposal domain model.
//!
//! # Responsibility
//! - Define the proposal record and its creation request.
//! - Provide lifecycle status mapping to/from stored values.
//!
//! # Invariants
//! - `gcir_code` is minted once at creation and never regenerated.
//! - `end_date` must not precede `start_date` when both are set.

use crate::model::catalog::{DepartmentId, FundingAgencyId, ProjectTypeId};
use crate::model::{require_non_blank, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ProposalId = Uuid;

/// Proposal lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Draft,
    Permission,
    Submitted,
    Review,
    Approved,
    Disbursed,
    Rejected,
    Closed,
    OnHold,
}

impl ProposalStatus {
    pub(crate) fn to_db(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Permission => "PERMISSION",
            Self::Submitted => "SUBMITTED",
            Self::Review => "REVIEW",
            Self::Approved => "APPROVED",
            Self::Disbursed => "DISBURSED",
            Self::Rejected => "REJECTED",
            Self::Closed => "CLOSED",
            Self::OnHold => "ON_HOLD",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "DRAFT" => Some(Self::Draft),
            "PERMISSION" => Some(Self::Permission),
            "SUBMITTED" => Some(Self::Submitted),
            "REVIEW" => Some(Self::Review),
            "APPROVED" => Some(Self::Approved),
            "DISBURSED" => Some(Self::Disbursed),
            "REJECTED" => Some(Self::Rejected),
            "CLOSED" => Some(Self::Closed),
            "ON_HOLD" => Some(Self::OnHold),
            _ => None,
        }
    }
}

/// Persisted proposal read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub uuid: ProposalId,
    /// Unique GCIR code, e.g. `G-2025-CS-IND-0001`. Immutable after mint.
    pub gcir_code: String,
    pub title: String,
    pub department_uuid: DepartmentId,
    pub project_type_uuid: ProjectTypeId,
    pub funding_agency_uuid: Option<FundingAgencyId>,
    pub status: ProposalStatus,
    pub application_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sanction_letter_number: Option<String>,
    /// Epoch milliseconds, maintained by the store.
    pub created_at: i64,
    /// Epoch milliseconds, maintained by the store.
    pub updated_at: i64,
}

impl Proposal {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank(&self.title, "proposal", "title")?;
        check_date_range(self.start_date, self.end_date)
    }
}

/// Creation request for a proposal.
///
/// Partition components are referenced by catalog code, matching the code
/// prefix they produce. `gcir_code: None` asks the repository to allocate
/// the next code inside the insert transaction; an explicit code is trusted
/// as-is and never overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProposal {
    pub gcir_code: Option<String>,
    pub title: String,
    pub department_code: String,
    pub project_type_code: String,
    pub funding_agency_code: Option<String>,
    /// Explicit allocation year. Overrides `application_date` and the
    /// current calendar year.
    pub year: Option<i32>,
    pub status: ProposalStatus,
    pub application_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sanction_letter_number: Option<String>,
}

impl NewProposal {
    /// Creates a draft request for the given partition.
    pub fn draft(
        title: impl Into<String>,
        department_code: impl Into<String>,
        project_type_code: impl Into<String>,
    ) -> Self {
        Self {
            gcir_code: None,
            title: title.into(),
            department_code: department_code.into(),
            project_type_code: project_type_code.into(),
            funding_agency_code: None,
            year: None,
            status: ProposalStatus::Draft,
            application_date: None,
            start_date: None,
            end_date: None,
            sanction_letter_number: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank(&self.title, "proposal", "title")?;
        if let Some(code) = &self.gcir_code {
            require_non_blank(code, "proposal", "gcir_code")?;
        }
        check_date_range(self.start_date, self.end_date)
    }
}

fn check_date_range(
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if end < start {
            return Err(ValidationError::DateRangeInverted);
        }
    }
    Ok(())
}
