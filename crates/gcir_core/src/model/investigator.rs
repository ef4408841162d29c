//! Internal and external investigator models.
//!
//! # Responsibility
//! - Define the two investigator pools a proposal can draw from.
//!
//! # Invariants
//! - Internal investigators carry a pre-assigned PSRN; the core never
//!   generates PSRNs.
//! - External investigator codes (`E0001`, ...) are minted once at creation
//!   unless the caller supplies one explicitly.

use crate::model::catalog::DepartmentId;
use crate::model::{require_non_blank, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type InvestigatorId = Uuid;
pub type ExternalInvestigatorId = Uuid;

/// Faculty member of an internal department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investigator {
    pub uuid: InvestigatorId,
    /// Personnel serial, assigned upstream and unique across the institute.
    pub psrn: String,
    pub name: String,
    pub email: Option<String>,
    pub department_uuid: DepartmentId,
}

impl Investigator {
    pub fn new(
        psrn: impl Into<String>,
        name: impl Into<String>,
        department_uuid: DepartmentId,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            psrn: psrn.into(),
            name: name.into(),
            email: None,
            department_uuid,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank(&self.psrn, "investigator", "psrn")?;
        require_non_blank(&self.name, "investigator", "name")
    }
}

/// Collaborator outside the institute, identified by an allocated `E`-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalInvestigator {
    pub uuid: ExternalInvestigatorId,
    /// Allocated code, e.g. `E0001`.
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub designation: Option<String>,
}

/// Creation request for an external investigator.
///
/// `code: None` asks the repository to allocate the next `E`-code inside the
/// insert transaction; an explicit code is trusted as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewExternalInvestigator {
    pub code: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub designation: Option<String>,
}

impl NewExternalInvestigator {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank(&self.name, "external investigator", "name")?;
        if let Some(code) = &self.code {
            require_non_blank(code, "external investigator", "code")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Investigator, NewExternalInvestigator};
    use crate::model::ValidationError;
    use uuid::Uuid;

    #[test]
    fn investigator_requires_psrn_and_name() {
        let missing_psrn = Investigator::new("", "Dr. Alice", Uuid::new_v4());
        assert!(matches!(
            missing_psrn.validate(),
            Err(ValidationError::EmptyField { field: "psrn", .. })
        ));

        let valid = Investigator::new("G0001", "Dr. Alice", Uuid::new_v4());
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn external_rejects_blank_explicit_code() {
        let mut request = NewExternalInvestigator::named("Prof. David Kumar");
        request.code = Some("   ".to_string());
        assert!(matches!(
            request.validate(),
            Err(ValidationError::EmptyField { field: "code", .. })
        ));
    }
}
