//! Catalog entities that define GCIR code partitions.
//!
//! # Responsibility
//! - Define departments, project types and funding agencies.
//!
//! # Invariants
//! - Catalog codes are unique, non-blank and free of `-`/whitespace, so the
//!   code prefix built from them identifies exactly one partition.

use crate::model::{require_code_shape, require_non_blank, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type DepartmentId = Uuid;
pub type ProjectTypeId = Uuid;
pub type FundingAgencyId = Uuid;

/// Academic department, e.g. `CS - Computer Science`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub uuid: DepartmentId,
    /// Short code used in GCIR prefixes, e.g. `CS`.
    pub code: String,
    pub name: String,
}

impl Department {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_code_shape(&self.code, "department")?;
        require_non_blank(&self.name, "department", "name")
    }
}

/// Project category, e.g. `IND - Industry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectType {
    pub uuid: ProjectTypeId,
    /// Short code used in GCIR prefixes, e.g. `IND`.
    pub code: String,
    pub name: String,
}

impl ProjectType {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_code_shape(&self.code, "project type")?;
        require_non_blank(&self.name, "project type", "name")
    }
}

/// Sponsoring agency, e.g. `NSF - National Science Foundation`.
///
/// Optional in a GCIR code: its absence and presence define different
/// partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingAgency {
    pub uuid: FundingAgencyId,
    /// Short code used in GCIR prefixes, e.g. `NSF`.
    pub code: String,
    pub name: String,
}

impl FundingAgency {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            code: code.into(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_code_shape(&self.code, "funding agency")?;
        require_non_blank(&self.name, "funding agency", "name")
    }
}

#[cfg(test)]
mod tests {
    use super::Department;
    use crate::model::ValidationError;

    #[test]
    fn accepts_plain_codes() {
        assert!(Department::new("CS", "Computer Science").validate().is_ok());
    }

    #[test]
    fn rejects_blank_code_and_name() {
        let blank_code = Department::new("  ", "Computer Science");
        assert!(matches!(
            blank_code.validate(),
            Err(ValidationError::EmptyField { field: "code", .. })
        ));

        let blank_name = Department::new("CS", "");
        assert!(matches!(
            blank_name.validate(),
            Err(ValidationError::EmptyField { field: "name", .. })
        ));
    }

    #[test]
    fn rejects_codes_that_would_blur_partition_prefixes() {
        let dashed = Department::new("IND-NSF", "Ambiguous");
        assert!(matches!(
            dashed.validate(),
            Err(ValidationError::InvalidCode { .. })
        ));

        let spaced = Department::new("C S", "Spaced");
        assert!(matches!(
            spaced.validate(),
            Err(ValidationError::InvalidCode { .. })
        ));
    }
}
