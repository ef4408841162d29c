//! Core domain logic for the GCIR grants-management system.
//! This crate is the single source of truth for GCIR code allocation and
//! investigator-role invariants.

pub mod codes;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use codes::{
    allocate_external_investigator_code, allocate_proposal_code, CodeError, CodeResult,
    ProposalCodeKey,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::assignment::{
    check_pi_count, InvestigatorRef, InvestigatorRole, PiViolation, RoleAssignment,
};
pub use model::catalog::{Department, FundingAgency, ProjectType};
pub use model::investigator::{
    ExternalInvestigator, Investigator, NewExternalInvestigator,
};
pub use model::proposal::{NewProposal, Proposal, ProposalId, ProposalStatus};
pub use model::ValidationError;
pub use repo::catalog_repo::{CatalogRepository, SqliteCatalogRepository};
pub use repo::investigator_repo::{InvestigatorRepository, SqliteInvestigatorRepository};
pub use repo::proposal_repo::{ProposalListQuery, ProposalRepository, SqliteProposalRepository};
pub use repo::{RepoError, RepoResult};
pub use service::investigator_service::InvestigatorService;
pub use service::proposal_service::{ProposalService, ProposalServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
