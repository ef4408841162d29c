//! Proposal use-case service.
//!
//! # Responsibility
//! - Provide the external operations of the core: proposal creation with
//!   code allocation, role-assignment mutations and the PI validation gate.
//! - Remap repository errors into use-case terms.
//!
//! # Invariants
//! - `validate_pi_invariant` is the on-demand gate the surrounding workflow
//!   invokes after a batch of incremental assignment writes completes.
//! - The batch replace path is blocking: a violating set never commits.

use crate::model::assignment::{InvestigatorRef, PiViolation, RoleAssignment};
use crate::model::proposal::{NewProposal, Proposal, ProposalId};
use crate::repo::proposal_repo::{ProposalListQuery, ProposalRepository};
use crate::repo::{RepoError, RepoResult};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for proposal use-cases.
#[derive(Debug)]
pub enum ProposalServiceError {
    /// Target proposal does not exist.
    ProposalNotFound(String),
    /// The "exactly one PI" rule is violated.
    PiInvariant(PiViolation),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ProposalServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProposalNotFound(key) => write!(f, "proposal not found: `{key}`"),
            Self::PiInvariant(violation) => write!(f, "{violation}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProposalServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PiInvariant(violation) => Some(violation),
            Self::Repo(err) => Some(err),
            Self::ProposalNotFound(_) => None,
        }
    }
}

impl From<RepoError> for ProposalServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::PiInvariant(violation) => Self::PiInvariant(violation),
            RepoError::NotFound {
                entity: "proposal",
                key,
            } => Self::ProposalNotFound(key),
            other => Self::Repo(other),
        }
    }
}

/// Proposal service facade over repository implementations.
pub struct ProposalService<R: ProposalRepository> {
    repo: R,
}

impl<R: ProposalRepository> ProposalService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates a proposal. When the request carries no explicit GCIR code,
    /// the next code for its partition is allocated inside the insert
    /// transaction.
    pub fn create_proposal(
        &mut self,
        request: &NewProposal,
    ) -> Result<Proposal, ProposalServiceError> {
        Ok(self.repo.create_proposal(request)?)
    }

    pub fn get_proposal(&self, id: ProposalId) -> RepoResult<Option<Proposal>> {
        self.repo.get_proposal(id)
    }

    pub fn find_by_gcir_code(&self, code: &str) -> RepoResult<Option<Proposal>> {
        self.repo.find_by_gcir_code(code)
    }

    pub fn list_proposals(&self, query: &ProposalListQuery) -> RepoResult<Vec<Proposal>> {
        self.repo.list_proposals(query)
    }

    /// Updates non-partition proposal fields.
    pub fn update_proposal(&mut self, proposal: &Proposal) -> Result<(), ProposalServiceError> {
        Ok(self.repo.update_proposal(proposal)?)
    }

    pub fn delete_proposal(&mut self, id: ProposalId) -> Result<(), ProposalServiceError> {
        Ok(self.repo.delete_proposal(id)?)
    }

    /// Adds one assignment without checking the PI count; callers run
    /// [`Self::validate_pi_invariant`] once their batch completes.
    pub fn add_role_assignment(
        &mut self,
        proposal_uuid: ProposalId,
        assignment: &RoleAssignment,
    ) -> Result<(), ProposalServiceError> {
        Ok(self.repo.add_role_assignment(proposal_uuid, assignment)?)
    }

    /// Removes one investigator's assignment without checking the PI count.
    pub fn remove_role_assignment(
        &mut self,
        proposal_uuid: ProposalId,
        investigator: &InvestigatorRef,
    ) -> Result<(), ProposalServiceError> {
        Ok(self
            .repo
            .remove_role_assignment(proposal_uuid, investigator)?)
    }

    /// Atomically replaces the full assignment set; a non-empty set with
    /// zero or multiple PIs rolls back and surfaces the violation.
    pub fn replace_role_assignments(
        &mut self,
        proposal_uuid: ProposalId,
        assignments: &[RoleAssignment],
    ) -> Result<(), ProposalServiceError> {
        Ok(self
            .repo
            .replace_role_assignments(proposal_uuid, assignments)?)
    }

    pub fn list_role_assignments(
        &self,
        proposal_uuid: ProposalId,
    ) -> RepoResult<Vec<RoleAssignment>> {
        self.repo.list_role_assignments(proposal_uuid)
    }

    /// Checks that the proposal has exactly one Principal Investigator.
    pub fn validate_pi_invariant(
        &self,
        proposal_uuid: ProposalId,
    ) -> Result<(), ProposalServiceError> {
        Ok(self.repo.validate_pi_invariant(proposal_uuid)?)
    }
}
