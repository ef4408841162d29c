//! Investigator use-case service.
//!
//! # Responsibility
//! - Provide stable creation/lookup entry points for both investigator
//!   pools.
//! - Delegate persistence (and external code allocation) to the repository.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.

use crate::model::investigator::{
    ExternalInvestigator, ExternalInvestigatorId, Investigator, InvestigatorId,
    NewExternalInvestigator,
};
use crate::repo::investigator_repo::InvestigatorRepository;
use crate::repo::RepoResult;

/// Use-case service wrapper for investigator operations.
pub struct InvestigatorService<R: InvestigatorRepository> {
    repo: R,
}

impl<R: InvestigatorRepository> InvestigatorService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Registers an internal investigator with a pre-assigned PSRN.
    pub fn create_investigator(&mut self, investigator: &Investigator) -> RepoResult<InvestigatorId> {
        self.repo.create_investigator(investigator)
    }

    /// Registers an external investigator, allocating the next `E`-code
    /// unless the request supplies one.
    pub fn create_external_investigator(
        &mut self,
        request: &NewExternalInvestigator,
    ) -> RepoResult<ExternalInvestigator> {
        self.repo.create_external_investigator(request)
    }

    pub fn get_investigator(&self, id: InvestigatorId) -> RepoResult<Option<Investigator>> {
        self.repo.get_investigator(id)
    }

    pub fn find_investigator_by_psrn(&self, psrn: &str) -> RepoResult<Option<Investigator>> {
        self.repo.find_investigator_by_psrn(psrn)
    }

    pub fn list_investigators(&self) -> RepoResult<Vec<Investigator>> {
        self.repo.list_investigators()
    }

    pub fn get_external_investigator(
        &self,
        id: ExternalInvestigatorId,
    ) -> RepoResult<Option<ExternalInvestigator>> {
        self.repo.get_external_investigator(id)
    }

    pub fn find_external_investigator_by_code(
        &self,
        code: &str,
    ) -> RepoResult<Option<ExternalInvestigator>> {
        self.repo.find_external_investigator_by_code(code)
    }

    pub fn list_external_investigators(&self) -> RepoResult<Vec<ExternalInvestigator>> {
        self.repo.list_external_investigators()
    }
}
