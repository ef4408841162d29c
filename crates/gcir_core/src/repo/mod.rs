//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes validate domain models before SQL mutations.
//! - Repositories refuse connections whose schema is not fully migrated.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::codes::{is_contention, CodeError};
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::assignment::PiViolation;
use crate::model::proposal::ProposalId;
use crate::model::ValidationError;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod catalog_repo;
pub mod investigator_repo;
pub mod proposal_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence and query errors shared by all repositories.
#[derive(Debug)]
pub enum RepoError {
    /// Domain model failed construction-time validation.
    Validation(ValidationError),
    /// Code allocation failed (unknown partition component, ...).
    Code(CodeError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Referenced record does not exist.
    NotFound { entity: &'static str, key: String },
    /// A unique key (catalog code, PSRN, GCIR code) already exists.
    DuplicateKey { entity: &'static str, key: String },
    /// The investigator is already assigned to this proposal.
    DuplicateAssignment {
        proposal_uuid: ProposalId,
        investigator: String,
    },
    /// The "exactly one PI" aggregate rule is violated.
    PiInvariant(PiViolation),
    /// The store's writer lock could not be taken within the busy timeout.
    Contended,
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Code(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, key } => write!(f, "{entity} not found: `{key}`"),
            Self::DuplicateKey { entity, key } => {
                write!(f, "{entity} already exists: `{key}`")
            }
            Self::DuplicateAssignment {
                proposal_uuid,
                investigator,
            } => write!(
                f,
                "investigator {investigator} is already assigned to proposal {proposal_uuid}"
            ),
            Self::PiInvariant(violation) => write!(f, "{violation}"),
            Self::Contended => write!(f, "write timed out waiting for the store lock"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Code(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::PiInvariant(violation) => Some(violation),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<CodeError> for RepoError {
    fn from(value: CodeError) -> Self {
        match value {
            CodeError::Contended => Self::Contended,
            other => Self::Code(other),
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if is_contention(&value) {
            return Self::Contended;
        }
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<PiViolation> for RepoError {
    fn from(value: PiViolation) -> Self {
        Self::PiInvariant(value)
    }
}

/// One table and the columns a repository depends on.
pub(crate) struct RequiredTable {
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

/// Verifies the connection is migrated and carries the required schema.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    required: &[RequiredTable],
) -> RepoResult<()> {
    let actual_version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for requirement in required {
        if !table_exists(conn, requirement.table)? {
            return Err(RepoError::MissingRequiredTable(requirement.table));
        }
        for column in requirement.columns {
            if !table_has_column(conn, requirement.table, column)? {
                return Err(RepoError::MissingRequiredColumn {
                    table: requirement.table,
                    column,
                });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub(crate) fn parse_uuid(value: &str, context: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {context}")))
}

/// Maps a unique-constraint failure to `DuplicateKey`, passing other errors
/// through the standard conversion.
pub(crate) fn map_unique_violation(
    err: rusqlite::Error,
    entity: &'static str,
    key: &str,
) -> RepoError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return RepoError::DuplicateKey {
                entity,
                key: key.to_string(),
            };
        }
    }
    err.into()
}
