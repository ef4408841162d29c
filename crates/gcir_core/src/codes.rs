//! GCIR and external-investigator code allocation.
//!
//! # Responsibility
//! - Build deterministic partition prefixes from proposal key fields.
//! - Compute the next serial for a partition by scanning existing codes.
//!
//! # Invariants
//! - Callers run allocation inside a `TransactionBehavior::Immediate`
//!   transaction and persist the returned code before committing, so the
//!   writer lock is held until the new row is visible to the next allocator.
//! - Serials start at 1 per partition and are strictly increasing in commit
//!   order.
//! - Existing codes whose serial tail does not parse are skipped, never
//!   fatal.

use crate::db::DbError;
use chrono::{Datelike, Local, NaiveDate};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{ErrorCode, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};

const SERIAL_PAD_WIDTH: usize = 4;

/// Prefix of every external investigator code.
pub const EXTERNAL_CODE_PREFIX: &str = "E";

static EXTERNAL_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^E(\d+)$").expect("valid external code regex"));

pub type CodeResult<T> = Result<T, CodeError>;

/// Allocation failures.
#[derive(Debug)]
pub enum CodeError {
    /// No department with the given code exists.
    UnknownDepartment(String),
    /// No project type with the given code exists.
    UnknownProjectType(String),
    /// No funding agency with the given code exists.
    UnknownFundingAgency(String),
    /// The store's writer lock could not be taken within the busy timeout.
    /// The caller may retry; the core never does.
    Contended,
    /// Underlying storage error.
    Db(DbError),
}

impl Display for CodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDepartment(code) => write!(f, "department not found: `{code}`"),
            Self::UnknownProjectType(code) => write!(f, "project type not found: `{code}`"),
            Self::UnknownFundingAgency(code) => {
                write!(f, "funding agency not found: `{code}`")
            }
            Self::Contended => write!(f, "code allocation timed out waiting for the store lock"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for CodeError {
    fn from(value: rusqlite::Error) -> Self {
        if is_contention(&value) {
            return Self::Contended;
        }
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<DbError> for CodeError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

pub(crate) fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::DatabaseBusy
                || failure.code == ErrorCode::DatabaseLocked
    )
}

/// Partition key for one GCIR proposal-code sequence.
///
/// Components are referenced by catalog code; all referenced codes must
/// exist or allocation aborts without minting anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalCodeKey {
    pub department_code: String,
    pub project_type_code: String,
    /// Optional partition component: absence and presence define different
    /// sequences.
    pub funding_agency_code: Option<String>,
    /// Explicit allocation year. Takes precedence over `application_date`.
    pub year: Option<i32>,
    /// Reference date whose year is used when `year` is not supplied.
    /// Supports backfilling historical records without polluting the
    /// current year's sequence.
    pub application_date: Option<NaiveDate>,
}

impl ProposalCodeKey {
    pub fn new(department_code: impl Into<String>, project_type_code: impl Into<String>) -> Self {
        Self {
            department_code: department_code.into(),
            project_type_code: project_type_code.into(),
            ..Self::default()
        }
    }

    /// Resolves the allocation year: explicit year, then the year of
    /// `application_date`, then the current calendar year.
    pub fn effective_year(&self) -> i32 {
        self.year.unwrap_or_else(|| {
            self.application_date
                .map_or_else(current_year, |date| date.year())
        })
    }

    fn prefix(&self) -> String {
        format_prefix(
            self.effective_year(),
            &self.department_code,
            &self.project_type_code,
            self.funding_agency_code.as_deref(),
        )
    }
}

fn current_year() -> i32 {
    Local::now().date_naive().year()
}

fn format_prefix(year: i32, department: &str, project_type: &str, agency: Option<&str>) -> String {
    match agency {
        Some(agency) => format!("G-{year}-{department}-{project_type}-{agency}-"),
        None => format!("G-{year}-{department}-{project_type}-"),
    }
}

fn format_serial(serial: u32) -> String {
    // Pads to 4 digits; serial >= 10000 keeps all its digits unpadded.
    format!("{serial:0width$}", width = SERIAL_PAD_WIDTH)
}

/// Allocates the next GCIR code for the partition described by `key`.
///
/// Must run inside an immediate (write) transaction; the caller persists
/// the proposal row carrying this code in the same transaction.
///
/// # Errors
/// - `UnknownDepartment`/`UnknownProjectType`/`UnknownFundingAgency` when a
///   partition component does not exist; nothing is minted.
/// - `Contended` when the writer lock cannot be taken in time.
pub fn allocate_proposal_code(tx: &Transaction<'_>, key: &ProposalCodeKey) -> CodeResult<String> {
    ensure_catalog_code(
        tx,
        "SELECT EXISTS(SELECT 1 FROM departments WHERE code = ?1);",
        &key.department_code,
        CodeError::UnknownDepartment,
    )?;
    ensure_catalog_code(
        tx,
        "SELECT EXISTS(SELECT 1 FROM project_types WHERE code = ?1);",
        &key.project_type_code,
        CodeError::UnknownProjectType,
    )?;
    if let Some(agency_code) = &key.funding_agency_code {
        ensure_catalog_code(
            tx,
            "SELECT EXISTS(SELECT 1 FROM funding_agencies WHERE code = ?1);",
            agency_code,
            CodeError::UnknownFundingAgency,
        )?;
    }

    let prefix = key.prefix();
    let serial = next_proposal_serial(tx, &prefix)?;
    info!("event=code_allocated module=codes kind=proposal prefix={prefix} serial={serial}");
    Ok(format!("{prefix}{}", format_serial(serial)))
}

/// Allocates the next external investigator code from the global sequence.
///
/// Same transactional contract as [`allocate_proposal_code`].
pub fn allocate_external_investigator_code(tx: &Transaction<'_>) -> CodeResult<String> {
    let mut stmt = tx.prepare("SELECT code FROM external_investigators;")?;
    let mut rows = stmt.query([])?;
    let mut max_serial = 0u32;
    while let Some(row) = rows.next()? {
        let code: String = row.get(0)?;
        match parse_external_serial(&code) {
            Some(serial) => max_serial = max_serial.max(serial),
            None => {
                debug!("event=code_scan_skip module=codes kind=external code={code}");
            }
        }
    }

    let serial = max_serial + 1;
    info!("event=code_allocated module=codes kind=external serial={serial}");
    Ok(format!("{EXTERNAL_CODE_PREFIX}{}", format_serial(serial)))
}

fn ensure_catalog_code(
    tx: &Transaction<'_>,
    exists_sql: &str,
    code: &str,
    missing: impl FnOnce(String) -> CodeError,
) -> CodeResult<()> {
    let exists: i64 = tx.query_row(exists_sql, [code], |row| row.get(0))?;
    if exists == 1 {
        Ok(())
    } else {
        Err(missing(code.to_string()))
    }
}

fn next_proposal_serial(tx: &Transaction<'_>, prefix: &str) -> CodeResult<u32> {
    // substr comparison instead of LIKE: catalog codes may contain SQL
    // wildcard characters and must still match literally.
    let mut stmt =
        tx.prepare("SELECT gcir_code FROM proposals WHERE substr(gcir_code, 1, length(?1)) = ?1;")?;
    let mut rows = stmt.query([prefix])?;
    let mut max_serial = 0u32;
    while let Some(row) = rows.next()? {
        let code: String = row.get(0)?;
        match parse_serial_tail(&code) {
            Some(serial) => max_serial = max_serial.max(serial),
            None => {
                debug!("event=code_scan_skip module=codes kind=proposal code={code}");
            }
        }
    }
    Ok(max_serial + 1)
}

/// Parses the numeric segment after the last `-` of a GCIR code.
fn parse_serial_tail(code: &str) -> Option<u32> {
    code.rsplit('-').next()?.parse::<u32>().ok()
}

/// Parses the numeric tail of an external investigator code (`E0001`).
fn parse_external_serial(code: &str) -> Option<u32> {
    let captures = EXTERNAL_CODE_RE.captures(code)?;
    captures.get(1)?.as_str().parse::<u32>().ok()
}
