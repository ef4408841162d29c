//! Investigator repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist internal investigators (pre-assigned PSRN) and external
//!   investigators (allocated `E`-codes).
//!
//! # Invariants
//! - External code allocation and the insert carrying it share one
//!   immediate transaction, so the writer lock is held until the new code
//!   is visible to the next allocation.
//! - Explicit caller-supplied codes bypass the allocator and are trusted
//!   as-is.

use crate::codes::allocate_external_investigator_code;
use crate::model::investigator::{
    ExternalInvestigator, ExternalInvestigatorId, Investigator, InvestigatorId,
    NewExternalInvestigator,
};
use crate::repo::{
    ensure_connection_ready, map_unique_violation, parse_uuid, RepoError, RepoResult,
    RequiredTable,
};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        table: "investigators",
        columns: &["uuid", "psrn", "name", "email", "department_uuid"],
    },
    RequiredTable {
        table: "external_investigators",
        columns: &[
            "uuid",
            "code",
            "name",
            "email",
            "organization",
            "country",
            "designation",
        ],
    },
];

const EXTERNAL_SELECT_SQL: &str = "SELECT
    uuid,
    code,
    name,
    email,
    organization,
    country,
    designation
FROM external_investigators";

/// Repository interface for both investigator pools.
pub trait InvestigatorRepository {
    fn create_investigator(&mut self, investigator: &Investigator) -> RepoResult<InvestigatorId>;
    fn get_investigator(&self, id: InvestigatorId) -> RepoResult<Option<Investigator>>;
    fn find_investigator_by_psrn(&self, psrn: &str) -> RepoResult<Option<Investigator>>;
    fn list_investigators(&self) -> RepoResult<Vec<Investigator>>;

    /// Creates an external investigator, allocating the next `E`-code when
    /// the request does not supply one.
    fn create_external_investigator(
        &mut self,
        request: &NewExternalInvestigator,
    ) -> RepoResult<ExternalInvestigator>;
    fn get_external_investigator(
        &self,
        id: ExternalInvestigatorId,
    ) -> RepoResult<Option<ExternalInvestigator>>;
    fn find_external_investigator_by_code(
        &self,
        code: &str,
    ) -> RepoResult<Option<ExternalInvestigator>>;
    fn list_external_investigators(&self) -> RepoResult<Vec<ExternalInvestigator>>;
}

/// SQLite-backed investigator repository.
pub struct SqliteInvestigatorRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteInvestigatorRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl InvestigatorRepository for SqliteInvestigatorRepository<'_> {
    fn create_investigator(&mut self, investigator: &Investigator) -> RepoResult<InvestigatorId> {
        investigator.validate()?;

        let department_exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM departments WHERE uuid = ?1);",
            [investigator.department_uuid.to_string()],
            |row| row.get(0),
        )?;
        if department_exists != 1 {
            return Err(RepoError::NotFound {
                entity: "department",
                key: investigator.department_uuid.to_string(),
            });
        }

        self.conn
            .execute(
                "INSERT INTO investigators (uuid, psrn, name, email, department_uuid)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    investigator.uuid.to_string(),
                    investigator.psrn.as_str(),
                    investigator.name.as_str(),
                    investigator.email.as_deref(),
                    investigator.department_uuid.to_string(),
                ],
            )
            .map_err(|err| map_unique_violation(err, "investigator", &investigator.psrn))?;
        Ok(investigator.uuid)
    }

    fn get_investigator(&self, id: InvestigatorId) -> RepoResult<Option<Investigator>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, psrn, name, email, department_uuid
             FROM investigators
             WHERE uuid = ?1;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_investigator_row(row)?));
        }
        Ok(None)
    }

    fn find_investigator_by_psrn(&self, psrn: &str) -> RepoResult<Option<Investigator>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, psrn, name, email, department_uuid
             FROM investigators
             WHERE psrn = ?1;",
        )?;
        let mut rows = stmt.query([psrn])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_investigator_row(row)?));
        }
        Ok(None)
    }

    fn list_investigators(&self) -> RepoResult<Vec<Investigator>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, psrn, name, email, department_uuid
             FROM investigators
             ORDER BY psrn ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut investigators = Vec::new();
        while let Some(row) = rows.next()? {
            investigators.push(parse_investigator_row(row)?);
        }
        Ok(investigators)
    }

    fn create_external_investigator(
        &mut self,
        request: &NewExternalInvestigator,
    ) -> RepoResult<ExternalInvestigator> {
        request.validate()?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let code = match &request.code {
            Some(code) => code.clone(),
            None => allocate_external_investigator_code(&tx)?,
        };

        let uuid = Uuid::new_v4();
        tx.execute(
            "INSERT INTO external_investigators
                (uuid, code, name, email, organization, country, designation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                uuid.to_string(),
                code.as_str(),
                request.name.as_str(),
                request.email.as_deref(),
                request.organization.as_deref(),
                request.country.as_deref(),
                request.designation.as_deref(),
            ],
        )
        .map_err(|err| map_unique_violation(err, "external investigator", &code))?;
        tx.commit()?;

        Ok(ExternalInvestigator {
            uuid,
            code,
            name: request.name.clone(),
            email: request.email.clone(),
            organization: request.organization.clone(),
            country: request.country.clone(),
            designation: request.designation.clone(),
        })
    }

    fn get_external_investigator(
        &self,
        id: ExternalInvestigatorId,
    ) -> RepoResult<Option<ExternalInvestigator>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EXTERNAL_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_external_row(row)?));
        }
        Ok(None)
    }

    fn find_external_investigator_by_code(
        &self,
        code: &str,
    ) -> RepoResult<Option<ExternalInvestigator>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EXTERNAL_SELECT_SQL} WHERE code = ?1;"))?;
        let mut rows = stmt.query([code])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_external_row(row)?));
        }
        Ok(None)
    }

    fn list_external_investigators(&self) -> RepoResult<Vec<ExternalInvestigator>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{EXTERNAL_SELECT_SQL} ORDER BY code ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut investigators = Vec::new();
        while let Some(row) = rows.next()? {
            investigators.push(parse_external_row(row)?);
        }
        Ok(investigators)
    }
}

/// Looks up an internal investigator uuid without holding a repository.
///
/// Used by the proposal repository inside its own transactions.
pub(crate) fn investigator_exists(conn: &Connection, id: InvestigatorId) -> RepoResult<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM investigators WHERE uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub(crate) fn external_investigator_exists(
    conn: &Connection,
    id: ExternalInvestigatorId,
) -> RepoResult<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM external_investigators WHERE uuid = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

fn parse_investigator_row(row: &Row<'_>) -> RepoResult<Investigator> {
    let uuid: String = row.get("uuid")?;
    let department_uuid: String = row.get("department_uuid")?;
    Ok(Investigator {
        uuid: parse_uuid(&uuid, "investigators.uuid")?,
        psrn: row.get("psrn")?,
        name: row.get("name")?,
        email: row.get("email")?,
        department_uuid: parse_uuid(&department_uuid, "investigators.department_uuid")?,
    })
}

fn parse_external_row(row: &Row<'_>) -> RepoResult<ExternalInvestigator> {
    let uuid: String = row.get("uuid")?;
    Ok(ExternalInvestigator {
        uuid: parse_uuid(&uuid, "external_investigators.uuid")?,
        code: row.get("code")?,
        name: row.get("name")?,
        email: row.get("email")?,
        organization: row.get("organization")?,
        country: row.get("country")?,
        designation: row.get("designation")?,
    })
}
