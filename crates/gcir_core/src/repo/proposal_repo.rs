//! Proposal repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist proposals, allocating GCIR codes inside the insert transaction.
//! - Own role-assignment storage and the "exactly one PI" aggregate check.
//!
//! # Invariants
//! - `gcir_code`, department, project type and funding agency are immutable
//!   once the code is minted; updates touch non-partition fields only.
//! - `replace_role_assignments` validates the PI count inside its
//!   transaction and rolls back on violation; incremental assignment writes
//!   are unchecked and gated by `validate_pi_invariant` on demand.
//! - An investigator appears at most once per proposal, checked per kind.

use crate::codes::{allocate_proposal_code, ProposalCodeKey};
use crate::model::assignment::{
    check_pi_count, InvestigatorRef, InvestigatorRole, RoleAssignment,
};
use crate::model::proposal::{NewProposal, Proposal, ProposalId, ProposalStatus};
use crate::repo::investigator_repo::{external_investigator_exists, investigator_exists};
use crate::repo::{
    ensure_connection_ready, map_unique_violation, parse_uuid, RepoError, RepoResult,
    RequiredTable,
};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use uuid::Uuid;

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        table: "proposals",
        columns: &[
            "uuid",
            "gcir_code",
            "title",
            "department_uuid",
            "project_type_uuid",
            "funding_agency_uuid",
            "status",
            "application_date",
            "start_date",
            "end_date",
            "sanction_letter_number",
            "created_at",
            "updated_at",
        ],
    },
    RequiredTable {
        table: "proposal_investigators",
        columns: &[
            "proposal_uuid",
            "investigator_uuid",
            "external_investigator_uuid",
            "role",
        ],
    },
];

const PROPOSAL_SELECT_SQL: &str = "SELECT
    uuid,
    gcir_code,
    title,
    department_uuid,
    project_type_uuid,
    funding_agency_uuid,
    status,
    application_date,
    start_date,
    end_date,
    sanction_letter_number,
    created_at,
    updated_at
FROM proposals";

/// Query options for listing proposals.
#[derive(Debug, Clone, Default)]
pub struct ProposalListQuery {
    pub status: Option<ProposalStatus>,
    pub department_code: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for proposal CRUD and role assignments.
pub trait ProposalRepository {
    /// Creates a proposal, allocating the next GCIR code for its partition
    /// unless the request carries an explicit code.
    fn create_proposal(&mut self, request: &NewProposal) -> RepoResult<Proposal>;
    fn get_proposal(&self, id: ProposalId) -> RepoResult<Option<Proposal>>;
    fn find_by_gcir_code(&self, code: &str) -> RepoResult<Option<Proposal>>;
    fn list_proposals(&self, query: &ProposalListQuery) -> RepoResult<Vec<Proposal>>;
    /// Updates non-partition fields (title, status, dates, sanction letter
    /// number). The GCIR code and partition references never change.
    fn update_proposal(&mut self, proposal: &Proposal) -> RepoResult<()>;
    /// Hard-deletes a proposal and cascades its role assignments. The
    /// serial gap left behind is tolerated and never recycled.
    fn delete_proposal(&mut self, id: ProposalId) -> RepoResult<()>;

    /// Adds one role assignment without checking the PI count.
    fn add_role_assignment(
        &mut self,
        proposal_uuid: ProposalId,
        assignment: &RoleAssignment,
    ) -> RepoResult<()>;
    /// Removes one investigator's assignment without checking the PI count.
    fn remove_role_assignment(
        &mut self,
        proposal_uuid: ProposalId,
        investigator: &InvestigatorRef,
    ) -> RepoResult<()>;
    /// Atomically replaces the full assignment set. A non-empty set must
    /// contain exactly one PI or the whole transaction rolls back; an empty
    /// set returns the proposal to its no-assignments draft state.
    fn replace_role_assignments(
        &mut self,
        proposal_uuid: ProposalId,
        assignments: &[RoleAssignment],
    ) -> RepoResult<()>;
    fn list_role_assignments(&self, proposal_uuid: ProposalId) -> RepoResult<Vec<RoleAssignment>>;
    fn count_assignments_with_role(
        &self,
        proposal_uuid: ProposalId,
        role: InvestigatorRole,
    ) -> RepoResult<u32>;

    /// Checks the "exactly one PI" rule against persisted assignments.
    fn validate_pi_invariant(&self, proposal_uuid: ProposalId) -> RepoResult<()>;
}

/// SQLite-backed proposal repository.
pub struct SqliteProposalRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteProposalRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl ProposalRepository for SqliteProposalRepository<'_> {
    fn create_proposal(&mut self, request: &NewProposal) -> RepoResult<Proposal> {
        request.validate()?;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let department_uuid = resolve_catalog_uuid(
            &tx,
            "SELECT uuid FROM departments WHERE code = ?1;",
            &request.department_code,
            "department",
        )?;
        let project_type_uuid = resolve_catalog_uuid(
            &tx,
            "SELECT uuid FROM project_types WHERE code = ?1;",
            &request.project_type_code,
            "project type",
        )?;
        let funding_agency_uuid = match &request.funding_agency_code {
            Some(code) => Some(resolve_catalog_uuid(
                &tx,
                "SELECT uuid FROM funding_agencies WHERE code = ?1;",
                code,
                "funding agency",
            )?),
            None => None,
        };

        let gcir_code = match &request.gcir_code {
            Some(code) => code.clone(),
            None => {
                let key = ProposalCodeKey {
                    department_code: request.department_code.clone(),
                    project_type_code: request.project_type_code.clone(),
                    funding_agency_code: request.funding_agency_code.clone(),
                    year: request.year,
                    application_date: request.application_date,
                };
                allocate_proposal_code(&tx, &key)?
            }
        };

        let uuid = Uuid::new_v4();
        tx.execute(
            "INSERT INTO proposals (
                uuid,
                gcir_code,
                title,
                department_uuid,
                project_type_uuid,
                funding_agency_uuid,
                status,
                application_date,
                start_date,
                end_date,
                sanction_letter_number
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                uuid.to_string(),
                gcir_code.as_str(),
                request.title.as_str(),
                department_uuid.to_string(),
                project_type_uuid.to_string(),
                funding_agency_uuid.map(|value| value.to_string()),
                request.status.to_db(),
                request.application_date.map(date_to_db),
                request.start_date.map(date_to_db),
                request.end_date.map(date_to_db),
                request.sanction_letter_number.as_deref(),
            ],
        )
        .map_err(|err| map_unique_violation(err, "proposal", &gcir_code))?;

        let proposal = get_proposal_with(&tx, uuid)?.ok_or_else(|| {
            RepoError::InvalidData("created proposal not readable in its own transaction".to_string())
        })?;
        tx.commit()?;
        Ok(proposal)
    }

    fn get_proposal(&self, id: ProposalId) -> RepoResult<Option<Proposal>> {
        get_proposal_with(self.conn, id)
    }

    fn find_by_gcir_code(&self, code: &str) -> RepoResult<Option<Proposal>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROPOSAL_SELECT_SQL} WHERE gcir_code = ?1;"))?;
        let mut rows = stmt.query([code])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_proposal_row(row)?));
        }
        Ok(None)
    }

    fn list_proposals(&self, query: &ProposalListQuery) -> RepoResult<Vec<Proposal>> {
        let mut sql = format!("{PROPOSAL_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(status) = query.status {
            sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.to_db().to_string()));
        }

        if let Some(department_code) = query.department_code.as_ref() {
            sql.push_str(
                " AND department_uuid IN (SELECT uuid FROM departments WHERE code = ?)",
            );
            bind_values.push(Value::Text(department_code.clone()));
        }

        sql.push_str(" ORDER BY created_at DESC, uuid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut proposals = Vec::new();
        while let Some(row) = rows.next()? {
            proposals.push(parse_proposal_row(row)?);
        }
        Ok(proposals)
    }

    fn update_proposal(&mut self, proposal: &Proposal) -> RepoResult<()> {
        proposal.validate()?;

        let changed = self.conn.execute(
            "UPDATE proposals
             SET
                title = ?1,
                status = ?2,
                application_date = ?3,
                start_date = ?4,
                end_date = ?5,
                sanction_letter_number = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?7;",
            params![
                proposal.title.as_str(),
                proposal.status.to_db(),
                proposal.application_date.map(date_to_db),
                proposal.start_date.map(date_to_db),
                proposal.end_date.map(date_to_db),
                proposal.sanction_letter_number.as_deref(),
                proposal.uuid.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "proposal",
                key: proposal.uuid.to_string(),
            });
        }
        Ok(())
    }

    fn delete_proposal(&mut self, id: ProposalId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM proposals WHERE uuid = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "proposal",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    fn add_role_assignment(
        &mut self,
        proposal_uuid: ProposalId,
        assignment: &RoleAssignment,
    ) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_proposal_exists(&tx, proposal_uuid)?;
        insert_assignment(&tx, proposal_uuid, assignment)?;
        tx.commit()?;
        Ok(())
    }

    fn remove_role_assignment(
        &mut self,
        proposal_uuid: ProposalId,
        investigator: &InvestigatorRef,
    ) -> RepoResult<()> {
        let (column, uuid) = match investigator {
            InvestigatorRef::Internal(uuid) => ("investigator_uuid", uuid),
            InvestigatorRef::External(uuid) => ("external_investigator_uuid", uuid),
        };
        let changed = self.conn.execute(
            &format!(
                "DELETE FROM proposal_investigators
                 WHERE proposal_uuid = ?1 AND {column} = ?2;"
            ),
            params![proposal_uuid.to_string(), uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "role assignment",
                key: investigator.to_string(),
            });
        }
        Ok(())
    }

    fn replace_role_assignments(
        &mut self,
        proposal_uuid: ProposalId,
        assignments: &[RoleAssignment],
    ) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_proposal_exists(&tx, proposal_uuid)?;

        tx.execute(
            "DELETE FROM proposal_investigators WHERE proposal_uuid = ?1;",
            [proposal_uuid.to_string()],
        )?;

        for assignment in assignments {
            insert_assignment(&tx, proposal_uuid, assignment)?;
        }

        if !assignments.is_empty() {
            let pi_count = count_role(&tx, proposal_uuid, InvestigatorRole::Pi)?;
            check_pi_count(pi_count)?;
        }

        tx.execute(
            "UPDATE proposals
             SET updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            [proposal_uuid.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn list_role_assignments(&self, proposal_uuid: ProposalId) -> RepoResult<Vec<RoleAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT investigator_uuid, external_investigator_uuid, role
             FROM proposal_investigators
             WHERE proposal_uuid = ?1
             ORDER BY role ASC, COALESCE(investigator_uuid, external_investigator_uuid) ASC;",
        )?;
        let mut rows = stmt.query([proposal_uuid.to_string()])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn count_assignments_with_role(
        &self,
        proposal_uuid: ProposalId,
        role: InvestigatorRole,
    ) -> RepoResult<u32> {
        count_role(self.conn, proposal_uuid, role)
    }

    fn validate_pi_invariant(&self, proposal_uuid: ProposalId) -> RepoResult<()> {
        ensure_proposal_exists(self.conn, proposal_uuid)?;
        let pi_count = count_role(self.conn, proposal_uuid, InvestigatorRole::Pi)?;
        check_pi_count(pi_count)?;
        Ok(())
    }
}

fn resolve_catalog_uuid(
    tx: &Transaction<'_>,
    lookup_sql: &str,
    code: &str,
    entity: &'static str,
) -> RepoResult<Uuid> {
    let uuid: Option<String> = tx.query_row(lookup_sql, [code], |row| row.get(0)).optional()?;
    match uuid {
        Some(value) => parse_uuid(&value, entity),
        None => Err(RepoError::NotFound {
            entity,
            key: code.to_string(),
        }),
    }
}

fn ensure_proposal_exists(conn: &Connection, proposal_uuid: ProposalId) -> RepoResult<()> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM proposals WHERE uuid = ?1);",
        [proposal_uuid.to_string()],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Ok(())
    } else {
        Err(RepoError::NotFound {
            entity: "proposal",
            key: proposal_uuid.to_string(),
        })
    }
}

fn insert_assignment(
    conn: &Connection,
    proposal_uuid: ProposalId,
    assignment: &RoleAssignment,
) -> RepoResult<()> {
    let (internal_uuid, external_uuid) = match assignment.investigator {
        InvestigatorRef::Internal(uuid) => {
            if !investigator_exists(conn, uuid)? {
                return Err(RepoError::NotFound {
                    entity: "investigator",
                    key: uuid.to_string(),
                });
            }
            (Some(uuid), None)
        }
        InvestigatorRef::External(uuid) => {
            if !external_investigator_exists(conn, uuid)? {
                return Err(RepoError::NotFound {
                    entity: "external investigator",
                    key: uuid.to_string(),
                });
            }
            (None, Some(uuid))
        }
    };

    let duplicate: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM proposal_investigators
            WHERE proposal_uuid = ?1
              AND (investigator_uuid = ?2 OR external_investigator_uuid = ?3)
        );",
        params![
            proposal_uuid.to_string(),
            internal_uuid.map(|value| value.to_string()),
            external_uuid.map(|value| value.to_string()),
        ],
        |row| row.get(0),
    )?;
    if duplicate == 1 {
        return Err(RepoError::DuplicateAssignment {
            proposal_uuid,
            investigator: assignment.investigator.to_string(),
        });
    }

    conn.execute(
        "INSERT INTO proposal_investigators
            (proposal_uuid, investigator_uuid, external_investigator_uuid, role)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            proposal_uuid.to_string(),
            internal_uuid.map(|value| value.to_string()),
            external_uuid.map(|value| value.to_string()),
            assignment.role.to_db(),
        ],
    )?;
    Ok(())
}

fn count_role(
    conn: &Connection,
    proposal_uuid: ProposalId,
    role: InvestigatorRole,
) -> RepoResult<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*)
         FROM proposal_investigators
         WHERE proposal_uuid = ?1 AND role = ?2;",
        params![proposal_uuid.to_string(), role.to_db()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn get_proposal_with(conn: &Connection, id: ProposalId) -> RepoResult<Option<Proposal>> {
    let mut stmt = conn.prepare(&format!("{PROPOSAL_SELECT_SQL} WHERE uuid = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_proposal_row(row)?));
    }
    Ok(None)
}

fn parse_proposal_row(row: &Row<'_>) -> RepoResult<Proposal> {
    let uuid: String = row.get("uuid")?;
    let department_uuid: String = row.get("department_uuid")?;
    let project_type_uuid: String = row.get("project_type_uuid")?;
    let funding_agency_uuid = row
        .get::<_, Option<String>>("funding_agency_uuid")?
        .map(|value| parse_uuid(&value, "proposals.funding_agency_uuid"))
        .transpose()?;

    let status_text: String = row.get("status")?;
    let status = ProposalStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{status_text}` in proposals.status"))
    })?;

    let proposal = Proposal {
        uuid: parse_uuid(&uuid, "proposals.uuid")?,
        gcir_code: row.get("gcir_code")?,
        title: row.get("title")?,
        department_uuid: parse_uuid(&department_uuid, "proposals.department_uuid")?,
        project_type_uuid: parse_uuid(&project_type_uuid, "proposals.project_type_uuid")?,
        funding_agency_uuid,
        status,
        application_date: parse_date_column(row, "application_date")?,
        start_date: parse_date_column(row, "start_date")?,
        end_date: parse_date_column(row, "end_date")?,
        sanction_letter_number: row.get("sanction_letter_number")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    proposal.validate()?;
    Ok(proposal)
}

fn parse_assignment_row(row: &Row<'_>) -> RepoResult<RoleAssignment> {
    let internal: Option<String> = row.get("investigator_uuid")?;
    let external: Option<String> = row.get("external_investigator_uuid")?;

    let investigator = match (internal, external) {
        (Some(uuid), None) => InvestigatorRef::Internal(parse_uuid(
            &uuid,
            "proposal_investigators.investigator_uuid",
        )?),
        (None, Some(uuid)) => InvestigatorRef::External(parse_uuid(
            &uuid,
            "proposal_investigators.external_investigator_uuid",
        )?),
        (None, None) => {
            return Err(RepoError::InvalidData(
                "role assignment references no investigator".to_string(),
            ));
        }
        (Some(_), Some(_)) => {
            return Err(RepoError::InvalidData(
                "role assignment references both investigator kinds".to_string(),
            ));
        }
    };

    let role_text: String = row.get("role")?;
    let role = InvestigatorRole::parse(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid role `{role_text}` in proposal_investigators.role"
        ))
    })?;

    Ok(RoleAssignment { investigator, role })
}

fn date_to_db(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date_column(row: &Row<'_>, column: &'static str) -> RepoResult<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(column)? {
        Some(value) => NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                RepoError::InvalidData(format!("invalid date `{value}` in proposals.{column}"))
            }),
        None => Ok(None),
    }
}
