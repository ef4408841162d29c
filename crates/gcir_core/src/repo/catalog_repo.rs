//! Catalog repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist the partition-defining catalog entities: departments, project
//!   types and funding agencies.
//!
//! # Invariants
//! - Catalog codes are validated before SQL mutations and unique per table.
//! - Catalog rows are never deleted by the core; codes minted against them
//!   must keep resolving.

use crate::model::catalog::{
    Department, DepartmentId, FundingAgency, FundingAgencyId, ProjectType, ProjectTypeId,
};
use crate::repo::{
    ensure_connection_ready, map_unique_violation, parse_uuid, RepoResult, RequiredTable,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const REQUIRED_TABLES: &[RequiredTable] = &[
    RequiredTable {
        table: "departments",
        columns: &["uuid", "code", "name"],
    },
    RequiredTable {
        table: "project_types",
        columns: &["uuid", "code", "name"],
    },
    RequiredTable {
        table: "funding_agencies",
        columns: &["uuid", "code", "name"],
    },
];

/// Repository interface for catalog entities.
pub trait CatalogRepository {
    fn create_department(&self, department: &Department) -> RepoResult<DepartmentId>;
    fn find_department_by_code(&self, code: &str) -> RepoResult<Option<Department>>;
    fn list_departments(&self) -> RepoResult<Vec<Department>>;

    fn create_project_type(&self, project_type: &ProjectType) -> RepoResult<ProjectTypeId>;
    fn find_project_type_by_code(&self, code: &str) -> RepoResult<Option<ProjectType>>;
    fn list_project_types(&self) -> RepoResult<Vec<ProjectType>>;

    fn create_funding_agency(&self, agency: &FundingAgency) -> RepoResult<FundingAgencyId>;
    fn find_funding_agency_by_code(&self, code: &str) -> RepoResult<Option<FundingAgency>>;
    fn list_funding_agencies(&self) -> RepoResult<Vec<FundingAgency>>;
}

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCatalogRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, REQUIRED_TABLES)?;
        Ok(Self { conn })
    }
}

impl CatalogRepository for SqliteCatalogRepository<'_> {
    fn create_department(&self, department: &Department) -> RepoResult<DepartmentId> {
        department.validate()?;
        self.conn
            .execute(
                "INSERT INTO departments (uuid, code, name) VALUES (?1, ?2, ?3);",
                params![
                    department.uuid.to_string(),
                    department.code.as_str(),
                    department.name.as_str(),
                ],
            )
            .map_err(|err| map_unique_violation(err, "department", &department.code))?;
        Ok(department.uuid)
    }

    fn find_department_by_code(&self, code: &str) -> RepoResult<Option<Department>> {
        self.conn
            .query_row(
                "SELECT uuid, code, name FROM departments WHERE code = ?1;",
                [code],
                |row| {
                    Ok((
                        row.get::<_, String>("uuid")?,
                        row.get::<_, String>("code")?,
                        row.get::<_, String>("name")?,
                    ))
                },
            )
            .optional()?
            .map(|(uuid, code, name)| {
                Ok(Department {
                    uuid: parse_uuid(&uuid, "departments.uuid")?,
                    code,
                    name,
                })
            })
            .transpose()
    }

    fn list_departments(&self) -> RepoResult<Vec<Department>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, code, name FROM departments ORDER BY code ASC;")?;
        let mut rows = stmt.query([])?;
        let mut departments = Vec::new();
        while let Some(row) = rows.next()? {
            departments.push(parse_department_row(row)?);
        }
        Ok(departments)
    }

    fn create_project_type(&self, project_type: &ProjectType) -> RepoResult<ProjectTypeId> {
        project_type.validate()?;
        self.conn
            .execute(
                "INSERT INTO project_types (uuid, code, name) VALUES (?1, ?2, ?3);",
                params![
                    project_type.uuid.to_string(),
                    project_type.code.as_str(),
                    project_type.name.as_str(),
                ],
            )
            .map_err(|err| map_unique_violation(err, "project type", &project_type.code))?;
        Ok(project_type.uuid)
    }

    fn find_project_type_by_code(&self, code: &str) -> RepoResult<Option<ProjectType>> {
        self.conn
            .query_row(
                "SELECT uuid, code, name FROM project_types WHERE code = ?1;",
                [code],
                |row| {
                    Ok((
                        row.get::<_, String>("uuid")?,
                        row.get::<_, String>("code")?,
                        row.get::<_, String>("name")?,
                    ))
                },
            )
            .optional()?
            .map(|(uuid, code, name)| {
                Ok(ProjectType {
                    uuid: parse_uuid(&uuid, "project_types.uuid")?,
                    code,
                    name,
                })
            })
            .transpose()
    }

    fn list_project_types(&self) -> RepoResult<Vec<ProjectType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, code, name FROM project_types ORDER BY code ASC;")?;
        let mut rows = stmt.query([])?;
        let mut project_types = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid: String = row.get("uuid")?;
            project_types.push(ProjectType {
                uuid: parse_uuid(&uuid, "project_types.uuid")?,
                code: row.get("code")?,
                name: row.get("name")?,
            });
        }
        Ok(project_types)
    }

    fn create_funding_agency(&self, agency: &FundingAgency) -> RepoResult<FundingAgencyId> {
        agency.validate()?;
        self.conn
            .execute(
                "INSERT INTO funding_agencies (uuid, code, name) VALUES (?1, ?2, ?3);",
                params![
                    agency.uuid.to_string(),
                    agency.code.as_str(),
                    agency.name.as_str(),
                ],
            )
            .map_err(|err| map_unique_violation(err, "funding agency", &agency.code))?;
        Ok(agency.uuid)
    }

    fn find_funding_agency_by_code(&self, code: &str) -> RepoResult<Option<FundingAgency>> {
        self.conn
            .query_row(
                "SELECT uuid, code, name FROM funding_agencies WHERE code = ?1;",
                [code],
                |row| {
                    Ok((
                        row.get::<_, String>("uuid")?,
                        row.get::<_, String>("code")?,
                        row.get::<_, String>("name")?,
                    ))
                },
            )
            .optional()?
            .map(|(uuid, code, name)| {
                Ok(FundingAgency {
                    uuid: parse_uuid(&uuid, "funding_agencies.uuid")?,
                    code,
                    name,
                })
            })
            .transpose()
    }

    fn list_funding_agencies(&self) -> RepoResult<Vec<FundingAgency>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uuid, code, name FROM funding_agencies ORDER BY code ASC;")?;
        let mut rows = stmt.query([])?;
        let mut agencies = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid: String = row.get("uuid")?;
            agencies.push(FundingAgency {
                uuid: parse_uuid(&uuid, "funding_agencies.uuid")?,
                code: row.get("code")?,
                name: row.get("name")?,
            });
        }
        Ok(agencies)
    }
}

fn parse_department_row(row: &Row<'_>) -> RepoResult<Department> {
    let uuid: String = row.get("uuid")?;
    Ok(Department {
        uuid: parse_uuid(&uuid, "departments.uuid")?,
        code: row.get("code")?,
        name: row.get("name")?,
    })
}
