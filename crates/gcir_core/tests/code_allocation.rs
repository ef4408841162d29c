use chrono::NaiveDate;
use gcir_core::db::open_db_in_memory;
use gcir_core::{
    allocate_external_investigator_code, allocate_proposal_code, CatalogRepository, CodeError,
    Department, FundingAgency, InvestigatorRepository, NewExternalInvestigator, NewProposal,
    ProjectType, ProposalCodeKey, ProposalRepository, RepoError, SqliteCatalogRepository,
    SqliteInvestigatorRepository, SqliteProposalRepository,
};
use rusqlite::{Connection, TransactionBehavior};

fn seed_catalog(conn: &Connection) {
    let catalog = SqliteCatalogRepository::try_new(conn).unwrap();
    catalog
        .create_department(&Department::new("CS", "Computer Science"))
        .unwrap();
    catalog
        .create_department(&Department::new("ME", "Mechanical Engineering"))
        .unwrap();
    catalog
        .create_project_type(&ProjectType::new("IND", "Industry"))
        .unwrap();
    catalog
        .create_project_type(&ProjectType::new("GOV", "Government"))
        .unwrap();
    catalog
        .create_funding_agency(&FundingAgency::new("NSF", "National Science Foundation"))
        .unwrap();
}

fn request(dept: &str, project_type: &str, year: i32) -> NewProposal {
    let mut request = NewProposal::draft("Sensor mesh study", dept, project_type);
    request.year = Some(year);
    request
}

#[test]
fn first_code_on_empty_store_starts_at_one() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();

    let proposal = repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    assert_eq!(proposal.gcir_code, "G-2025-CS-IND-0001");
}

#[test]
fn second_allocation_increments_serial() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();

    repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    let second = repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    assert_eq!(second.gcir_code, "G-2025-CS-IND-0002");
}

#[test]
fn funding_agency_presence_defines_its_own_partition() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();

    repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    repo.create_proposal(&request("CS", "IND", 2025)).unwrap();

    let mut with_agency = request("CS", "IND", 2025);
    with_agency.funding_agency_code = Some("NSF".to_string());
    let proposal = repo.create_proposal(&with_agency).unwrap();
    assert_eq!(proposal.gcir_code, "G-2025-CS-IND-NSF-0001");

    // The no-agency sequence is unaffected by the agency-scoped one.
    let next_plain = repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    assert_eq!(next_plain.gcir_code, "G-2025-CS-IND-0003");
}

#[test]
fn department_type_and_year_each_scope_their_own_sequence() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();

    repo.create_proposal(&request("CS", "IND", 2025)).unwrap();

    let other_dept = repo.create_proposal(&request("ME", "IND", 2025)).unwrap();
    assert_eq!(other_dept.gcir_code, "G-2025-ME-IND-0001");

    let other_type = repo.create_proposal(&request("CS", "GOV", 2025)).unwrap();
    assert_eq!(other_type.gcir_code, "G-2025-CS-GOV-0001");

    let other_year = repo.create_proposal(&request("CS", "IND", 2026)).unwrap();
    assert_eq!(other_year.gcir_code, "G-2026-CS-IND-0001");
}

#[test]
fn application_date_year_is_used_when_no_explicit_year() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();

    let mut backfill = NewProposal::draft("Archived collaboration", "CS", "IND");
    backfill.application_date = NaiveDate::from_ymd_opt(2023, 11, 30);
    let proposal = repo.create_proposal(&backfill).unwrap();
    assert_eq!(proposal.gcir_code, "G-2023-CS-IND-0001");
}

#[test]
fn explicit_code_is_kept_and_steers_the_next_serial() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();

    let mut explicit = request("CS", "IND", 2025);
    explicit.gcir_code = Some("G-2025-CS-IND-0099".to_string());
    let kept = repo.create_proposal(&explicit).unwrap();
    assert_eq!(kept.gcir_code, "G-2025-CS-IND-0099");

    let next = repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    assert_eq!(next.gcir_code, "G-2025-CS-IND-0100");
}

#[test]
fn malformed_existing_codes_are_skipped_not_fatal() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);

    let (dept_uuid, type_uuid) = {
        let catalog = SqliteCatalogRepository::try_new(&conn).unwrap();
        (
            catalog
                .find_department_by_code("CS")
                .unwrap()
                .unwrap()
                .uuid
                .to_string(),
            catalog
                .find_project_type_by_code("IND")
                .unwrap()
                .unwrap()
                .uuid
                .to_string(),
        )
    };
    conn.execute(
        "INSERT INTO proposals (uuid, gcir_code, title, department_uuid, project_type_uuid)
         VALUES ('00000000-0000-4000-8000-000000000042', 'G-2025-CS-IND-LEGACY',
                 'Imported legacy row', ?1, ?2);",
        [dept_uuid.as_str(), type_uuid.as_str()],
    )
    .unwrap();

    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();
    let first = repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    assert_eq!(first.gcir_code, "G-2025-CS-IND-0001");
}

#[test]
fn serial_grows_past_four_digits_without_erroring() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();

    let mut near_limit = request("CS", "IND", 2025);
    near_limit.gcir_code = Some("G-2025-CS-IND-9999".to_string());
    repo.create_proposal(&near_limit).unwrap();

    let next = repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    assert_eq!(next.gcir_code, "G-2025-CS-IND-10000");
}

#[test]
fn unknown_partition_components_abort_allocation() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);

    {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        let mut key = ProposalCodeKey::new("XX", "IND");
        key.year = Some(2025);
        let err = allocate_proposal_code(&tx, &key).unwrap_err();
        assert!(matches!(err, CodeError::UnknownDepartment(code) if code == "XX"));

        let mut key = ProposalCodeKey::new("CS", "XX");
        key.year = Some(2025);
        let err = allocate_proposal_code(&tx, &key).unwrap_err();
        assert!(matches!(err, CodeError::UnknownProjectType(code) if code == "XX"));

        let mut key = ProposalCodeKey::new("CS", "IND");
        key.year = Some(2025);
        key.funding_agency_code = Some("XX".to_string());
        let err = allocate_proposal_code(&tx, &key).unwrap_err();
        assert!(matches!(err, CodeError::UnknownFundingAgency(code) if code == "XX"));
    }

    // The repository path surfaces the same failure before persisting.
    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();
    let err = repo.create_proposal(&request("XX", "IND", 2025)).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            entity: "department",
            ..
        }
    ));
}

#[test]
fn abandoned_allocation_is_never_persisted_and_serial_is_reissued() {
    let mut conn = open_db_in_memory().unwrap();
    seed_catalog(&conn);

    {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        let mut key = ProposalCodeKey::new("CS", "IND");
        key.year = Some(2025);
        let code = allocate_proposal_code(&tx, &key).unwrap();
        assert_eq!(code, "G-2025-CS-IND-0001");
        tx.rollback().unwrap();
    }

    let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();
    let proposal = repo.create_proposal(&request("CS", "IND", 2025)).unwrap();
    assert_eq!(proposal.gcir_code, "G-2025-CS-IND-0001");
}

#[test]
fn external_codes_allocate_from_a_single_global_sequence() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteInvestigatorRepository::try_new(&mut conn).unwrap();

    let first = repo
        .create_external_investigator(&NewExternalInvestigator::named("Prof. David Kumar"))
        .unwrap();
    assert_eq!(first.code, "E0001");

    let second = repo
        .create_external_investigator(&NewExternalInvestigator::named("Prof. Eva Rodriguez"))
        .unwrap();
    assert_eq!(second.code, "E0002");
}

#[test]
fn explicit_external_code_is_kept_and_steers_the_next_serial() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteInvestigatorRepository::try_new(&mut conn).unwrap();

    let mut explicit = NewExternalInvestigator::named("Prof. David Kumar");
    explicit.code = Some("E0099".to_string());
    let kept = repo.create_external_investigator(&explicit).unwrap();
    assert_eq!(kept.code, "E0099");

    let next = repo
        .create_external_investigator(&NewExternalInvestigator::named("Prof. Eva Rodriguez"))
        .unwrap();
    assert_eq!(next.code, "E0100");
}

#[test]
fn malformed_external_codes_are_skipped_in_the_scan() {
    let mut conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO external_investigators (uuid, code, name)
         VALUES ('00000000-0000-4000-8000-000000000099', 'EXT-LEGACY', 'Imported row');",
        [],
    )
    .unwrap();

    {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();
        let code = allocate_external_investigator_code(&tx).unwrap();
        assert_eq!(code, "E0001");
    }
}
