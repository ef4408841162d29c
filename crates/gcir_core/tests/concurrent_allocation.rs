use gcir_core::db::open_db;
use gcir_core::{
    CatalogRepository, Department, InvestigatorRepository, NewExternalInvestigator, NewProposal,
    ProjectType, ProposalRepository, SqliteCatalogRepository, SqliteInvestigatorRepository,
    SqliteProposalRepository,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::thread;
use tempfile::TempDir;

const WRITERS: u32 = 8;

fn file_db() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gcir.sqlite3");
    // Open once up front so migrations run before any writer races.
    let conn = open_db(&path).unwrap();
    let catalog = SqliteCatalogRepository::try_new(&conn).unwrap();
    catalog
        .create_department(&Department::new("CS", "Computer Science"))
        .unwrap();
    catalog
        .create_project_type(&ProjectType::new("IND", "Industry"))
        .unwrap();
    (dir, path)
}

fn serial_tail(code: &str) -> u32 {
    code.rsplit('-').next().unwrap().parse().unwrap()
}

#[test]
fn concurrent_proposal_creations_yield_dense_unique_serials() {
    let (_dir, path) = file_db();

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = path.clone();
            thread::spawn(move || {
                let mut conn = open_db(&path).unwrap();
                let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();
                let mut request =
                    NewProposal::draft(format!("Concurrent proposal {writer}"), "CS", "IND");
                request.year = Some(2025);
                repo.create_proposal(&request).unwrap().gcir_code
            })
        })
        .collect();

    let codes: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let unique: HashSet<&String> = codes.iter().collect();
    assert_eq!(unique.len(), codes.len(), "duplicate code issued: {codes:?}");

    let serials: HashSet<u32> = codes.iter().map(|code| serial_tail(code)).collect();
    let expected: HashSet<u32> = (1..=WRITERS).collect();
    assert_eq!(serials, expected, "serials not dense: {codes:?}");

    for code in &codes {
        assert!(code.starts_with("G-2025-CS-IND-"), "bad prefix: {code}");
    }
}

#[test]
fn concurrent_external_investigator_codes_are_dense_and_unique() {
    let (_dir, path) = file_db();

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = path.clone();
            thread::spawn(move || {
                let mut conn = open_db(&path).unwrap();
                let mut repo = SqliteInvestigatorRepository::try_new(&mut conn).unwrap();
                let request =
                    NewExternalInvestigator::named(format!("Concurrent investigator {writer}"));
                repo.create_external_investigator(&request).unwrap().code
            })
        })
        .collect();

    let codes: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let serials: HashSet<u32> = codes
        .iter()
        .map(|code| code[1..].parse::<u32>().unwrap())
        .collect();
    let expected: HashSet<u32> = (1..=WRITERS).collect();
    assert_eq!(serials, expected, "serials not dense: {codes:?}");
}

#[test]
fn mixed_partition_writers_never_cross_sequences() {
    let (_dir, path) = file_db();

    {
        let conn = open_db(&path).unwrap();
        let catalog = SqliteCatalogRepository::try_new(&conn).unwrap();
        catalog
            .create_department(&Department::new("ME", "Mechanical Engineering"))
            .unwrap();
    }

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = path.clone();
            let dept = if writer % 2 == 0 { "CS" } else { "ME" };
            thread::spawn(move || {
                let mut conn = open_db(&path).unwrap();
                let mut repo = SqliteProposalRepository::try_new(&mut conn).unwrap();
                let mut request =
                    NewProposal::draft(format!("Partitioned proposal {writer}"), dept, "IND");
                request.year = Some(2025);
                repo.create_proposal(&request).unwrap().gcir_code
            })
        })
        .collect();

    let codes: Vec<String> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let expected: HashSet<u32> = (1..=WRITERS / 2).collect();
    for dept in ["CS", "ME"] {
        let prefix = format!("G-2025-{dept}-IND-");
        let serials: HashSet<u32> = codes
            .iter()
            .filter(|code| code.starts_with(&prefix))
            .map(|code| serial_tail(code))
            .collect();
        assert_eq!(serials, expected, "{dept} sequence not dense: {codes:?}");
    }
}
