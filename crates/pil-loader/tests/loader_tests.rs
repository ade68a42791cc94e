//! End-to-end pipeline tests over the in-memory store.
//!
//! Each test writes a small pipe-delimited fixture file, runs the loader
//! against a `MemoryStore`, and asserts on the persisted patients, the
//! scheduled emails, and the run summary.

use chrono::Duration;
use pil_loader::config::LoaderConfig;
use pil_loader::loader::DataLoader;
use pil_loader::store::memory::MemoryStore;
use pil_loader::{LoaderError, RunSummary};
use std::io::Write;
use tempfile::NamedTempFile;

// ============================================================================
// Fixtures
// ============================================================================

const HEADER: &str = "Program Identifier|Data Source|Card Number|Member ID|First Name|Last Name|Date of Birth|Address 1|Address 2|City|State|Zip Code|Telephone Number|Email Address|CONSENT|Mobile Phone";

fn patient_row(member_id: &str, first_name: &str, consent: &str) -> String {
    format!(
        "P100|Web|C-1|{member_id}|{first_name}|Smith|1980-01-02|1 Main St||Omaha|NE|68046|555-0100|{member_id}@example.com|{consent}|555-0101"
    )
}

fn csv_file(rows: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    writeln!(file, "{HEADER}").expect("write header");
    for row in rows {
        writeln!(file, "{row}").expect("write row");
    }
    file.flush().expect("flush temp file");
    file
}

fn config_for(file: &NamedTempFile, bulk_records: usize) -> LoaderConfig {
    LoaderConfig::new(file.path(), bulk_records).expect("valid config")
}

async fn run(store: &MemoryStore, config: LoaderConfig) -> Result<RunSummary, LoaderError> {
    DataLoader::new(config, store)
        .expect("valid loader")
        .execute()
        .await
}

// ============================================================================
// Consent gating and linkage
// ============================================================================

#[tokio::test]
async fn test_schedules_four_emails_for_consenting_patients_only() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y"), patient_row("A200", "Bob", "N")]);
    let store = MemoryStore::new();

    let summary = run(&store, config_for(&file, 10)).await.expect("run succeeds");
    assert_eq!(
        summary,
        RunSummary {
            rows_seen: 2,
            records_upserted: 2,
            tasks_scheduled: 4,
        }
    );

    let consenting = store.patient_by_member("A100").expect("A100 exists");
    let declined = store.patient_by_member("A200").expect("A200 exists");

    let tasks = store.tasks_for(consenting.id);
    assert_eq!(tasks.len(), 4);
    assert!(tasks.iter().all(|t| t.patient_id == consenting.id));

    // Link completeness: the patient's list is exactly its tasks, in order.
    let task_ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
    assert_eq!(consenting.email_ids, task_ids);

    assert!(store.tasks_for(declined.id).is_empty());
    assert!(declined.email_ids.is_empty());
}

#[tokio::test]
async fn test_sequence_labels_and_dates() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y")]);
    let store = MemoryStore::new();

    run(&store, config_for(&file, 10)).await.expect("run succeeds");

    let patient = store.patient_by_member("A100").expect("A100 exists");
    let tasks = store.tasks_for(patient.id);

    let labels: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(labels, ["Day 1", "Day 2", "Day 3", "Day 4"]);

    // Each scheduled date minus its sequence index in days yields the same
    // creation instant across the whole series.
    let creation_times: Vec<_> = tasks
        .iter()
        .enumerate()
        .map(|(idx, t)| t.scheduled_date - Duration::days(idx as i64 + 1))
        .collect();
    assert!(creation_times.iter().all(|t| *t == creation_times[0]));
}

#[tokio::test]
async fn test_email_series_length_is_configurable() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y")]);
    let store = MemoryStore::new();

    let config = config_for(&file, 10).with_emails_per_patient(2);
    let summary = run(&store, config).await.expect("run succeeds");

    assert_eq!(summary.tasks_scheduled, 2);
    let patient = store.patient_by_member("A100").expect("A100 exists");
    let labels: Vec<_> = store
        .tasks_for(patient.id)
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(labels, ["Day 1", "Day 2"]);
}

// ============================================================================
// Idempotent upsert
// ============================================================================

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y"), patient_row("A200", "Bob", "N")]);
    let store = MemoryStore::new();

    let first = run(&store, config_for(&file, 10)).await.expect("first run");
    assert_eq!(first.tasks_scheduled, 4);

    let ids_after_first: Vec<_> = store.patients().iter().map(|p| p.id).collect();

    let second = run(&store, config_for(&file, 10)).await.expect("second run");
    assert_eq!(second.rows_seen, 2);
    assert_eq!(second.records_upserted, 2);
    // Pre-existing patients never gain new emails on re-import.
    assert_eq!(second.tasks_scheduled, 0);

    let ids_after_second: Vec<_> = store.patients().iter().map(|p| p.id).collect();
    assert_eq!(ids_after_first, ids_after_second);
    assert_eq!(store.tasks().len(), 4);
}

#[tokio::test]
async fn test_reimport_replaces_fields() {
    let first = csv_file(&[patient_row("A100", "Ann", "N")]);
    let second = csv_file(&[patient_row("A100", "Anna", "N")]);
    let store = MemoryStore::new();

    run(&store, config_for(&first, 10)).await.expect("first run");
    let before = store.patient_by_member("A100").expect("A100 exists");

    run(&store, config_for(&second, 10)).await.expect("second run");
    let after = store.patient_by_member("A100").expect("A100 exists");

    assert_eq!(before.id, after.id);
    assert_eq!(after.fields.get("first_name").map(String::as_str), Some("Anna"));
}

// ============================================================================
// Batching and backpressure
// ============================================================================

#[tokio::test]
async fn test_batch_boundary_with_repeated_key() {
    // B = 2, three rows, the third repeats the first natural key: the first
    // flush inserts both patients, the end-of-stream flush merges only.
    let file = csv_file(&[
        patient_row("A100", "Ann", "Y"),
        patient_row("A200", "Bob", "Y"),
        patient_row("A100", "Anna", "Y"),
    ]);
    let store = MemoryStore::new();

    let summary = run(&store, config_for(&file, 2)).await.expect("run succeeds");

    assert_eq!(summary.rows_seen, 3);
    assert_eq!(summary.records_upserted, 3);
    assert_eq!(summary.tasks_scheduled, 8);

    let patients = store.patients();
    assert_eq!(patients.len(), 2);
    assert_eq!(store.bulk_writes(), 2);

    let merged = store.patient_by_member("A100").expect("A100 exists");
    assert_eq!(merged.fields.get("first_name").map(String::as_str), Some("Anna"));
    // Still exactly one series despite the repeated row.
    assert_eq!(store.tasks_for(merged.id).len(), 4);
}

#[tokio::test]
async fn test_buffer_never_exceeds_batch_size() {
    let rows: Vec<String> = (0..5)
        .map(|n| patient_row(&format!("A{n}"), "Ann", "N"))
        .collect();
    let file = csv_file(&rows);
    let store = MemoryStore::new();

    let summary = run(&store, config_for(&file, 2)).await.expect("run succeeds");

    assert_eq!(summary.records_upserted, 5);
    // Flushes of 2, 2 and 1; the store rejects overlapping bulk writes, so
    // a successful run also proves single-writer sequencing.
    assert_eq!(store.bulk_writes(), 3);
    assert_eq!(store.max_batch_seen(), 2);
}

#[tokio::test]
async fn test_exact_multiple_of_batch_size_has_no_empty_final_flush() {
    let file = csv_file(&[patient_row("A100", "Ann", "N"), patient_row("A200", "Bob", "N")]);
    let store = MemoryStore::new();

    let summary = run(&store, config_for(&file, 2)).await.expect("run succeeds");
    assert_eq!(summary.records_upserted, 2);
    assert_eq!(store.bulk_writes(), 1);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_empty_file_rejects() {
    let file = NamedTempFile::new().expect("create temp file");
    let store = MemoryStore::new();

    let err = run(&store, config_for(&file, 10)).await.unwrap_err();
    assert!(matches!(err, LoaderError::EmptySource));
    assert!(store.patients().is_empty());
    assert!(store.tasks().is_empty());
}

#[tokio::test]
async fn test_header_only_file_rejects() {
    let file = csv_file(&[]);
    let store = MemoryStore::new();

    let err = run(&store, config_for(&file, 10)).await.unwrap_err();
    assert!(matches!(err, LoaderError::EmptySource));
    assert!(store.patients().is_empty());
}

#[tokio::test]
async fn test_bulk_upsert_failure_aborts_the_run() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y")]);
    let store = MemoryStore::new();
    store.fail_bulk_write(1);

    let err = run(&store, config_for(&file, 1)).await.unwrap_err();
    assert!(matches!(err, LoaderError::SinkWrite(_)));
    assert!(store.patients().is_empty());
    assert!(store.tasks().is_empty());
}

#[tokio::test]
async fn test_committed_batches_survive_a_later_failure() {
    let file = csv_file(&[patient_row("A100", "Ann", "N"), patient_row("A200", "Bob", "N")]);
    let store = MemoryStore::new();
    // First flush (B = 1) commits, then the second bulk write fails.
    store.fail_bulk_write(2);

    let err = run(&store, config_for(&file, 1)).await.unwrap_err();
    assert!(matches!(err, LoaderError::SinkWrite(_)));

    let patients = store.patients();
    assert_eq!(patients.len(), 1);
    assert_eq!(patients[0].member_id, "A100");
}

#[tokio::test]
async fn test_consent_fetch_failure_skips_patient_but_not_siblings() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y"), patient_row("A200", "Bob", "Y")]);
    let store = MemoryStore::new();
    store.fail_find_for("A100");

    let summary = run(&store, config_for(&file, 10)).await.expect("run succeeds");
    assert_eq!(summary.tasks_scheduled, 4);

    let skipped = store.patient_by_member("A100").expect("A100 exists");
    let sibling = store.patient_by_member("A200").expect("A200 exists");
    assert!(store.tasks_for(skipped.id).is_empty());
    assert_eq!(store.tasks_for(sibling.id).len(), 4);
    assert_eq!(sibling.email_ids.len(), 4);
}

#[tokio::test]
async fn test_link_failure_fails_the_run_after_siblings_settle() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y"), patient_row("A200", "Bob", "Y")]);
    let store = MemoryStore::new();
    store.fail_link_for("A100");

    let err = run(&store, config_for(&file, 10)).await.unwrap_err();
    assert!(matches!(err, LoaderError::LinkingFailed { failed: 1 }));

    // The sibling completed its own linking before the run was failed.
    let sibling = store.patient_by_member("A200").expect("A200 exists");
    assert_eq!(sibling.email_ids.len(), 4);

    let unlinked = store.patient_by_member("A100").expect("A100 exists");
    assert!(unlinked.email_ids.is_empty());
}

// ============================================================================
// Mapping
// ============================================================================

#[tokio::test]
async fn test_fields_are_normalized_and_copied_verbatim() {
    let file = csv_file(&[patient_row("A100", "Ann", "Y")]);
    let store = MemoryStore::new();

    run(&store, config_for(&file, 10)).await.expect("run succeeds");

    let patient = store.patient_by_member("A100").expect("A100 exists");
    assert_eq!(patient.fields.get("program_identifier").map(String::as_str), Some("P100"));
    assert_eq!(patient.fields.get("first_name").map(String::as_str), Some("Ann"));
    assert_eq!(patient.fields.get("zip_code").map(String::as_str), Some("68046"));
    assert_eq!(patient.fields.get("address_2").map(String::as_str), Some(""));
    assert_eq!(patient.fields.get("consent").map(String::as_str), Some("Y"));
}
