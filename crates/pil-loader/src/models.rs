//! Core data types for the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Normalized patient record ready for upsert.
///
/// Built by the row mapper from one raw row. `member_id` is the natural key
/// used for insert-or-merge matching; `fields` maps normalized field names
/// to the raw values copied verbatim from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRecord {
    pub member_id: String,
    pub fields: BTreeMap<String, String>,
}

impl PatientRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Patient row as persisted by the store, as much of it as the scheduling
/// cascade needs. The upsert result does not carry arbitrary fields back,
/// so the consent flag requires this second read.
#[derive(Debug, Clone)]
pub struct StoredPatient {
    pub id: Uuid,
    pub member_id: String,
    pub consent: Option<String>,
}

/// One scheduled follow-up communication, immutable once created.
#[derive(Debug, Clone)]
pub struct EmailTask {
    pub id: Uuid,
    /// Owning patient. A lookup relation, not ownership.
    pub patient_id: Uuid,
    /// Sequence label, `Day 1` through `Day N`.
    pub name: String,
    /// Creation time plus the sequence index in days.
    pub scheduled_date: DateTime<Utc>,
}

/// Identities newly inserted (as opposed to merged) by one bulk upsert.
/// Only these participate in email scheduling; re-importing a known patient
/// never re-schedules communications.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    pub inserted: Vec<Uuid>,
}

/// Run-wide counters reported on successful completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub rows_seen: u64,
    pub records_upserted: u64,
    pub tasks_scheduled: u64,
}
