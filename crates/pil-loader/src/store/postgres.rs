//! Postgres-backed patient store.
//!
//! Batch writes go through `sqlx::QueryBuilder` as a single multi-row
//! `INSERT ... ON CONFLICT (member_id) DO UPDATE`, with `(xmax = 0)` in the
//! `RETURNING` clause distinguishing freshly inserted rows from merged
//! ones.

use super::{PatientStore, StoreError};
use crate::models::{EmailTask, PatientRecord, StoredPatient, UpsertOutcome};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Columns of the `patients` table the flat file can populate, in insert
/// order. Every upsert binds all of them, so a merge replaces the full
/// field set of the matched row.
const PATIENT_COLUMNS: &[&str] = &[
    "program_identifier",
    "data_source",
    "card_number",
    "first_name",
    "last_name",
    "date_of_birth",
    "address_1",
    "address_2",
    "city",
    "state",
    "zip_code",
    "telephone_number",
    "email_address",
    "consent",
    "mobile_phone",
];

const CREATE_PATIENTS: &str = r#"
CREATE TABLE IF NOT EXISTS patients (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    member_id TEXT NOT NULL UNIQUE,
    program_identifier TEXT,
    data_source TEXT,
    card_number TEXT,
    first_name TEXT,
    last_name TEXT,
    date_of_birth TEXT,
    address_1 TEXT,
    address_2 TEXT,
    city TEXT,
    state TEXT,
    zip_code TEXT,
    telephone_number TEXT,
    email_address TEXT,
    consent TEXT,
    mobile_phone TEXT,
    email_ids UUID[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_SCHEDULED_EMAILS: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_emails (
    id UUID PRIMARY KEY,
    patient_id UUID NOT NULL REFERENCES patients(id),
    name TEXT NOT NULL,
    scheduled_date TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Patient store over a Postgres connection pool.
pub struct PgPatientStore {
    pool: PgPool,
}

impl PgPatientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `patients` and `scheduled_emails` tables if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_PATIENTS).execute(&self.pool).await?;
        sqlx::query(CREATE_SCHEDULED_EMAILS)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PatientStore for PgPatientStore {
    async fn bulk_upsert(&self, batch: &[PatientRecord]) -> Result<UpsertOutcome, StoreError> {
        if batch.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        // A single INSERT cannot touch the same row twice, so duplicate
        // natural keys within one batch collapse last-wins before binding.
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut deduped: Vec<&PatientRecord> = Vec::with_capacity(batch.len());
        for record in batch {
            match positions.entry(record.member_id.as_str()) {
                Entry::Occupied(entry) => deduped[*entry.get()] = record,
                Entry::Vacant(entry) => {
                    entry.insert(deduped.len());
                    deduped.push(record);
                }
            }
        }

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO patients (member_id");
        for column in PATIENT_COLUMNS {
            qb.push(", ");
            qb.push(column);
        }
        qb.push(") ");

        qb.push_values(deduped.iter(), |mut b, record| {
            b.push_bind(&record.member_id);
            for column in PATIENT_COLUMNS {
                b.push_bind(record.get(column));
            }
        });

        qb.push(" ON CONFLICT (member_id) DO UPDATE SET ");
        {
            let mut assignments = qb.separated(", ");
            for column in PATIENT_COLUMNS {
                assignments.push(format!("{column} = EXCLUDED.{column}"));
            }
            assignments.push("updated_at = now()");
        }
        qb.push(" RETURNING id, (xmax = 0) AS inserted");

        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut inserted = Vec::new();
        for row in &rows {
            if row.try_get::<bool, _>("inserted")? {
                inserted.push(row.try_get::<Uuid, _>("id")?);
            }
        }

        debug!(
            records = deduped.len(),
            newly_inserted = inserted.len(),
            "bulk upsert executed"
        );

        Ok(UpsertOutcome { inserted })
    }

    async fn find_patient(&self, id: Uuid) -> Result<StoredPatient, StoreError> {
        let row = sqlx::query("SELECT id, member_id, consent FROM patients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        Ok(StoredPatient {
            id: row.try_get("id")?,
            member_id: row.try_get("member_id")?,
            consent: row.try_get("consent")?,
        })
    }

    async fn create_tasks(&self, tasks: &[EmailTask]) -> Result<(), StoreError> {
        if tasks.is_empty() {
            return Ok(());
        }

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO scheduled_emails (id, patient_id, name, scheduled_date) ",
        );
        qb.push_values(tasks, |mut b, task| {
            b.push_bind(task.id)
                .push_bind(task.patient_id)
                .push_bind(&task.name)
                .push_bind(task.scheduled_date);
        });

        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn link_tasks(&self, patient_id: Uuid, task_ids: &[Uuid]) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE patients SET email_ids = $1, updated_at = now() WHERE id = $2")
                .bind(task_ids)
                .bind(patient_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(patient_id));
        }
        Ok(())
    }
}
