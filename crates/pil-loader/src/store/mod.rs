//! Persistent-store boundary for the pipeline.
//!
//! The pipeline only ever sees the [`PatientStore`] trait. The production
//! backend is [`postgres::PgPatientStore`]; [`memory::MemoryStore`] backs
//! the test suite.

use crate::models::{EmailTask, PatientRecord, StoredPatient, UpsertOutcome};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

/// Errors raised at the store boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("patient {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Backend(String),
}

/// Store operations the pipeline depends on.
///
/// Connection lifecycle, timeouts and retry behavior are the backend's
/// responsibility; the pipeline treats every error as described in the
/// loader error taxonomy.
#[async_trait]
pub trait PatientStore: Send + Sync {
    /// Execute one batch as insert-or-merge by natural key. Each record
    /// either inserts a new patient or replaces the fields of the existing
    /// one matched by `member_id`. Returns the identities that were newly
    /// inserted.
    async fn bulk_upsert(&self, batch: &[PatientRecord]) -> Result<UpsertOutcome, StoreError>;

    /// Fetch one persisted patient by identity.
    async fn find_patient(&self, id: Uuid) -> Result<StoredPatient, StoreError>;

    /// Persist a series of scheduled emails.
    async fn create_tasks(&self, tasks: &[EmailTask]) -> Result<(), StoreError>;

    /// Write the full ordered list of email references onto one patient in
    /// a single linking update.
    async fn link_tasks(&self, patient_id: Uuid, task_ids: &[Uuid]) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: PatientStore> PatientStore for &T {
    async fn bulk_upsert(&self, batch: &[PatientRecord]) -> Result<UpsertOutcome, StoreError> {
        (**self).bulk_upsert(batch).await
    }

    async fn find_patient(&self, id: Uuid) -> Result<StoredPatient, StoreError> {
        (**self).find_patient(id).await
    }

    async fn create_tasks(&self, tasks: &[EmailTask]) -> Result<(), StoreError> {
        (**self).create_tasks(tasks).await
    }

    async fn link_tasks(&self, patient_id: Uuid, task_ids: &[Uuid]) -> Result<(), StoreError> {
        (**self).link_tasks(patient_id, task_ids).await
    }
}
