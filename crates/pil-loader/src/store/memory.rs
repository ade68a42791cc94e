//! In-memory patient store backing the test suite.
//!
//! Mirrors the Postgres semantics (insert-or-merge by member id, link list
//! replacement) and additionally records observations the tests assert on:
//! the largest batch ever written and whether two bulk writes were in
//! flight at once. Failures can be injected per member id or for a specific
//! bulk write.

use super::{PatientStore, StoreError};
use crate::models::{EmailTask, PatientRecord, StoredPatient, UpsertOutcome};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// One persisted patient row.
#[derive(Debug, Clone)]
pub struct PatientRow {
    pub id: Uuid,
    pub member_id: String,
    pub fields: BTreeMap<String, String>,
    pub email_ids: Vec<Uuid>,
}

#[derive(Default)]
struct Inner {
    patients: Vec<PatientRow>,
    tasks: Vec<EmailTask>,
    fail_find: HashSet<String>,
    fail_link: HashSet<String>,
    fail_bulk_at: Option<usize>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    write_in_flight: AtomicBool,
    max_batch_seen: AtomicUsize,
    bulk_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make consent fetches fail for the patient with this member id.
    pub fn fail_find_for(&self, member_id: &str) {
        self.lock().fail_find.insert(member_id.to_string());
    }

    /// Make the linking update fail for the patient with this member id.
    pub fn fail_link_for(&self, member_id: &str) {
        self.lock().fail_link.insert(member_id.to_string());
    }

    /// Make the n-th bulk upsert fail, counting from 1.
    pub fn fail_bulk_write(&self, n: usize) {
        self.lock().fail_bulk_at = Some(n);
    }

    pub fn patients(&self) -> Vec<PatientRow> {
        self.lock().patients.clone()
    }

    pub fn patient_by_member(&self, member_id: &str) -> Option<PatientRow> {
        self.lock()
            .patients
            .iter()
            .find(|p| p.member_id == member_id)
            .cloned()
    }

    pub fn tasks(&self) -> Vec<EmailTask> {
        self.lock().tasks.clone()
    }

    pub fn tasks_for(&self, patient_id: Uuid) -> Vec<EmailTask> {
        self.lock()
            .tasks
            .iter()
            .filter(|t| t.patient_id == patient_id)
            .cloned()
            .collect()
    }

    /// Largest batch handed to `bulk_upsert` so far.
    pub fn max_batch_seen(&self) -> usize {
        self.max_batch_seen.load(Ordering::SeqCst)
    }

    /// Number of bulk upserts executed.
    pub fn bulk_writes(&self) -> usize {
        self.bulk_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn bulk_upsert(&self, batch: &[PatientRecord]) -> Result<UpsertOutcome, StoreError> {
        if self.write_in_flight.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Backend(
                "overlapping bulk writes detected".to_string(),
            ));
        }
        // Let another batch slip in if the caller ever violates the
        // one-in-flight invariant.
        tokio::task::yield_now().await;

        self.max_batch_seen.fetch_max(batch.len(), Ordering::SeqCst);
        let write_index = self.bulk_writes.fetch_add(1, Ordering::SeqCst) + 1;

        let result = {
            let mut inner = self.lock();
            if inner.fail_bulk_at == Some(write_index) {
                Err(StoreError::Backend(
                    "injected bulk write failure".to_string(),
                ))
            } else {
                let mut inserted = Vec::new();
                for record in batch {
                    match inner
                        .patients
                        .iter_mut()
                        .find(|p| p.member_id == record.member_id)
                    {
                        Some(existing) => {
                            existing.fields = record.fields.clone();
                        }
                        None => {
                            let id = Uuid::new_v4();
                            inner.patients.push(PatientRow {
                                id,
                                member_id: record.member_id.clone(),
                                fields: record.fields.clone(),
                                email_ids: Vec::new(),
                            });
                            inserted.push(id);
                        }
                    }
                }
                Ok(UpsertOutcome { inserted })
            }
        };

        self.write_in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn find_patient(&self, id: Uuid) -> Result<StoredPatient, StoreError> {
        let inner = self.lock();
        let patient = inner
            .patients
            .iter()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;

        if inner.fail_find.contains(&patient.member_id) {
            return Err(StoreError::Backend(
                "injected find failure".to_string(),
            ));
        }

        Ok(StoredPatient {
            id: patient.id,
            member_id: patient.member_id.clone(),
            consent: patient.fields.get("consent").cloned(),
        })
    }

    async fn create_tasks(&self, tasks: &[EmailTask]) -> Result<(), StoreError> {
        self.lock().tasks.extend_from_slice(tasks);
        Ok(())
    }

    async fn link_tasks(&self, patient_id: Uuid, task_ids: &[Uuid]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let fail = inner
            .patients
            .iter()
            .find(|p| p.id == patient_id)
            .map(|p| inner.fail_link.contains(&p.member_id));

        match fail {
            None => Err(StoreError::NotFound(patient_id)),
            Some(true) => Err(StoreError::Backend(
                "injected link failure".to_string(),
            )),
            Some(false) => {
                if let Some(patient) = inner.patients.iter_mut().find(|p| p.id == patient_id) {
                    patient.email_ids = task_ids.to_vec();
                }
                Ok(())
            }
        }
    }
}
