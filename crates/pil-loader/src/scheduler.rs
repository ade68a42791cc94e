//! Dependent-record scheduling: consent fetch, email creation, link-back.
//!
//! Runs once per flush cascade, after the bulk upsert has completed.
//! Sibling patients are processed concurrently; there is no ordering
//! requirement between them, only that the cascade as a whole settles
//! before the next batch is accepted.

use crate::models::EmailTask;
use crate::store::PatientStore;
use chrono::{Duration, Utc};
use futures::future::join_all;
use tracing::{debug, error};
use uuid::Uuid;

/// Literal consent value that opts a patient into the email series.
pub const CONSENT_AFFIRMATIVE: &str = "Y";

/// What happened to one batch's worth of newly inserted patients.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleOutcome {
    /// Emails created and linked.
    pub tasks_created: u64,
    /// Patients skipped because their consent could not be read or their
    /// emails could not be created. Logged, non-fatal.
    pub patients_skipped: u64,
    /// Patients whose emails were created but could not be linked back.
    /// The caller decides whether this fails the run.
    pub link_failures: u64,
}

/// Schedules the fixed follow-up series for consenting patients.
pub struct EmailScheduler {
    emails_per_patient: u32,
}

enum PatientOutcome {
    Scheduled(u64),
    NoConsent,
    Skipped,
    LinkFailed,
}

impl EmailScheduler {
    pub fn new(emails_per_patient: u32) -> Self {
        Self { emails_per_patient }
    }

    /// Run the cascade for the newly inserted identities of one batch.
    ///
    /// A consent-fetch failure skips that patient only; siblings proceed.
    /// Linking failures are counted and reported after every sibling has
    /// settled.
    pub async fn schedule<S: PatientStore>(&self, store: &S, inserted: &[Uuid]) -> ScheduleOutcome {
        let results = join_all(
            inserted
                .iter()
                .map(|&id| self.schedule_patient(store, id)),
        )
        .await;

        let mut outcome = ScheduleOutcome::default();
        for result in results {
            match result {
                PatientOutcome::Scheduled(count) => outcome.tasks_created += count,
                PatientOutcome::NoConsent => {}
                PatientOutcome::Skipped => outcome.patients_skipped += 1,
                PatientOutcome::LinkFailed => outcome.link_failures += 1,
            }
        }
        outcome
    }

    async fn schedule_patient<S: PatientStore>(&self, store: &S, id: Uuid) -> PatientOutcome {
        // The upsert result carries identities only, so consent needs a
        // second read from the store.
        let patient = match store.find_patient(id).await {
            Ok(patient) => patient,
            Err(e) => {
                error!(patient_id = %id, error = %e, "failed to read consent, skipping patient");
                return PatientOutcome::Skipped;
            }
        };

        if patient.consent.as_deref() != Some(CONSENT_AFFIRMATIVE) {
            debug!(
                patient_id = %id,
                member_id = %patient.member_id,
                "patient has not consented, no emails scheduled"
            );
            return PatientOutcome::NoConsent;
        }

        let created_at = Utc::now();
        let tasks: Vec<EmailTask> = (1..=self.emails_per_patient)
            .map(|day| EmailTask {
                id: Uuid::new_v4(),
                patient_id: id,
                name: format!("Day {day}"),
                scheduled_date: created_at + Duration::days(i64::from(day)),
            })
            .collect();

        if let Err(e) = store.create_tasks(&tasks).await {
            error!(
                patient_id = %id,
                member_id = %patient.member_id,
                error = %e,
                "failed to create scheduled emails, skipping patient"
            );
            return PatientOutcome::Skipped;
        }

        // All-or-nothing linkage: the full ordered id list in one update.
        let task_ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        if let Err(e) = store.link_tasks(id, &task_ids).await {
            error!(
                patient_id = %id,
                member_id = %patient.member_id,
                error = %e,
                "failed to link scheduled emails to patient"
            );
            return PatientOutcome::LinkFailed;
        }

        debug!(
            patient_id = %id,
            member_id = %patient.member_id,
            emails = tasks.len(),
            "emails scheduled and linked"
        );
        PatientOutcome::Scheduled(tasks.len() as u64)
    }
}
