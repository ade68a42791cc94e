//! Pipeline orchestration.
//!
//! Drives the run through its phases: streaming rows from the source,
//! flushing full batches, draining the remainder at end-of-stream, and
//! resolving with a summary or rejecting with the first fatal error.
//! Backpressure is structural: the source is only polled between settled
//! cascades, so at most one batch is ever in flight against the store and
//! the in-memory buffer never exceeds the configured batch size.

use crate::batch::BatchAccumulator;
use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::mapper::map_row;
use crate::models::{PatientRecord, RunSummary};
use crate::scheduler::EmailScheduler;
use crate::source::RowSource;
use crate::store::PatientStore;
use tracing::{debug, error, info};

/// Streams one delimited patient file into the store and schedules
/// follow-up emails for newly inserted, consenting patients.
pub struct DataLoader<S> {
    config: LoaderConfig,
    store: S,
    scheduler: EmailScheduler,
}

impl<S: PatientStore> DataLoader<S> {
    /// Create a loader. Rejects invalid configuration before any I/O.
    pub fn new(config: LoaderConfig, store: S) -> Result<Self, LoaderError> {
        config.validate()?;
        let scheduler = EmailScheduler::new(config.emails_per_patient);
        Ok(Self {
            config,
            store,
            scheduler,
        })
    }

    /// Run the pipeline to completion.
    ///
    /// Resolves with the run summary once the final flush cascade has
    /// settled. On failure the run is aborted; batches already committed
    /// stay committed, there is no rollback.
    pub async fn execute(&self) -> Result<RunSummary, LoaderError> {
        info!(
            file = %self.config.file_name.display(),
            bulk_records = self.config.bulk_records,
            "starting patient import"
        );

        let mut source = RowSource::open(&self.config.file_name, self.config.delimiter).await?;
        debug!(columns = ?source.header().columns(), "header row");

        let mut batch = BatchAccumulator::new(self.config.bulk_records);
        let mut summary = RunSummary::default();

        while let Some(row) = source.next_row().await? {
            summary.rows_seen += 1;
            let record = map_row(source.header(), &row, &self.config.member_id_column);
            if let Some(full) = batch.push(record) {
                // The source stays unpolled until this settles.
                self.flush(full, &mut summary).await?;
            }
        }

        if summary.rows_seen == 0 {
            error!(file = %self.config.file_name.display(), "the source file is empty");
            return Err(LoaderError::EmptySource);
        }

        let remainder = batch.finish();
        if !remainder.is_empty() {
            self.flush(remainder, &mut summary).await?;
        }

        info!(
            rows_seen = summary.rows_seen,
            records_upserted = summary.records_upserted,
            tasks_scheduled = summary.tasks_scheduled,
            "patient import completed"
        );
        Ok(summary)
    }

    /// Flush one batch: bulk upsert, then the scheduling cascade for the
    /// newly inserted identities.
    async fn flush(
        &self,
        batch: Vec<PatientRecord>,
        summary: &mut RunSummary,
    ) -> Result<(), LoaderError> {
        let size = batch.len() as u64;

        let outcome = self
            .store
            .bulk_upsert(&batch)
            .await
            .map_err(LoaderError::SinkWrite)?;
        summary.records_upserted += size;
        info!(
            records = size,
            newly_inserted = outcome.inserted.len(),
            "patients uploaded"
        );

        let scheduled = self.scheduler.schedule(&self.store, &outcome.inserted).await;
        summary.tasks_scheduled += scheduled.tasks_created;
        if scheduled.tasks_created > 0 {
            info!(emails = scheduled.tasks_created, "emails scheduled");
        }

        // A half-linked patient is surfaced rather than letting the run
        // resolve successfully. Siblings have already settled at this point.
        if scheduled.link_failures > 0 {
            return Err(LoaderError::LinkingFailed {
                failed: scheduled.link_failures as usize,
            });
        }

        Ok(())
    }
}
