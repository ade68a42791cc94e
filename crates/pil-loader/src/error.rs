//! Error taxonomy for the loader pipeline.
//!
//! Every variant here is run-fatal: it rejects `execute()` and no further
//! rows are processed. Per-identity failures inside a scheduling cascade
//! (consent fetch, email creation) are recovered locally and only logged;
//! see `scheduler`.

use crate::store::StoreError;
use thiserror::Error;

/// Run-fatal error kinds.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Required construction parameters absent or invalid. Raised before
    /// any I/O happens.
    #[error("missing or invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to read source file: {0}")]
    SourceRead(#[from] csv_async::Error),

    #[error("source file I/O error: {0}")]
    SourceIo(#[from] std::io::Error),

    /// The stream ended having produced zero data rows. An empty file is an
    /// input error, not a vacuous success.
    #[error("source file contains no data rows")]
    EmptySource,

    /// The bulk upsert failed. Not retried.
    #[error("bulk upsert failed: {0}")]
    SinkWrite(#[source] StoreError),

    /// One or more patients in a batch were left with scheduled emails that
    /// could not be linked back. Surfaced after the cascade settles so
    /// sibling patients still complete their own linking.
    #[error("failed to link scheduled emails for {failed} patient(s)")]
    LinkingFailed { failed: usize },
}
