//! Streaming row source over a delimited flat file.
//!
//! Pull-based: the consumer asks for the next row and nothing is read until
//! it does. This is the backpressure contract. While a flush cascade is
//! outstanding the orchestrator simply does not poll, so the source cannot
//! emit, and row order is preserved across suspensions by construction.

use crate::error::LoaderError;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use std::path::Path;
use tokio::fs::File;

/// Ordered column names discovered from the first row of the file.
/// Immutable for the lifetime of one run.
#[derive(Debug, Clone, Default)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub(crate) fn from_record(record: &StringRecord) -> Self {
        Self {
            columns: record.iter().map(str::to_string).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column under its original (un-normalized) name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Finite, ordered source of raw rows. Not restartable mid-stream.
pub struct RowSource {
    reader: AsyncReader<File>,
    header: Header,
}

impl RowSource {
    /// Open the file and read the header row.
    pub async fn open(path: &Path, delimiter: u8) -> Result<Self, LoaderError> {
        let file = File::open(path).await?;

        // Rows with missing or extra cells are passed through as-is; the
        // mapper treats them as absent fields.
        let mut reader = AsyncReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .create_reader(file);

        let header = Header::from_record(reader.headers().await?);

        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Pull the next data row. `Ok(None)` is the terminal end event; an
    /// error is terminal too.
    pub async fn next_row(&mut self) -> Result<Option<StringRecord>, LoaderError> {
        let mut record = StringRecord::new();
        if self.reader.read_record(&mut record).await? {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}
