//! Loader configuration.

use crate::error::LoaderError;
use std::path::PathBuf;

// ============================================================================
// Loader Configuration Constants
// ============================================================================

/// Default number of records per bulk upsert.
pub const DEFAULT_BULK_RECORDS: usize = 1000;

/// Default number of follow-up emails scheduled per consenting patient.
pub const DEFAULT_EMAILS_PER_PATIENT: u32 = 4;

/// Default field delimiter of the flat file.
pub const DEFAULT_DELIMITER: u8 = b'|';

/// Default header column holding the natural key.
pub const DEFAULT_MEMBER_ID_COLUMN: &str = "Member ID";

/// Pipeline configuration, validated before any I/O happens.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Path to the delimited input file.
    pub file_name: PathBuf,
    /// Batch size B: how many records accumulate before a flush.
    pub bulk_records: usize,
    /// Number of emails in the follow-up series.
    pub emails_per_patient: u32,
    /// Single-byte field delimiter.
    pub delimiter: u8,
    /// Header column the natural key is read from, under its original
    /// (un-normalized) name.
    pub member_id_column: String,
}

impl LoaderConfig {
    /// Create a configuration with the required parameters and defaults for
    /// the rest. Fails fast on invalid input.
    pub fn new(file_name: impl Into<PathBuf>, bulk_records: usize) -> Result<Self, LoaderError> {
        let config = Self {
            file_name: file_name.into(),
            bulk_records,
            emails_per_patient: DEFAULT_EMAILS_PER_PATIENT,
            delimiter: DEFAULT_DELIMITER,
            member_id_column: DEFAULT_MEMBER_ID_COLUMN.to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_emails_per_patient(mut self, emails: u32) -> Self {
        self.emails_per_patient = emails;
        self
    }

    /// Set the field delimiter. Must be a single ASCII character.
    pub fn with_delimiter(mut self, delimiter: char) -> Result<Self, LoaderError> {
        if !delimiter.is_ascii() {
            return Err(LoaderError::Configuration(format!(
                "delimiter must be a single ASCII character, got {delimiter:?}"
            )));
        }
        self.delimiter = delimiter as u8;
        Ok(self)
    }

    pub fn with_member_id_column(mut self, column: impl Into<String>) -> Self {
        self.member_id_column = column.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.file_name.as_os_str().is_empty() {
            return Err(LoaderError::Configuration(
                "file name must not be empty".to_string(),
            ));
        }

        if self.bulk_records == 0 {
            return Err(LoaderError::Configuration(
                "bulk record count must be at least 1".to_string(),
            ));
        }

        if self.emails_per_patient == 0 {
            return Err(LoaderError::Configuration(
                "emails per patient must be at least 1".to_string(),
            ));
        }

        if self.member_id_column.is_empty() {
            return Err(LoaderError::Configuration(
                "member id column must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::new("patients.csv", 500).unwrap();
        assert_eq!(config.bulk_records, 500);
        assert_eq!(config.emails_per_patient, DEFAULT_EMAILS_PER_PATIENT);
        assert_eq!(config.delimiter, b'|');
        assert_eq!(config.member_id_column, "Member ID");
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = LoaderConfig::new("patients.csv", 0).unwrap_err();
        assert!(matches!(err, LoaderError::Configuration(_)));
    }

    #[test]
    fn test_empty_file_name_rejected() {
        let err = LoaderConfig::new("", 10).unwrap_err();
        assert!(matches!(err, LoaderError::Configuration(_)));
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let err = LoaderConfig::new("patients.csv", 10)
            .unwrap()
            .with_delimiter('§')
            .unwrap_err();
        assert!(matches!(err, LoaderError::Configuration(_)));
    }

    #[test]
    fn test_zero_emails_rejected() {
        let config = LoaderConfig::new("patients.csv", 10)
            .unwrap()
            .with_emails_per_patient(0);
        assert!(config.validate().is_err());
    }
}
