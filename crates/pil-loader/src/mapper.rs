//! Header-driven mapping from raw rows to normalized patient records.
//!
//! Pure functions, no validation: malformed or missing columns yield absent
//! fields, values are copied verbatim with no type coercion.

use crate::models::PatientRecord;
use crate::source::Header;
use csv_async::StringRecord;
use std::collections::BTreeMap;

/// Fold one header column name into the run-wide field-name convention:
/// lowercase words joined with underscores.
///
/// `"Member ID"` -> `member_id`, `"Address 1"` -> `address_1`,
/// `"dateOfBirth"` -> `date_of_birth`.
pub fn normalize_field(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut pending_break = false;
    let mut prev_lower = false;

    for ch in column.chars() {
        if !ch.is_alphanumeric() {
            pending_break = true;
            continue;
        }
        let camel_break = ch.is_uppercase() && prev_lower;
        if (pending_break || camel_break) && !out.is_empty() {
            out.push('_');
        }
        pending_break = false;
        prev_lower = ch.is_lowercase() || ch.is_numeric();
        out.extend(ch.to_lowercase());
    }

    out
}

/// Map one raw row into a normalized record.
///
/// The natural key is read under its original column name because it is
/// used for matching, not as a mapped field. Cells missing from a short row
/// yield absent fields; cells beyond the header are ignored.
pub fn map_row(header: &Header, row: &StringRecord, member_id_column: &str) -> PatientRecord {
    let mut fields = BTreeMap::new();
    for (idx, column) in header.columns().iter().enumerate() {
        if let Some(value) = row.get(idx) {
            fields.insert(normalize_field(column), value.to_string());
        }
    }

    let member_id = header
        .index_of(member_id_column)
        .and_then(|idx| row.get(idx))
        .unwrap_or_default()
        .to_string();

    PatientRecord { member_id, fields }
}
