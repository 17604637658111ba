//! Row validation
//!
//! Pure functions over parsed CSV records: no I/O, no shared state. The
//! duplicate-id set lives for exactly one validation run, so a retry of the
//! same file starts from a clean slate.
//!
//! Row numbers in error strings are 1-based and count the header row as
//! row 1; the first data row is row 2.

use csv::StringRecord;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::mapping::{CanonicalField, MappingTable};

/// Format-only date check: `YYYY-MM-DD`. `2024-13-45` passes on purpose;
/// calendar validity is not this stage's job.
static DATE_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern compiles"));

/// Tracks duplicate transaction ids within a single validation run
#[derive(Debug, Default)]
pub struct SeenIds(HashSet<String>);

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id; returns false when the id was already seen
    fn insert(&mut self, id: &str) -> bool {
        self.0.insert(id.to_string())
    }
}

/// Validate every row of a file against its mapping table
///
/// `rows` pairs each record with its 1-based row number (header = row 1).
/// Returns the full ordered error list; an empty list means the file is
/// clean.
pub fn validate_rows<'a, I>(rows: I, table: &MappingTable) -> Vec<String>
where
    I: IntoIterator<Item = (u64, &'a StringRecord)>,
{
    let mut errors = Vec::new();
    let mut seen = SeenIds::new();
    for (row_number, record) in rows {
        validate_row(row_number, record, table, &mut seen, &mut errors);
    }
    errors
}

/// Apply the two mandatory checks to one row
///
/// Each check runs only when the mapping declares the corresponding
/// canonical field; each violation appends its own error string.
pub fn validate_row(
    row_number: u64,
    record: &StringRecord,
    table: &MappingTable,
    seen: &mut SeenIds,
    errors: &mut Vec<String>,
) {
    if table.column(CanonicalField::TransactionId).is_some() {
        let id = table.value(CanonicalField::TransactionId, record).unwrap_or("");
        if id.is_empty() || !seen.insert(id) {
            errors.push(format!("Row {row_number}: Duplicate or missing TransactionID."));
        }
    }

    if table.column(CanonicalField::TransactionDate).is_some() {
        let date = table.value(CanonicalField::TransactionDate, record).unwrap_or("");
        if !DATE_FORMAT.is_match(date) {
            errors.push(format!("Row {row_number}: Invalid date format."));
        }
    }
}
