//! Field mapper: from a user-declared column mapping to typed extraction
//!
//! The user declares `source column -> canonical field` pairs once per
//! file. `MappingTable::build` resolves that declaration against the actual
//! CSV header row into a table of `(canonical field, column index)` pairs,
//! so the per-row loops index into records directly instead of doing
//! string-keyed lookups per cell.

use chrono::NaiveDate;
use csv::StringRecord;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;
use txnstore::{FieldMapping, Transaction};
use uuid::Uuid;

/// The fixed transaction schema a CSV row is translated into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    TransactionId,
    TransactionDate,
    Amount,
    CustomerName,
    PaymentMethod,
    ShippingCity,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::TransactionId,
        CanonicalField::TransactionDate,
        CanonicalField::Amount,
        CanonicalField::CustomerName,
        CanonicalField::PaymentMethod,
        CanonicalField::ShippingCity,
    ];

    /// Display name used in mapping declarations
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::TransactionId => "TransactionID",
            CanonicalField::TransactionDate => "TransactionDate",
            CanonicalField::Amount => "Amount",
            CanonicalField::CustomerName => "CustomerName",
            CanonicalField::PaymentMethod => "PaymentMethod",
            CanonicalField::ShippingCity => "ShippingCity",
        }
    }

    /// Parse a declared canonical field name; accepts the display name and
    /// its snake_case alias.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TransactionID" | "transaction_id" => Some(CanonicalField::TransactionId),
            "TransactionDate" | "transaction_date" => Some(CanonicalField::TransactionDate),
            "Amount" | "amount" => Some(CanonicalField::Amount),
            "CustomerName" | "customer_name" => Some(CanonicalField::CustomerName),
            "PaymentMethod" | "payment_method" => Some(CanonicalField::PaymentMethod),
            "ShippingCity" | "shipping_city" | "shipping_address_city" => Some(CanonicalField::ShippingCity),
            _ => None,
        }
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row translated into the fixed transaction schema
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRow {
    pub transaction_id: String,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub customer_name: String,
    pub payment_method: String,
    pub shipping_city: String,
}

impl CanonicalRow {
    pub fn into_transaction(self, file_id: Uuid) -> Transaction {
        Transaction::new(
            file_id,
            self.transaction_id,
            self.transaction_date,
            self.amount,
            self.customer_name,
            self.payment_method,
            self.shipping_city,
        )
    }
}

/// Typed extraction table built once per file from the saved mapping
#[derive(Debug, Clone)]
pub struct MappingTable {
    /// `(canonical field, column index)` in declaration order
    columns: Vec<(CanonicalField, usize)>,
}

impl MappingTable {
    /// Resolve a saved mapping against the file's header row
    ///
    /// Unknown canonical names and source columns absent from the header
    /// are skipped with a warning; the declared fields that do resolve
    /// drive validation and materialization.
    pub fn build(mapping: &FieldMapping, headers: &StringRecord) -> Self {
        let mut columns = Vec::with_capacity(mapping.mappings.len());

        for (source, canonical) in &mapping.mappings {
            let Some(field) = CanonicalField::parse(canonical) else {
                warn!(%source, %canonical, "Ignoring mapping to unknown canonical field");
                continue;
            };
            let Some(idx) = headers.iter().position(|h| h == source) else {
                warn!(%source, %canonical, "Mapped column not present in CSV header row");
                continue;
            };
            // First declaration wins for a repeated canonical field
            if columns.iter().any(|(f, _)| *f == field) {
                warn!(%source, field = %field, "Canonical field already mapped, ignoring");
                continue;
            }
            columns.push((field, idx));
        }

        Self { columns }
    }

    /// Column index a canonical field was mapped to, if declared
    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, idx)| *idx)
    }

    /// Raw cell value for a canonical field, if declared and present
    pub fn value<'r>(&self, field: CanonicalField, record: &'r StringRecord) -> Option<&'r str> {
        self.column(field).and_then(|idx| record.get(idx))
    }

    /// Translate one record into a canonical row
    ///
    /// Returns `None` when any of the six fields is unmapped, missing, or
    /// unparseable; the materialization stage counts such rows as skipped.
    pub fn extract(&self, record: &StringRecord) -> Option<CanonicalRow> {
        let non_empty = |field| self.value(field, record).filter(|v| !v.is_empty());

        let transaction_id = non_empty(CanonicalField::TransactionId)?;
        let date_raw = non_empty(CanonicalField::TransactionDate)?;
        let amount_raw = non_empty(CanonicalField::Amount)?;
        let customer_name = non_empty(CanonicalField::CustomerName)?;
        let payment_method = non_empty(CanonicalField::PaymentMethod)?;
        let shipping_city = non_empty(CanonicalField::ShippingCity)?;

        Some(CanonicalRow {
            transaction_id: transaction_id.to_string(),
            transaction_date: NaiveDate::parse_from_str(date_raw, "%Y-%m-%d").ok()?,
            amount: Decimal::from_str(amount_raw).ok()?,
            customer_name: customer_name.to_string(),
            payment_method: payment_method.to_string(),
            shipping_city: shipping_city.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cols: &[&str]) -> StringRecord {
        StringRecord::from(cols.to_vec())
    }

    fn full_mapping() -> FieldMapping {
        FieldMapping::new(
            Uuid::new_v4(),
            vec![
                ("id".into(), "TransactionID".into()),
                ("date".into(), "TransactionDate".into()),
                ("amt".into(), "Amount".into()),
                ("name".into(), "CustomerName".into()),
                ("method".into(), "PaymentMethod".into()),
                ("city".into(), "ShippingCity".into()),
            ],
        )
    }

    #[test]
    fn test_build_resolves_declared_columns() {
        let table = MappingTable::build(
            &full_mapping(),
            &headers(&["id", "date", "amt", "name", "method", "city"]),
        );

        assert_eq!(table.column(CanonicalField::TransactionId), Some(0));
        assert_eq!(table.column(CanonicalField::ShippingCity), Some(5));
    }

    #[test]
    fn test_unknown_canonical_and_missing_source_are_skipped() {
        let mapping = FieldMapping::new(
            Uuid::new_v4(),
            vec![
                ("id".into(), "TransactionID".into()),
                ("x".into(), "NotAField".into()),
                ("missing".into(), "Amount".into()),
            ],
        );
        let table = MappingTable::build(&mapping, &headers(&["id", "date"]));

        assert_eq!(table.column(CanonicalField::TransactionId), Some(0));
        assert_eq!(table.column(CanonicalField::Amount), None);
    }

    #[test]
    fn test_snake_case_aliases_accepted() {
        assert_eq!(CanonicalField::parse("transaction_id"), Some(CanonicalField::TransactionId));
        assert_eq!(
            CanonicalField::parse("shipping_address_city"),
            Some(CanonicalField::ShippingCity)
        );
        assert_eq!(CanonicalField::parse("nope"), None);
    }

    #[test]
    fn test_extract_full_row() {
        let table = MappingTable::build(
            &full_mapping(),
            &headers(&["id", "date", "amt", "name", "method", "city"]),
        );
        let record = StringRecord::from(vec!["T1", "2024-01-05", "19.99", "Ada", "card", "Berlin"]);

        let row = table.extract(&record).unwrap();
        assert_eq!(row.transaction_id, "T1");
        assert_eq!(row.transaction_date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(row.amount, Decimal::from_str("19.99").unwrap());
        assert_eq!(row.shipping_city, "Berlin");
    }

    #[test]
    fn test_extract_rejects_incomplete_rows() {
        let table = MappingTable::build(
            &full_mapping(),
            &headers(&["id", "date", "amt", "name", "method", "city"]),
        );

        // Empty amount
        let record = StringRecord::from(vec!["T1", "2024-01-05", "", "Ada", "card", "Berlin"]);
        assert!(table.extract(&record).is_none());

        // Unparseable date
        let record = StringRecord::from(vec!["T1", "not-a-date", "1.00", "Ada", "card", "Berlin"]);
        assert!(table.extract(&record).is_none());
    }

    #[test]
    fn test_extract_requires_all_fields_mapped() {
        let mapping = FieldMapping::new(
            Uuid::new_v4(),
            vec![("id".into(), "TransactionID".into())],
        );
        let table = MappingTable::build(&mapping, &headers(&["id"]));
        let record = StringRecord::from(vec!["T1"]);

        assert!(table.extract(&record).is_none());
    }
}
