//! Transaction persistence and reconciliation reads
//!
//! Writes happen only through `insert_batch`, one SQLite transaction per
//! batch: a uniqueness collision on the business transaction id fails the
//! whole batch. Reads are append-only consumers (reconciliation reports).

use chrono::NaiveDate;
use rusqlite::{OptionalExtension, Row, params};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::records::Transaction;
use crate::store::Store;

const DATE_FMT: &str = "%Y-%m-%d";

/// Aggregated amount for one shipping city
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityTotal {
    pub city: String,
    pub total: Decimal,
}

impl Store {
    /// Insert a batch of transactions atomically
    ///
    /// All rows land or none do; the caller decides what to do with a
    /// failed batch (the pipeline logs and abandons it).
    pub fn insert_batch(&self, batch: &[Transaction]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(rows = batch.len(), file_id = %batch[0].file_id, "insert_batch");

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transactions
                     (id, file_id, transaction_id, transaction_date, amount,
                      customer_name, payment_method, shipping_city)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for t in batch {
                stmt.execute(params![
                    t.id.to_string(),
                    t.file_id.to_string(),
                    t.transaction_id,
                    t.transaction_date.format(DATE_FMT).to_string(),
                    t.amount.to_string(),
                    t.customer_name,
                    t.payment_method,
                    t.shipping_city,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All transactions materialized from one file
    pub fn transactions_for_file(&self, file_id: Uuid) -> Result<Vec<Transaction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, transaction_id, transaction_date, amount,
                    customer_name, payment_method, shipping_city
               FROM transactions WHERE file_id = ?1 ORDER BY transaction_id",
        )?;
        let rows = stmt.query_map(params![file_id.to_string()], map_txn_row)?;
        rows.map(|r| r?).collect()
    }

    /// Number of transactions materialized from one file
    pub fn count_for_file(&self, file_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM transactions WHERE file_id = ?1",
            params![file_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Look up a transaction by its business id
    pub fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Transaction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, transaction_id, transaction_date, amount,
                    customer_name, payment_method, shipping_city
               FROM transactions WHERE transaction_id = ?1",
        )?;
        let row = stmt
            .query_row(params![transaction_id], map_txn_row)
            .optional()?;
        row.transpose()
    }

    /// Paginated transactions within an inclusive date range (1-based page)
    pub fn transactions_for_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        page: usize,
        size: usize,
    ) -> Result<Vec<Transaction>> {
        let offset = page.saturating_sub(1).saturating_mul(size);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, file_id, transaction_id, transaction_date, amount,
                    customer_name, payment_method, shipping_city
               FROM transactions
              WHERE transaction_date >= ?1 AND transaction_date <= ?2
              ORDER BY transaction_date, transaction_id
              LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(
            params![
                start.format(DATE_FMT).to_string(),
                end.format(DATE_FMT).to_string(),
                size as i64,
                offset as i64,
            ],
            map_txn_row,
        )?;
        rows.map(|r| r?).collect()
    }

    /// Gross amount over an inclusive date range
    ///
    /// Amounts are stored as exact decimal strings, so the sum is computed
    /// in Rust rather than with SQLite's float arithmetic.
    pub fn total_amount_for_period(&self, start: NaiveDate, end: NaiveDate) -> Result<Decimal> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT amount FROM transactions
              WHERE transaction_date >= ?1 AND transaction_date <= ?2",
        )?;
        let amounts = stmt.query_map(
            params![start.format(DATE_FMT).to_string(), end.format(DATE_FMT).to_string()],
            |row| row.get::<_, String>(0),
        )?;

        let mut total = Decimal::ZERO;
        for amount in amounts {
            total += parse_amount(&amount?)?;
        }
        Ok(total)
    }

    /// Per-city totals over an inclusive date range, sorted by city name
    pub fn totals_by_city(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CityTotal>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT shipping_city, amount FROM transactions
              WHERE transaction_date >= ?1 AND transaction_date <= ?2",
        )?;
        let rows = stmt.query_map(
            params![start.format(DATE_FMT).to_string(), end.format(DATE_FMT).to_string()],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;

        let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
        for row in rows {
            let (city, amount) = row?;
            *totals.entry(city).or_insert(Decimal::ZERO) += parse_amount(&amount)?;
        }
        Ok(totals
            .into_iter()
            .map(|(city, total)| CityTotal { city, total })
            .collect())
    }
}

fn parse_amount(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| StoreError::Corrupt(format!("bad amount {s:?}: {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .map_err(|e| StoreError::Corrupt(format!("bad date {s:?}: {e}")))
}

fn map_txn_row(row: &Row<'_>) -> rusqlite::Result<Result<Transaction>> {
    let id: String = row.get(0)?;
    let file_id: String = row.get(1)?;
    let date: String = row.get(3)?;
    let amount: String = row.get(4)?;

    Ok((|| {
        Ok(Transaction {
            id: Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt(format!("bad row id {id:?}: {e}")))?,
            file_id: Uuid::parse_str(&file_id)
                .map_err(|e| StoreError::Corrupt(format!("bad file id {file_id:?}: {e}")))?,
            transaction_id: row_get(row, 2)?,
            transaction_date: parse_date(&date)?,
            amount: parse_amount(&amount)?,
            customer_name: row_get(row, 5)?,
            payment_method: row_get(row, 6)?,
            shipping_city: row_get(row, 7)?,
        })
    })())
}

fn row_get(row: &Row<'_>, idx: usize) -> Result<String> {
    row.get::<_, String>(idx).map_err(StoreError::from)
}
