//! Row mapping for the counting tables.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, ToSql};

use crate::models::{IssuanceCountEntry, OrderCountEntry};

/// Read a unix-microsecond column as a UTC timestamp.
///
/// Out-of-range values (from corruption or hand edits) become a row error
/// instead of a panic.
fn get_micros(row: &Row, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(col)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(col, micros))
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub const ISSUANCE_COUNT_COLS: &str = "bucket, observed_at";

pub const ORDER_COUNT_COLS: &str = "account_id, observed_at";

impl FromRow for IssuanceCountEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(IssuanceCountEntry {
            bucket: row.get(0)?,
            observed_at: get_micros(row, 1)?,
        })
    }
}

impl FromRow for OrderCountEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderCountEntry {
            account_id: row.get(0)?,
            observed_at: get_micros(row, 1)?,
        })
    }
}
