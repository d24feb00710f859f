//! Counting writes and windowed reads.
//!
//! Writes take a caller-owned [`Transaction`] and never commit or roll it back,
//! so the counting rows land or vanish together with the event they count.
//! Nothing here retries: after a failed write the transaction may hold some of
//! the rows, and only the caller can roll it back.
//!
//! Reads take a plain [`Connection`] and see committed state only.
//!
//! Cancellation noticed before any statement runs leaves the transaction
//! untouched. A write interrupted while its statement runs is different:
//! SQLite rolls back the whole transaction on its own, earlier writes in it
//! included, and the connection is back in autocommit mode
//! ([`Connection::is_autocommit`]). The caller gets [`LimitError::Cancelled`]
//! and must drop the transaction; committing it fails. An interrupted read
//! leaves any open transaction as it was.
//!
//! Every call uses the connection's SQLite progress handler for cancellation
//! and leaves none installed when it returns.
//!
//! Check-then-act: a policy layer that reads a count and then records the
//! event can overshoot its threshold when requests race. Use
//! [`count_and_record_issuance`] / [`count_and_record_order`] inside a
//! transaction opened with [`Isolation::Serialized`](super::Isolation) to make
//! the pair atomic; with `BestEffort` the overshoot is accepted.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};

use crate::bucket::{bucket, bucket_set};
use crate::cancel::{Cancel, InterruptGuard};
use crate::error::{LimitError, Result};
use crate::models::{IssuanceCountEntry, OrderCountEntry, TimeWindow};
use crate::suffix::SuffixList;

use super::from_row::{query_all, ISSUANCE_COUNT_COLS, ORDER_COUNT_COLS};

fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

// ============ Issuance counts ============

/// Record one certificate issuance covering `names`.
///
/// Every name is canonicalized before anything is written, and one entry is
/// written per distinct bucket: a certificate for `example.com` and
/// `www.example.com` consumes one slot of `example.com`, not two. Returns the
/// buckets that were charged.
pub fn record_issuance<S, N>(
    tx: &Transaction<'_>,
    suffixes: &S,
    names: &[N],
    at: DateTime<Utc>,
    cancel: &Cancel,
) -> Result<BTreeSet<String>>
where
    S: SuffixList + ?Sized,
    N: AsRef<str>,
{
    let buckets = bucket_set(suffixes, names)?;
    let _guard = InterruptGuard::install(tx, cancel)?;
    insert_issuance_entries(tx, &buckets, micros(at))?;
    tracing::debug!(
        names = names.len(),
        buckets = buckets.len(),
        "Recorded issuance"
    );
    Ok(buckets)
}

fn insert_issuance_entries(tx: &Transaction<'_>, buckets: &BTreeSet<String>, at: i64) -> Result<()> {
    let mut stmt = tx
        .prepare_cached("INSERT INTO issuance_counts (bucket, observed_at) VALUES (?1, ?2)")
        .map_err(|e| LimitError::storage("prepare issuance insert", e))?;
    for bucket in buckets {
        stmt.execute(params![bucket, at])
            .map_err(|e| LimitError::storage("insert issuance entry", e))?;
    }
    Ok(())
}

/// Count issuances charged to the bucket of `bucket_or_name` within `window`.
///
/// Accepts either a bucket key or any name under it. Unknown buckets count 0.
pub fn count_issuances<S: SuffixList + ?Sized>(
    conn: &Connection,
    suffixes: &S,
    bucket_or_name: &str,
    window: &TimeWindow,
    cancel: &Cancel,
) -> Result<i64> {
    let key = bucket(suffixes, bucket_or_name)?;
    let _guard = InterruptGuard::install(conn, cancel)?;
    let count = count_bucket(conn, &key, window)?;
    tracing::trace!(bucket = %key, count, "Counted issuances");
    Ok(count)
}

fn count_bucket(conn: &Connection, key: &str, window: &TimeWindow) -> Result<i64> {
    let (from, to) = window.bounds_micros();
    let mut stmt = conn
        .prepare_cached(
            "SELECT COUNT(*) FROM issuance_counts
             WHERE bucket = ?1 AND observed_at >= ?2 AND observed_at < ?3",
        )
        .map_err(|e| LimitError::storage("prepare issuance count", e))?;
    stmt.query_row(params![key, from, to], |row| row.get(0))
        .map_err(|e| LimitError::storage("count issuances", e))
}

/// Count issuances for several names at once, keyed by bucket.
///
/// Names sharing a bucket appear once in the result.
pub fn count_issuances_by_names<S, N>(
    conn: &Connection,
    suffixes: &S,
    names: &[N],
    window: &TimeWindow,
    cancel: &Cancel,
) -> Result<BTreeMap<String, i64>>
where
    S: SuffixList + ?Sized,
    N: AsRef<str>,
{
    let buckets = bucket_set(suffixes, names)?;
    let _guard = InterruptGuard::install(conn, cancel)?;
    buckets
        .into_iter()
        .map(|key| {
            let count = count_bucket(conn, &key, window)?;
            Ok((key, count))
        })
        .collect()
}

/// Read the prior windowed counts for every bucket of `names`, then record
/// the issuance, all inside `tx`.
///
/// The returned counts exclude the entries just written. With a transaction
/// opened as [`Isolation::Serialized`](super::Isolation) no other writer can
/// commit between the read and the write. Deciding on a threshold and rolling
/// back is the caller's job.
pub fn count_and_record_issuance<S, N>(
    tx: &Transaction<'_>,
    suffixes: &S,
    names: &[N],
    at: DateTime<Utc>,
    window: &TimeWindow,
    cancel: &Cancel,
) -> Result<BTreeMap<String, i64>>
where
    S: SuffixList + ?Sized,
    N: AsRef<str>,
{
    let buckets = bucket_set(suffixes, names)?;
    let _guard = InterruptGuard::install(tx, cancel)?;
    let mut prior = BTreeMap::new();
    for key in &buckets {
        prior.insert(key.clone(), count_bucket(tx, key, window)?);
    }
    insert_issuance_entries(tx, &buckets, micros(at))?;
    Ok(prior)
}

/// Entries charged to the bucket of `bucket_or_name` within `window`, oldest
/// first.
pub fn list_issuance_entries<S: SuffixList + ?Sized>(
    conn: &Connection,
    suffixes: &S,
    bucket_or_name: &str,
    window: &TimeWindow,
    cancel: &Cancel,
) -> Result<Vec<IssuanceCountEntry>> {
    let key = bucket(suffixes, bucket_or_name)?;
    let (from, to) = window.bounds_micros();
    let _guard = InterruptGuard::install(conn, cancel)?;
    query_all(
        conn,
        &format!(
            "SELECT {} FROM issuance_counts
             WHERE bucket = ?1 AND observed_at >= ?2 AND observed_at < ?3
             ORDER BY observed_at, id",
            ISSUANCE_COUNT_COLS
        ),
        &[&key, &from, &to],
    )
    .map_err(|e| LimitError::storage("list issuance entries", e))
}

// ============ New orders ============

/// Record one new order for `account_id`.
pub fn record_order(
    tx: &Transaction<'_>,
    account_id: i64,
    at: DateTime<Utc>,
    cancel: &Cancel,
) -> Result<()> {
    let _guard = InterruptGuard::install(tx, cancel)?;
    insert_order_entry(tx, account_id, micros(at))?;
    tracing::debug!(account_id, "Recorded new order");
    Ok(())
}

fn insert_order_entry(tx: &Transaction<'_>, account_id: i64, at: i64) -> Result<()> {
    tx.prepare_cached("INSERT INTO new_order_counts (account_id, observed_at) VALUES (?1, ?2)")
        .and_then(|mut stmt| stmt.execute(params![account_id, at]))
        .map_err(|e| LimitError::storage("insert order entry", e))?;
    Ok(())
}

/// Count new orders for `account_id` within `window`. Unknown accounts count 0.
pub fn count_orders(
    conn: &Connection,
    account_id: i64,
    window: &TimeWindow,
    cancel: &Cancel,
) -> Result<i64> {
    let _guard = InterruptGuard::install(conn, cancel)?;
    let count = count_account(conn, account_id, window)?;
    tracing::trace!(account_id, count, "Counted new orders");
    Ok(count)
}

fn count_account(conn: &Connection, account_id: i64, window: &TimeWindow) -> Result<i64> {
    let (from, to) = window.bounds_micros();
    conn.prepare_cached(
        "SELECT COUNT(*) FROM new_order_counts
         WHERE account_id = ?1 AND observed_at >= ?2 AND observed_at < ?3",
    )
    .and_then(|mut stmt| stmt.query_row(params![account_id, from, to], |row| row.get(0)))
    .map_err(|e| LimitError::storage("count orders", e))
}

/// Read the prior windowed count for `account_id`, then record the order,
/// both inside `tx`. See [`count_and_record_issuance`].
pub fn count_and_record_order(
    tx: &Transaction<'_>,
    account_id: i64,
    at: DateTime<Utc>,
    window: &TimeWindow,
    cancel: &Cancel,
) -> Result<i64> {
    let _guard = InterruptGuard::install(tx, cancel)?;
    let prior = count_account(tx, account_id, window)?;
    insert_order_entry(tx, account_id, micros(at))?;
    Ok(prior)
}

/// New-order entries for `account_id` within `window`, oldest first.
pub fn list_order_entries(
    conn: &Connection,
    account_id: i64,
    window: &TimeWindow,
    cancel: &Cancel,
) -> Result<Vec<OrderCountEntry>> {
    let (from, to) = window.bounds_micros();
    let _guard = InterruptGuard::install(conn, cancel)?;
    query_all(
        conn,
        &format!(
            "SELECT {} FROM new_order_counts
             WHERE account_id = ?1 AND observed_at >= ?2 AND observed_at < ?3
             ORDER BY observed_at, id",
            ORDER_COUNT_COLS
        ),
        &[&account_id, &from, &to],
    )
    .map_err(|e| LimitError::storage("list order entries", e))
}
