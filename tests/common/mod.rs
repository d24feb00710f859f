//! Test utilities and fixtures for the counting integration tests

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;

pub use issuance_limits::cancel::Cancel;
pub use issuance_limits::db::{self, create_pool, init_db, queries, DbPool, Isolation};
pub use issuance_limits::error::LimitError;
pub use issuance_limits::models::*;
pub use issuance_limits::suffix::{SuffixList, SuffixRegistry, SuffixRules};

/// A small, fixed slice of the public suffix list, in its published form.
pub const TEST_SUFFIX_LIST: &str = r#"
// ===BEGIN ICANN DOMAINS===
com
net
org
uk
co.uk
*.ck
!www.ck
中国

// ===BEGIN PRIVATE DOMAINS===
dyndns.org
blogspot.com
"#;

pub fn test_suffixes() -> SuffixRules {
    SuffixRules::parse(TEST_SUFFIX_LIST).expect("Failed to parse test suffix list")
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a file-backed pool so several connections share one database.
/// The returned TempDir must outlive the pool.
pub fn setup_test_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("counts.db");
    let pool = create_pool(path.to_str().unwrap(), 4).expect("Failed to create pool");
    {
        let conn = pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    (dir, pool)
}

/// 2019-04-01T00:00:00Z
pub fn april_first() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 4, 1, 0, 0, 0).unwrap()
}

pub fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> TimeWindow {
    TimeWindow::new(from, to).expect("valid window")
}

/// Record one issuance in its own committed transaction.
pub fn issue(conn: &mut Connection, names: &[&str], at: DateTime<Utc>) {
    let rules = test_suffixes();
    let tx = conn.transaction().expect("Failed to open transaction");
    queries::record_issuance(&tx, &rules, names, at, &Cancel::none())
        .expect("record_issuance failed");
    tx.commit().expect("Failed to commit");
}

/// Record one new order in its own committed transaction.
pub fn order(conn: &mut Connection, account_id: i64, at: DateTime<Utc>) {
    let tx = conn.transaction().expect("Failed to open transaction");
    queries::record_order(&tx, account_id, at, &Cancel::none()).expect("record_order failed");
    tx.commit().expect("Failed to commit");
}

pub fn count_issuances(conn: &Connection, name: &str, window: &TimeWindow) -> i64 {
    queries::count_issuances(conn, &test_suffixes(), name, window, &Cancel::none())
        .expect("count_issuances failed")
}

pub fn count_orders(conn: &Connection, account_id: i64, window: &TimeWindow) -> i64 {
    queries::count_orders(conn, account_id, window, &Cancel::none()).expect("count_orders failed")
}

pub fn issuance_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM issuance_counts", [], |row| row.get(0))
        .unwrap()
}

pub fn order_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM new_order_counts", [], |row| row.get(0))
        .unwrap()
}
