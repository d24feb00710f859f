use rusqlite::Connection;

use super::migrations::{run_migrations, MigrationError};

/// Bring the counting schema up to date.
///
/// Safe to call on every start; already-applied migrations are skipped.
pub fn init_db(conn: &Connection) -> Result<(), MigrationError> {
    run_migrations(conn)
}

/// Counting tables. Both are append-only: one row per counted event.
///
/// `observed_at` is unix microseconds. The composite indexes serve the
/// equality-on-key plus range-on-time lookups behind every windowed count.
pub(super) const COUNTING_TABLES: &str = r#"
    -- One row per (bucket, certificate). Buckets are registrable domains,
    -- or the name itself when it is a public suffix.
    CREATE TABLE IF NOT EXISTS issuance_counts (
        id INTEGER PRIMARY KEY,
        bucket TEXT NOT NULL,
        observed_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_issuance_counts_bucket_time
        ON issuance_counts(bucket, observed_at);

    -- One row per new order.
    CREATE TABLE IF NOT EXISTS new_order_counts (
        id INTEGER PRIMARY KEY,
        account_id INTEGER NOT NULL,
        observed_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_new_order_counts_account_time
        ON new_order_counts(account_id, observed_at);
"#;

/// Entries are immutable. Deletes stay allowed for external retention jobs.
pub(super) const IMMUTABLE_ENTRIES: &str = r#"
    CREATE TRIGGER IF NOT EXISTS issuance_counts_no_update
    BEFORE UPDATE ON issuance_counts
    BEGIN
        SELECT RAISE(ABORT, 'issuance_counts entries are immutable');
    END;

    CREATE TRIGGER IF NOT EXISTS new_order_counts_no_update
    BEFORE UPDATE ON new_order_counts
    BEGIN
        SELECT RAISE(ABORT, 'new_order_counts entries are immutable');
    END;
"#;
