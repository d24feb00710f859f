//! Schema migrations for the counting database.
//!
//! Migrations are embedded in the binary and tracked via `PRAGMA user_version`.

use rusqlite::Connection;
use thiserror::Error;

use super::schema::{COUNTING_TABLES, IMMUTABLE_ENTRIES};

/// A database migration.
pub struct Migration {
    /// Version number (sequential, starting from 1).
    pub version: i32,
    pub description: &'static str,
    pub up: fn(&Connection) -> rusqlite::Result<()>,
}

/// All migrations in order.
/// Add new migrations to the end of this list.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "counting tables",
        up: migration_001_counting_tables,
    },
    Migration {
        version: 2,
        description: "reject updates to counting entries",
        up: migration_002_immutable_entries,
    },
];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration {version} failed: {source}")]
    MigrationFailed {
        version: i32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Latest schema version this build knows about.
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

pub fn get_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}

fn set_version(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

/// Run pending migrations, each in its own transaction.
///
/// A failing migration rolls back and leaves the version where it was.
pub fn run_migrations(conn: &Connection) -> Result<(), MigrationError> {
    let current_version = get_version(conn)?;

    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        tracing::debug!("Counting database at version {} (up to date)", current_version);
        return Ok(());
    }

    tracing::info!(
        "Counting database at version {}, {} migration(s) pending",
        current_version,
        pending.len()
    );

    for migration in pending {
        tracing::info!("Running migration {}: {}", migration.version, migration.description);

        let tx = conn.unchecked_transaction()?;
        let applied = (migration.up)(&tx).and_then(|()| set_version(&tx, migration.version));
        match applied {
            Ok(()) => {
                tx.commit()?;
                tracing::info!("Migration {} completed", migration.version);
            }
            Err(source) => {
                // Transaction rolls back on drop
                tracing::error!("Migration {} failed: {}", migration.version, source);
                return Err(MigrationError::MigrationFailed {
                    version: migration.version,
                    source,
                });
            }
        }
    }

    Ok(())
}

fn migration_001_counting_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(COUNTING_TABLES)
}

fn migration_002_immutable_entries(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(IMMUTABLE_ENTRIES)
}
