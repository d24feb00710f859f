pub mod from_row;
pub mod migrations;
pub mod queries;
mod schema;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a connection waits on another writer's lock before SQLITE_BUSY.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Create a connection pool for the counting database.
///
/// Every connection runs in WAL mode: readers see the last committed state
/// while a writer's transaction is open, and never its uncommitted rows.
pub fn create_pool(database_path: &str, max_size: u32) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))
    });
    Pool::builder().max_size(max_size).build(manager)
}

/// Transaction strategy for callers that check a count and then record the
/// event it guards.
///
/// The policy read and the counting write are separate operations, so two
/// concurrent requests can both see a count under the threshold and both
/// write. `BestEffort` accepts that overshoot. `Serialized` takes SQLite's
/// write lock when the transaction begins, so a count read inside the
/// transaction followed by the write cannot interleave with another writer,
/// at the cost of serializing all counting transactions.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Isolation {
    #[default]
    BestEffort,
    Serialized,
}

impl Isolation {
    fn behavior(self) -> TransactionBehavior {
        match self {
            Isolation::BestEffort => TransactionBehavior::Deferred,
            Isolation::Serialized => TransactionBehavior::Immediate,
        }
    }
}

/// Open a caller-owned transaction with the given strategy.
///
/// The counting functions never begin, commit or roll back; this is a helper
/// for the code that owns the unit of work.
pub fn begin(conn: &mut Connection, isolation: Isolation) -> rusqlite::Result<Transaction<'_>> {
    conn.transaction_with_behavior(isolation.behavior())
}
