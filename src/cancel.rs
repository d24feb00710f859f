//! Caller-supplied cancellation for storage calls.
//!
//! A [`Cancel`] combines a [`CancellationToken`] with an optional deadline.
//! While a counting call runs, an [`InterruptGuard`] keeps a SQLite progress
//! handler installed on the connection that aborts the running statement once
//! either fires. SQLite then reports `SQLITE_INTERRUPT`, which surfaces as
//! [`LimitError::Cancelled`].

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use crate::error::{LimitError, Result};

/// Number of SQLite VM instructions between cancellation checks.
const PROGRESS_OPS: i32 = 100;

#[derive(Debug, Clone, Default)]
pub struct Cancel {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Cancel {
    /// Never cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now. An earlier existing deadline wins.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(LimitError::Cancelled);
        }
        Ok(())
    }
}

/// Keeps the cancellation hook installed on a connection until dropped.
///
/// SQLite holds one progress handler per connection. Installing the guard
/// replaces any handler the caller set on it, and dropping the guard leaves
/// the connection with none; it does not restore the caller's.
pub(crate) struct InterruptGuard<'c> {
    conn: &'c Connection,
}

impl<'c> InterruptGuard<'c> {
    /// Fails with `Cancelled` without touching the connection if the signal
    /// already fired.
    pub(crate) fn install(conn: &'c Connection, cancel: &Cancel) -> Result<Self> {
        cancel.check()?;
        let cancel = AssertUnwindSafe(cancel.clone());
        conn.progress_handler(
            PROGRESS_OPS,
            Some(move || {
                let cancel = &cancel;
                cancel.0.is_cancelled()
            }),
        );
        Ok(Self { conn })
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}
