//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees
//! that migrations are run before any other operation.  The handle is not
//! `Sync`; callers that share it across tasks wrap it in a mutex, which is
//! also what serializes concurrent message writes against mark-seen.

use std::cell::Cell;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;

use crate::error::Result;
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
    /// Last timestamp handed out for a persisted message.  Message
    /// timestamps must be monotonic even when the wall clock is not.
    last_created_at: Cell<DateTime<Utc>>,
}

impl Database {
    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.  Used by tests and throwaway setups.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // Recommended SQLite settings.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn,
            last_created_at: Cell::new(DateTime::<Utc>::MIN_UTC),
        })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    ///
    /// Callers should prefer the typed helpers, but direct access is
    /// occasionally needed for transactions or ad-hoc queries.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    /// Next message timestamp: the current wall clock, nudged forward if
    /// the clock stepped backwards or two messages land in the same tick.
    /// Truncated to microseconds, the precision the TEXT column stores,
    /// so a persisted record round-trips exactly.
    pub(crate) fn next_created_at(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
        let last = self.last_created_at.get();
        if now <= last {
            now = last + Duration::microseconds(1);
        }
        self.last_created_at.set(now);
        now
    }
}
