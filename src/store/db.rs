//! SQLite connection and schema management
//!
//! Manages the `~/.questhook/questhook.db` database by default.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;

use super::StoreError;

/// Shared SQLite handle. Cloning shares the same connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at a specific path
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, busy_timeout)
    }

    /// In-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, Duration::from_secs(5))
    }

    fn from_connection(conn: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        // journal_mode returns a row, so pragma_update would fail on it
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the connection for one storage call
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

/// Database schema
const SCHEMA_SQL: &str = r#"
-- Registered devices
CREATE TABLE IF NOT EXISTS devices (
    id TEXT PRIMARY KEY,
    character_name TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    show_on_leaderboard INTEGER NOT NULL DEFAULT 1
);

-- Running totals (one row per device)
CREATE TABLE IF NOT EXISTS user_stats (
    device_id TEXT PRIMARY KEY REFERENCES devices(id) ON DELETE CASCADE,
    total_xp INTEGER NOT NULL DEFAULT 0,
    level INTEGER NOT NULL DEFAULT 0,
    current_streak INTEGER NOT NULL DEFAULT 0,
    longest_streak INTEGER NOT NULL DEFAULT 0,
    last_session_date TEXT,
    total_commits INTEGER NOT NULL DEFAULT 0,
    total_test_passes INTEGER NOT NULL DEFAULT 0,
    total_branches INTEGER NOT NULL DEFAULT 0,
    total_prs INTEGER NOT NULL DEFAULT 0,
    total_merged_prs INTEGER NOT NULL DEFAULT 0,
    total_insertions INTEGER NOT NULL DEFAULT 0,
    total_sessions INTEGER NOT NULL DEFAULT 0,
    total_session_minutes INTEGER NOT NULL DEFAULT 0,
    file_extensions TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_stats_xp ON user_stats(total_xp DESC);

-- Quest progress (device x quest)
CREATE TABLE IF NOT EXISTS quest_progress (
    device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
    quest_id TEXT NOT NULL,
    current_value INTEGER NOT NULL DEFAULT 0,
    reset_on TEXT,
    completed_at INTEGER,
    PRIMARY KEY (device_id, quest_id)
);

-- Append-only XP ledger
CREATE TABLE IF NOT EXISTS xp_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
    source TEXT NOT NULL,
    amount INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    day_bucket TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_device_time ON xp_ledger(device_id, created_at);

-- Dedup markers, scoped per device
CREATE TABLE IF NOT EXISTS processed_events (
    device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
    fingerprint TEXT NOT NULL,
    processed_at INTEGER NOT NULL,
    PRIMARY KEY (device_id, fingerprint)
);

-- Archived payloads
CREATE TABLE IF NOT EXISTS raw_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
    session_id TEXT,
    event_kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    received_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_raw_device ON raw_events(device_id, id);
CREATE INDEX IF NOT EXISTS idx_raw_session ON raw_events(device_id, session_id, event_kind);
"#;
