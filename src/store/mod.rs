//! Persistence for devices, stats, quests, the XP ledger and raw events
//!
//! The reward engine only talks to [`RewardStore`]; [`SqliteStore`] is the
//! production backing.

mod db;
mod sqlite;

pub use db::SqliteStore;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Device, DeviceId, DeviceStats, LedgerEntry, RawEvent, RewardSource};
use crate::rewards::quests::{ProgressMap, QuestProgress};

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid stored value: {0}")]
    Corrupt(String),

    #[error("database lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// True when the error is a UNIQUE / PRIMARY KEY violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Result of an insert-if-absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// A visible device on the leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub character_name: String,
    pub level: u32,
    pub total_xp: i64,
    pub current_streak: u32,
}

/// Narrow storage interface used by the reward engine and the API.
///
/// Every call is bounded by the backing store's busy timeout; nothing here
/// retries.
pub trait RewardStore: Send + Sync {
    /// Cheap liveness check
    fn ping(&self) -> Result<(), StoreError>;

    /// Insert a processed-event marker for one device. A marker that already
    /// exists yields `AlreadyPresent`; the check and the insert are one atomic
    /// statement.
    fn mark_processed(
        &self,
        fingerprint: &str,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError>;

    fn get_device(&self, device_id: &DeviceId) -> Result<Option<Device>, StoreError>;

    /// Insert a device unless one with the same id exists.
    fn insert_device(&self, device: &Device) -> Result<InsertOutcome, StoreError>;

    fn update_device(&self, device: &Device) -> Result<(), StoreError>;

    /// Delete a device and everything it owns. Returns false if it did not exist.
    fn delete_device(&self, device_id: &DeviceId) -> Result<bool, StoreError>;

    fn load_stats(&self, device_id: &DeviceId) -> Result<Option<DeviceStats>, StoreError>;

    fn save_stats(&self, device_id: &DeviceId, stats: &DeviceStats) -> Result<(), StoreError>;

    fn load_quest_progress(&self, device_id: &DeviceId) -> Result<ProgressMap, StoreError>;

    fn save_quest_progress(
        &self,
        device_id: &DeviceId,
        progress: &QuestProgress,
    ) -> Result<(), StoreError>;

    fn append_ledger(&self, entry: &LedgerEntry) -> Result<(), StoreError>;

    /// Write the ledger entries, quest rows and stats of one processed event
    /// atomically. On error nothing is written.
    fn commit_rewards(
        &self,
        device_id: &DeviceId,
        stats: &DeviceStats,
        ledger: &[LedgerEntry],
        progress: &[QuestProgress],
    ) -> Result<(), StoreError>;

    /// Number of ledger entries at or after `since`, optionally for one source.
    fn count_ledger_since(
        &self,
        device_id: &DeviceId,
        source: Option<RewardSource>,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    /// Ledger entries at or after `since`, oldest first.
    fn ledger_since(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Archive a payload. Returns the assigned id.
    fn append_raw_event(&self, event: &RawEvent) -> Result<i64, StoreError>;

    /// Raw events with `id > after_id`, oldest first.
    fn raw_events_page(
        &self,
        device_id: &DeviceId,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RawEvent>, StoreError>;

    /// When the given session's `SessionStart` was archived, if it was.
    fn session_started_at(
        &self,
        device_id: &DeviceId,
        session_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Visible devices ordered by total XP, highest first.
    fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError>;
}
