//! Device accounts and read models
//!
//! Registration, profile views and edits, the activity heatmap, the
//! leaderboard and account deletion. Everything here is request-scoped and
//! goes through the same [`RewardStore`] as the event pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RewardSettings;
use crate::domain::{Device, DeviceId, DeviceStats, LedgerEntry, RewardSource};
use crate::rewards::levels::{compute_level, level_title, LevelProgress};
use crate::rewards::quests::{counter_value, quest_state, QuestId, QuestState, QUESTS};
use crate::store::{InsertOutcome, RewardStore, StoreError};
use crate::time_bucket::{format_day, start_of_day};

/// Longest accepted character name, in characters
pub const MAX_NAME_CHARS: usize = 30;

/// Days covered by the activity heatmap
pub const ACTIVITY_DAYS: i64 = 365;

/// Rows returned by the leaderboard
pub const LEADERBOARD_SIZE: usize = 20;

/// Error type for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Invalid(String),

    #[error("device not registered")]
    NotFound,

    #[error("cannot edit another device's profile")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a registration request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered { xp_awarded: i64 },
    AlreadyRegistered,
}

/// Profile fields a device may change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub character_name: Option<String>,
    pub show_on_leaderboard: Option<bool>,
}

/// Counts for the current UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodaySummary {
    pub commits: u32,
    pub test_passes: u32,
    pub xp_earned: i64,
}

/// One quest as shown on a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestView {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub state: QuestState,
    pub goal: u32,
    /// Progress, clamped to the goal
    pub current: u32,
    pub completed: bool,
    pub xp_reward: i64,
}

/// Public profile of a device
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub character_name: String,
    pub level: u32,
    pub level_title: &'static str,
    pub total_xp: i64,
    pub xp_in_level: i64,
    pub xp_to_next_level: i64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_commits: u32,
    pub total_test_passes: u32,
    pub total_branches: u32,
    pub total_prs: u32,
    pub total_merged_prs: u32,
    pub total_insertions: i64,
    pub total_sessions: u32,
    pub total_session_minutes: i64,
    pub file_extensions: Vec<String>,
    pub today: TodaySummary,
    pub quests: Vec<QuestView>,
    pub member_since: DateTime<Utc>,
    pub show_on_leaderboard: bool,
}

/// One leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub character_name: String,
    pub total_xp: i64,
    pub level: u32,
    pub level_title: &'static str,
    pub current_streak: u32,
}

/// Validate and normalize a character name
pub fn validate_character_name(raw: &str) -> Result<String, AccountError> {
    let name = raw.trim();
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        return Err(AccountError::Invalid(format!(
            "character_name must be 1-{MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// Account service shared by the HTTP handlers
#[derive(Clone)]
pub struct Accounts {
    store: Arc<dyn RewardStore>,
    settings: RewardSettings,
}

impl Accounts {
    pub fn new(store: Arc<dyn RewardStore>, settings: RewardSettings) -> Self {
        Self { store, settings }
    }

    /// Look up a registered device by its bearer id
    pub fn require_device(&self, device_id: &DeviceId) -> Result<Device, AccountError> {
        self.store
            .get_device(device_id)?
            .ok_or(AccountError::NotFound)
    }

    /// Register a device and grant the install bonus.
    pub fn register(
        &self,
        raw_id: &str,
        character_name: &str,
        now: DateTime<Utc>,
    ) -> Result<RegisterOutcome, AccountError> {
        let id = DeviceId::parse(raw_id).map_err(|e| AccountError::Invalid(e.to_string()))?;
        let name = validate_character_name(character_name)?;

        let device = Device::new(id.clone(), name, now);
        if self.store.insert_device(&device)? == InsertOutcome::AlreadyPresent {
            return Ok(RegisterOutcome::AlreadyRegistered);
        }

        let bonus = self.settings.install_bonus;
        let mut stats = DeviceStats::with_xp(bonus);
        stats.level = compute_level(bonus);
        let install = LedgerEntry::new(&id, RewardSource::Install, bonus, now);
        self.store.commit_rewards(&id, &stats, &[install], &[])?;

        tracing::info!(
            "[questhook:accounts] Device registered: {} ({})",
            id.short(),
            device.character_name
        );
        Ok(RegisterOutcome::Registered { xp_awarded: bonus })
    }

    /// Profile view of any device. Unknown or malformed ids are not found.
    pub fn profile(&self, raw_id: &str, now: DateTime<Utc>) -> Result<Profile, AccountError> {
        let id = DeviceId::parse(raw_id).map_err(|_| AccountError::NotFound)?;
        let device = self.require_device(&id)?;
        let stats = self.store.load_stats(&id)?.unwrap_or_default();
        let progress = self.store.load_quest_progress(&id)?;
        let today = now.date_naive();

        let quests = QUESTS
            .iter()
            .map(|quest| {
                let row = progress.get(&quest.id);
                let state = quest_state(quest, &stats, row, today);
                QuestView {
                    id: quest.id.as_str(),
                    name: quest.name,
                    description: quest.description,
                    kind: quest.track.kind(),
                    state,
                    goal: quest.goal,
                    current: counter_value(quest, &stats, row, today).min(quest.goal),
                    completed: matches!(state, QuestState::Completed | QuestState::CompletedToday),
                    xp_reward: quest.xp_reward,
                }
            })
            .collect();

        let daily_count = |quest: QuestId| {
            progress
                .get(&quest)
                .map(|row| row.value_on(today))
                .unwrap_or(0)
        };
        let xp_earned: i64 = self
            .store
            .ledger_since(&id, start_of_day(now))?
            .iter()
            .map(|entry| entry.amount)
            .sum();

        let level = LevelProgress::for_xp(stats.total_xp);
        Ok(Profile {
            character_name: device.character_name,
            level: level.level,
            level_title: level.title,
            total_xp: stats.total_xp,
            xp_in_level: level.xp_in_level,
            xp_to_next_level: level.xp_to_next_level,
            current_streak: stats.current_streak,
            longest_streak: stats.longest_streak,
            total_commits: stats.total_commits,
            total_test_passes: stats.total_test_passes,
            total_branches: stats.total_branches,
            total_prs: stats.total_prs,
            total_merged_prs: stats.total_merged_prs,
            total_insertions: stats.total_insertions,
            total_sessions: stats.total_sessions,
            total_session_minutes: stats.total_session_minutes,
            file_extensions: stats.file_extensions.iter().cloned().collect(),
            today: TodaySummary {
                commits: daily_count(QuestId::DailyShipIt),
                test_passes: daily_count(QuestId::DailyQualityCheck),
                xp_earned,
            },
            quests,
            member_since: device.created_at,
            show_on_leaderboard: device.show_on_leaderboard,
        })
    }

    /// Apply a profile edit on behalf of `caller`.
    pub fn update_profile(
        &self,
        caller: &DeviceId,
        target: &str,
        patch: &ProfilePatch,
    ) -> Result<(), AccountError> {
        let target = DeviceId::parse(target).map_err(|_| AccountError::Forbidden)?;
        if &target != caller {
            return Err(AccountError::Forbidden);
        }

        let mut device = self.require_device(caller)?;
        if let Some(name) = &patch.character_name {
            device.character_name = validate_character_name(name)?;
        }
        if let Some(visible) = patch.show_on_leaderboard {
            device.show_on_leaderboard = visible;
        }
        self.store.update_device(&device)?;
        Ok(())
    }

    /// Ledger entries per UTC day over the last year
    pub fn activity(
        &self,
        raw_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, u32>, AccountError> {
        let id = DeviceId::parse(raw_id).map_err(|_| AccountError::NotFound)?;
        self.require_device(&id)?;

        let since = start_of_day(now - Duration::days(ACTIVITY_DAYS));
        let mut counts = BTreeMap::new();
        for entry in self.store.ledger_since(&id, since)? {
            *counts.entry(format_day(entry.created_at.date_naive())).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Top visible devices by XP
    pub fn leaderboard(&self) -> Result<Vec<LeaderboardRow>, AccountError> {
        let rows = self
            .store
            .leaderboard(LEADERBOARD_SIZE)?
            .into_iter()
            .enumerate()
            .map(|(i, entry)| LeaderboardRow {
                rank: i + 1,
                level_title: level_title(entry.level),
                character_name: entry.character_name,
                total_xp: entry.total_xp,
                level: entry.level,
                current_streak: entry.current_streak,
            })
            .collect();
        Ok(rows)
    }

    /// Delete a device and everything it owns
    pub fn delete(&self, device_id: &DeviceId) -> Result<(), AccountError> {
        if !self.store.delete_device(device_id)? {
            return Err(AccountError::NotFound);
        }
        tracing::info!("[questhook:accounts] Device deleted: {}", device_id.short());
        Ok(())
    }
}
