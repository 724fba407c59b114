//! Event orchestrator
//!
//! Runs one accepted hook event through the reward pipeline:
//!
//! 1. dedup gate (duplicates stop here with no side effects)
//! 2. archive the raw payload
//! 3. one-time first-session bonus
//! 4. raw stats: edited file extension, commit insertions
//! 5. classify, then apply the daily commit cap
//! 6. bump the counter for the reward source
//! 7. credit base XP to the ledger
//! 8. quests for the reward source
//! 9. session end: streak, session-commit bonus, their quests, session time
//! 10. recompute the level and commit
//!
//! Stats are loaded once and mutated in memory by every step. Ledger entries
//! and quest rows are staged on the way and committed with the stats in one
//! transaction, so either the whole award lands or none of it does. Only the
//! raw archive is written ahead of the commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::classifier::{self, Classification};
use super::counters::{record_extension, update_counters};
use super::dedup::{fingerprint, DedupGate};
use super::levels::compute_level;
use super::quests::{PendingWrites, ProgressMap, QuestCompletion, QuestEngine, QuestTrigger};
use super::streaks::compute_streak;
use crate::config::RewardSettings;
use crate::domain::{
    DeviceId, DeviceStats, EventKind, HookEvent, LedgerEntry, RawEvent, RewardSource, ToolUse,
};
use crate::store::{RewardStore, StoreError};
use crate::time_bucket::start_of_day;

/// Result of processing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Already seen; nothing was changed
    Duplicate,
    Processed {
        /// XP credited by the event itself (quest bonuses are listed separately)
        xp_awarded: i64,
        quest_completions: Vec<QuestCompletion>,
    },
}

impl EventOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Processed { .. } => "ok",
        }
    }

    pub fn xp_awarded(&self) -> i64 {
        match self {
            Self::Duplicate => 0,
            Self::Processed { xp_awarded, .. } => *xp_awarded,
        }
    }

    pub fn quest_completions(&self) -> &[QuestCompletion] {
        match self {
            Self::Duplicate => &[],
            Self::Processed {
                quest_completions, ..
            } => quest_completions,
        }
    }
}

/// Wire form of an [`EventOutcome`]
#[derive(Debug, Serialize)]
pub struct EventResponse<'a> {
    pub status: &'static str,
    pub xp_awarded: i64,
    pub quest_completions: &'a [QuestCompletion],
}

impl<'a> From<&'a EventOutcome> for EventResponse<'a> {
    fn from(outcome: &'a EventOutcome) -> Self {
        Self {
            status: outcome.status(),
            xp_awarded: outcome.xp_awarded(),
            quest_completions: outcome.quest_completions(),
        }
    }
}

/// Processes hook events for any number of devices.
///
/// Requests for the same device are serialized by a per-device lock held
/// across the read-modify-write of its stats; different devices proceed in
/// parallel.
pub struct EventProcessor {
    store: Arc<dyn RewardStore>,
    settings: RewardSettings,
    device_locks: Mutex<HashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn RewardStore>, settings: RewardSettings) -> Self {
        Self {
            store,
            settings,
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Process an event received now.
    pub fn process(
        &self,
        device_id: &DeviceId,
        event: &HookEvent,
        payload: &Value,
    ) -> Result<EventOutcome, StoreError> {
        self.process_at(device_id, event, payload, Utc::now())
    }

    /// Process an event as if received at `now`.
    pub fn process_at(
        &self,
        device_id: &DeviceId,
        event: &HookEvent,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, StoreError> {
        let lock = self.device_lock(device_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.process_locked(device_id, event, payload, now)
        };
        self.release_lock(device_id, lock);
        result
    }

    fn process_locked(
        &self,
        device_id: &DeviceId,
        event: &HookEvent,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, StoreError> {
        let fp = fingerprint(event);
        if DedupGate::new(self.store.as_ref()).is_duplicate(&fp, device_id, now) {
            return Ok(EventOutcome::Duplicate);
        }

        let mut run = Pipeline {
            store: self.store.as_ref(),
            settings: &self.settings,
            device_id,
            now,
            stats: self.store.load_stats(device_id)?.unwrap_or_default(),
            progress: self.store.load_quest_progress(device_id)?,
            pending: PendingWrites::default(),
            xp_awarded: 0,
            completions: Vec::new(),
        };

        run.archive(event, payload)?;
        run.first_session_bonus(event)?;
        run.raw_stats(event)?;
        run.base_reward(event)?;
        if event.is_session_end() {
            run.session_end(event)?;
        }
        run.commit()?;

        if run.xp_awarded > 0 || !run.completions.is_empty() {
            tracing::info!(
                "[questhook:events] {} for {}: +{} XP, {} quests",
                event.kind_name(),
                device_id.short(),
                run.xp_awarded,
                run.completions.len()
            );
        }

        Ok(EventOutcome::Processed {
            xp_awarded: run.xp_awarded,
            quest_completions: run.completions,
        })
    }

    /// Drop the lock entry of a deleted device
    pub fn forget_device(&self, device_id: &DeviceId) {
        let mut locks = self
            .device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.remove(device_id);
    }

    fn device_lock(&self, device_id: &DeviceId) -> Arc<Mutex<()>> {
        let mut locks = self
            .device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(device_id.clone()).or_default().clone()
    }

    /// Drop the map entry once no other request holds or waits on it
    fn release_lock(&self, device_id: &DeviceId, lock: Arc<Mutex<()>>) {
        let mut locks = self
            .device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map's copy plus ours
        if Arc::strong_count(&lock) == 2 {
            locks.remove(device_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// State of one event's trip through the pipeline
struct Pipeline<'a> {
    store: &'a dyn RewardStore,
    settings: &'a RewardSettings,
    device_id: &'a DeviceId,
    now: DateTime<Utc>,
    stats: DeviceStats,
    progress: ProgressMap,
    pending: PendingWrites,
    xp_awarded: i64,
    completions: Vec<QuestCompletion>,
}

impl Pipeline<'_> {
    fn archive(&self, event: &HookEvent, payload: &Value) -> Result<(), StoreError> {
        let raw = RawEvent::new(
            self.device_id,
            event.session_id.clone(),
            event.kind_name(),
            payload.clone(),
            self.now,
        );
        self.store.append_raw_event(&raw)?;
        Ok(())
    }

    /// Credit XP earned by the event itself
    fn credit(&mut self, source: RewardSource, amount: i64) {
        self.pending
            .credit(LedgerEntry::new(self.device_id, source, amount, self.now));
        self.stats.total_xp += amount;
        self.xp_awarded += amount;
    }

    fn check_quests(&mut self, trigger: QuestTrigger) {
        let engine = QuestEngine::new(self.device_id, self.now);
        let done = engine.check(
            &mut self.stats,
            &mut self.progress,
            &mut self.pending,
            trigger,
        );
        self.completions.extend(done);
    }

    /// Commit credits today, staged ones included
    fn commits_today(&self) -> Result<u32, StoreError> {
        let stored = self.store.count_ledger_since(
            self.device_id,
            Some(RewardSource::Commit),
            start_of_day(self.now),
        )?;
        Ok(stored + self.pending.count(RewardSource::Commit))
    }

    fn first_session_bonus(&mut self, event: &HookEvent) -> Result<(), StoreError> {
        if !event.is_session_start() || self.stats.total_sessions > 0 {
            return Ok(());
        }
        let already_paid = self.store.count_ledger_since(
            self.device_id,
            Some(RewardSource::FirstSession),
            DateTime::<Utc>::UNIX_EPOCH,
        )? > 0;
        if !already_paid {
            self.credit(RewardSource::FirstSession, self.settings.first_session_bonus);
        }
        Ok(())
    }

    fn raw_stats(&mut self, event: &HookEvent) -> Result<(), StoreError> {
        match &event.kind {
            EventKind::PostToolUse(ToolUse::FileEdit { file_path }) => {
                let Some(ext) = classifier::extract_file_extension(file_path) else {
                    return Ok(());
                };
                if record_extension(&mut self.stats, &ext) {
                    tracing::debug!(
                        "[questhook:events] {} new file type .{}",
                        self.device_id.short(),
                        ext
                    );
                    self.check_quests(QuestTrigger::FileExtension);
                }
            }
            EventKind::PostToolUse(ToolUse::Shell(run))
                if run.succeeded() && classifier::is_commit_command(&run.command) =>
            {
                if let Some(diff) = classifier::parse_commit_stats(&run.stdout) {
                    self.stats.total_insertions += diff.insertions;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn base_reward(&mut self, event: &HookEvent) -> Result<(), StoreError> {
        let Classification { mut xp, source } = classifier::classify(event);
        let Some(source) = source else {
            return Ok(());
        };

        if source == RewardSource::Commit && self.commits_today()? >= self.settings.daily_commit_xp_cap
        {
            tracing::debug!(
                "[questhook:events] {} daily commit XP cap reached",
                self.device_id.short()
            );
            xp = 0;
        }

        self.stats = update_counters(&self.stats, source);
        if xp > 0 {
            self.credit(source, xp);
        }
        if let Some(trigger) = QuestTrigger::for_source(source) {
            self.check_quests(trigger);
        }
        Ok(())
    }

    fn session_end(&mut self, event: &HookEvent) -> Result<(), StoreError> {
        let today = self.now.date_naive();
        let streak = compute_streak(
            self.stats.last_session_date,
            self.stats.current_streak,
            today,
        );
        self.stats.current_streak = streak.streak;
        self.stats.longest_streak = self.stats.longest_streak.max(streak.streak);
        self.stats.last_session_date = Some(today);

        if streak.xp > 0 {
            self.credit(RewardSource::Streak, streak.xp);
        }

        if self.commits_today()? > 0 {
            self.credit(RewardSource::SessionCommit, self.settings.session_commit_bonus);
            self.check_quests(QuestTrigger::SessionCommit);
        }

        if streak.xp > 0 {
            self.check_quests(QuestTrigger::Streak);
        }

        self.stats.total_sessions += 1;
        self.stats.total_session_minutes += self.session_minutes(event)?;
        Ok(())
    }

    /// Minutes to credit for the session that just ended
    fn session_minutes(&self, event: &HookEvent) -> Result<i64, StoreError> {
        let minutes = match (event.duration_ms, event.session_id.as_deref()) {
            (Some(ms), _) => i64::try_from(ms / 60_000).unwrap_or(i64::MAX),
            (None, Some(session)) => self
                .store
                .session_started_at(self.device_id, session)?
                .map(|started| (self.now - started).num_minutes())
                .unwrap_or(0),
            (None, None) => 0,
        };
        Ok(minutes.clamp(0, self.settings.max_session_minutes))
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.stats.level = compute_level(self.stats.total_xp);
        self.store.commit_rewards(
            self.device_id,
            &self.stats,
            &self.pending.ledger,
            &self.pending.progress,
        )
    }
}
