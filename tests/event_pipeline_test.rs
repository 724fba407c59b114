//! End-to-end tests for the event pipeline against a real SQLite file

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::json;

use common::{
    create_test_store, event, noon, processor, register_device, session_payload, shell_payload,
};
use questhook::accounts::Accounts;
use questhook::backfill::{run_backfill, BackfillCounters};
use questhook::config::RewardSettings;
use questhook::domain::{Device, DeviceId, DeviceStats, LedgerEntry, RawEvent, RewardSource};
use questhook::rewards::quests::{ProgressMap, QuestId, QuestProgress};
use questhook::rewards::{EventOutcome, EventProcessor};
use questhook::store::{InsertOutcome, LeaderboardEntry, RewardStore, SqliteStore, StoreError};
use questhook::time_bucket::start_of_day;

/// Sum of every ledger entry of a device
fn ledger_total(store: &dyn RewardStore, id: &DeviceId) -> i64 {
    store
        .ledger_since(id, DateTime::<Utc>::UNIX_EPOCH)
        .unwrap()
        .iter()
        .map(|e| e.amount)
        .sum()
}

fn completed(quest_id: QuestId, at: DateTime<Utc>, value: u32) -> QuestProgress {
    QuestProgress {
        quest_id,
        current_value: value,
        reset_on: Some(at.date_naive()),
        completed_at: Some(at),
    }
}

#[test]
fn test_commit_for_seasoned_device_awards_base_xp_only() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Veteran");

    let stats = DeviceStats {
        total_xp: 100,
        level: 1,
        total_commits: 10,
        ..DeviceStats::default()
    };
    store.save_stats(&id, &stats).unwrap();
    let earlier = noon() - Duration::hours(1);
    store
        .save_quest_progress(&id, &completed(QuestId::FirstBlood, earlier - Duration::days(3), 1))
        .unwrap();
    store
        .save_quest_progress(&id, &completed(QuestId::GettingStarted, earlier - Duration::days(2), 5))
        .unwrap();
    store
        .save_quest_progress(&id, &completed(QuestId::DailyShipIt, earlier, 1))
        .unwrap();

    let (ev, payload) = event(&shell_payload("s-1", "toolu_a", "git commit -m 'feat: x'", 0));
    let outcome = processor(&store).process_at(&id, &ev, &payload, noon()).unwrap();

    assert_eq!(outcome.status(), "ok");
    assert_eq!(outcome.xp_awarded(), 15);
    assert!(outcome.quest_completions().is_empty());

    let stats = store.load_stats(&id).unwrap().unwrap();
    assert_eq!(stats.total_xp, 115);
    assert_eq!(stats.total_commits, 11);
    assert_eq!(stats.level, 1);

    let progress = store.load_quest_progress(&id).unwrap();
    assert_eq!(progress[&QuestId::DailyShipIt].current_value, 2);

    let earned: Vec<_> = store
        .ledger_since(&id, DateTime::<Utc>::UNIX_EPOCH)
        .unwrap()
        .into_iter()
        .filter(|e| e.source != RewardSource::Install)
        .collect();
    assert_eq!(earned, vec![LedgerEntry::new(&id, RewardSource::Commit, 15, noon())]);
}

#[test]
fn test_progressive_quest_completes_once() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Builder");
    let processor = processor(&store);

    let mut completions = Vec::new();
    for i in 0..7 {
        let (ev, payload) = event(&shell_payload("s-1", &format!("c-{i}"), "git commit -m wip", 0));
        let outcome = processor.process_at(&id, &ev, &payload, noon()).unwrap();
        for done in outcome.quest_completions() {
            completions.push((i, done.quest_id));
        }
    }

    let getting_started: Vec<_> = completions
        .iter()
        .filter(|(_, quest)| *quest == "prog_getting_started")
        .collect();
    assert_eq!(getting_started, vec![&(4, "prog_getting_started")]);

    let first_blood = completions
        .iter()
        .filter(|(_, quest)| *quest == "prog_first_blood")
        .count();
    assert_eq!(first_blood, 1);

    // The daily quest also pays out only once per day
    let daily = completions
        .iter()
        .filter(|(_, quest)| *quest == "daily_ship_it")
        .count();
    assert_eq!(daily, 1);
}

#[test]
fn test_daily_quest_rearms_next_day() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Daily");
    let processor = processor(&store);

    let (ev, payload) = event(&shell_payload("s-1", "t-1", "cargo test", 0));
    let first = processor.process_at(&id, &ev, &payload, noon()).unwrap();
    assert!(first
        .quest_completions()
        .iter()
        .any(|c| c.quest_id == "daily_quality_check"));

    let (ev, payload) = event(&shell_payload("s-2", "t-2", "cargo test", 0));
    let next_day = processor
        .process_at(&id, &ev, &payload, noon() + Duration::days(1))
        .unwrap();
    assert!(next_day
        .quest_completions()
        .iter()
        .any(|c| c.quest_id == "daily_quality_check"));
}

#[test]
fn test_replayed_event_is_a_duplicate() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Replay");
    let processor = processor(&store);

    let (ev, payload) = event(&shell_payload("s-1", "toolu_same", "npm test", 0));
    let first = processor.process_at(&id, &ev, &payload, noon()).unwrap();
    let stats_after_first = store.load_stats(&id).unwrap();

    let second = processor.process_at(&id, &ev, &payload, noon()).unwrap();
    assert_eq!(second, EventOutcome::Duplicate);
    assert_eq!(second.status(), "duplicate");
    assert_eq!(second.xp_awarded(), 0);

    assert!(first.xp_awarded() > 0);
    assert_eq!(store.load_stats(&id).unwrap(), stats_after_first);
    assert_eq!(store.raw_events_page(&id, 0, 100).unwrap().len(), 1);
}

#[test]
fn test_daily_commit_cap_stops_xp_but_keeps_counting() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Committer");
    let processor = processor(&store);

    let mut last = None;
    for i in 0..11 {
        let (ev, payload) = event(&shell_payload("s-1", &format!("c-{i}"), "git commit -am x", 0));
        last = Some(processor.process_at(&id, &ev, &payload, noon()).unwrap());
    }

    let eleventh = last.unwrap();
    assert_eq!(eleventh.xp_awarded(), 0);

    let stats = store.load_stats(&id).unwrap().unwrap();
    assert_eq!(stats.total_commits, 11);
    let credited = store
        .count_ledger_since(&id, Some(RewardSource::Commit), start_of_day(noon()))
        .unwrap();
    assert_eq!(credited, 10);

    // The cap is per day
    let (ev, payload) = event(&shell_payload("s-2", "c-tomorrow", "git commit -am y", 0));
    let tomorrow = processor
        .process_at(&id, &ev, &payload, noon() + Duration::days(1))
        .unwrap();
    assert!(tomorrow.xp_awarded() >= 15);
}

#[test]
fn test_concurrent_deliveries_are_processed_once() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Racer");
    let processor = processor(&store);
    let (ev, payload) = event(&shell_payload("s-1", "toolu_race", "git commit -m race", 0));

    let outcomes: Vec<EventOutcome> = std::thread::scope(|scope| {
        let (processor, id, ev, payload) = (&processor, &id, &ev, &payload);
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(move || processor.process_at(id, ev, payload, noon()).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let processed = outcomes
        .iter()
        .filter(|o| matches!(o, EventOutcome::Processed { .. }))
        .count();
    assert_eq!(processed, 1);

    let stats = store.load_stats(&id).unwrap().unwrap();
    assert_eq!(stats.total_commits, 1);
    assert_eq!(store.raw_events_page(&id, 0, 100).unwrap().len(), 1);
}

#[test]
fn test_session_end_updates_streak_and_pays_commit_bonus() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Sessions");
    let processor = processor(&store);

    let (start, payload) = event(&session_payload("SessionStart", "sess-1"));
    let started = processor.process_at(&id, &start, &payload, noon()).unwrap();
    assert_eq!(started.xp_awarded(), 10);

    let (commit, payload) = event(&shell_payload("sess-1", "c-1", "git commit -m s", 0));
    processor
        .process_at(&id, &commit, &payload, noon() + Duration::minutes(5))
        .unwrap();

    let (end, payload) = event(&session_payload("SessionEnd", "sess-1"));
    let ended = processor
        .process_at(&id, &end, &payload, noon() + Duration::minutes(30))
        .unwrap();

    // 10 streak + 20 session-with-commit bonus
    assert_eq!(ended.xp_awarded(), 30);
    let ids: Vec<_> = ended.quest_completions().iter().map(|c| c.quest_id).collect();
    assert_eq!(ids, vec!["daily_code_today"]);

    let stats = store.load_stats(&id).unwrap().unwrap();
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.longest_streak, 1);
    assert_eq!(stats.last_session_date, NaiveDate::from_ymd_opt(2026, 3, 10));
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_session_minutes, 30);
}

#[test]
fn test_second_session_same_day_keeps_streak() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Twice");
    let processor = processor(&store);

    for (i, offset) in [0, 60].into_iter().enumerate() {
        let session = format!("sess-{i}");
        let (end, payload) = event(&session_payload("SessionEnd", &session));
        processor
            .process_at(&id, &end, &payload, noon() + Duration::minutes(offset))
            .unwrap();
    }

    let stats = store.load_stats(&id).unwrap().unwrap();
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.total_sessions, 2);
}

#[test]
fn test_backfill_restores_counters_from_archive() {
    let (_dir, store) = create_test_store();
    let id = register_device(&store, "Archivist");
    let processor = processor(&store);

    let payloads = vec![
        (session_payload("SessionStart", "b-1"), 0),
        (shell_payload("b-1", "c-1", "git commit -m one", 0), 1),
        (shell_payload("b-1", "t-1", "pytest", 0), 2),
        (shell_payload("b-1", "t-2", "pytest", 1), 3),
        (
            json!({
                "hook_event_name": "PostToolUse",
                "session_id": "b-1",
                "tool_name": "Edit",
                "tool_use_id": "e-1",
                "tool_input": { "file_path": "src/main.rs" }
            }),
            4,
        ),
        (session_payload("SessionEnd", "b-1"), 20),
    ];
    for (payload, minute) in &payloads {
        let (ev, raw) = event(payload);
        processor
            .process_at(&id, &ev, &raw, noon() + Duration::minutes(*minute))
            .unwrap();
    }

    let live = store.load_stats(&id).unwrap().unwrap();
    let expected = BackfillCounters::from_stats(&live);

    // Lose the counters but keep XP
    let wiped = DeviceStats {
        total_xp: live.total_xp,
        level: live.level,
        current_streak: live.current_streak,
        longest_streak: live.longest_streak,
        last_session_date: live.last_session_date,
        ..DeviceStats::default()
    };
    store.save_stats(&id, &wiped).unwrap();

    let dry = run_backfill(&*store, &id, 480, true).unwrap();
    assert!(!dry.applied);
    assert_eq!(dry.after, expected);
    assert_eq!(store.load_stats(&id).unwrap().unwrap(), wiped);

    let report = run_backfill(&*store, &id, 480, false).unwrap();
    assert!(report.applied);
    assert_eq!(report.events_scanned, payloads.len());
    assert_eq!(store.load_stats(&id).unwrap().unwrap(), live);

    // Idempotent
    let again = run_backfill(&*store, &id, 480, false).unwrap();
    assert!(again.before.diff(&again.after).is_empty());
}

/// SQLite store with switchable faults
struct FaultyStore {
    inner: SqliteStore,
    broken_markers: bool,
    failing_commits: AtomicUsize,
}

impl FaultyStore {
    fn new(broken_markers: bool) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            broken_markers,
            failing_commits: AtomicUsize::new(0),
        }
    }

    fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }
}

impl RewardStore for FaultyStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping()
    }

    fn mark_processed(
        &self,
        fingerprint: &str,
        device_id: &DeviceId,
        at: DateTime<Utc>,
    ) -> Result<InsertOutcome, StoreError> {
        if self.broken_markers {
            return Err(StoreError::Corrupt("disk on fire".to_string()));
        }
        self.inner.mark_processed(fingerprint, device_id, at)
    }

    fn get_device(&self, device_id: &DeviceId) -> Result<Option<Device>, StoreError> {
        self.inner.get_device(device_id)
    }

    fn insert_device(&self, device: &Device) -> Result<InsertOutcome, StoreError> {
        self.inner.insert_device(device)
    }

    fn update_device(&self, device: &Device) -> Result<(), StoreError> {
        self.inner.update_device(device)
    }

    fn delete_device(&self, device_id: &DeviceId) -> Result<bool, StoreError> {
        self.inner.delete_device(device_id)
    }

    fn load_stats(&self, device_id: &DeviceId) -> Result<Option<DeviceStats>, StoreError> {
        self.inner.load_stats(device_id)
    }

    fn save_stats(&self, device_id: &DeviceId, stats: &DeviceStats) -> Result<(), StoreError> {
        self.inner.save_stats(device_id, stats)
    }

    fn load_quest_progress(&self, device_id: &DeviceId) -> Result<ProgressMap, StoreError> {
        self.inner.load_quest_progress(device_id)
    }

    fn save_quest_progress(
        &self,
        device_id: &DeviceId,
        progress: &QuestProgress,
    ) -> Result<(), StoreError> {
        self.inner.save_quest_progress(device_id, progress)
    }

    fn append_ledger(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.inner.append_ledger(entry)
    }

    fn commit_rewards(
        &self,
        device_id: &DeviceId,
        stats: &DeviceStats,
        ledger: &[LedgerEntry],
        progress: &[QuestProgress],
    ) -> Result<(), StoreError> {
        let failing = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Corrupt("stats write failed".to_string()));
        }
        self.inner.commit_rewards(device_id, stats, ledger, progress)
    }

    fn count_ledger_since(
        &self,
        device_id: &DeviceId,
        source: Option<RewardSource>,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.inner.count_ledger_since(device_id, source, since)
    }

    fn ledger_since(
        &self,
        device_id: &DeviceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.ledger_since(device_id, since)
    }

    fn append_raw_event(&self, event: &RawEvent) -> Result<i64, StoreError> {
        self.inner.append_raw_event(event)
    }

    fn raw_events_page(
        &self,
        device_id: &DeviceId,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<RawEvent>, StoreError> {
        self.inner.raw_events_page(device_id, after_id, limit)
    }

    fn session_started_at(
        &self,
        device_id: &DeviceId,
        session_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.inner.session_started_at(device_id, session_id)
    }

    fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, StoreError> {
        self.inner.leaderboard(limit)
    }
}

#[test]
fn test_marker_failure_is_reported_as_duplicate() {
    let faulty = FaultyStore::new(true);
    let id = DeviceId::generate();
    faulty
        .insert_device(&Device::new(id.clone(), "Broken", noon()))
        .unwrap();
    let store: Arc<dyn RewardStore> = Arc::new(faulty);
    let processor = EventProcessor::new(store.clone(), RewardSettings::default());

    let (ev, payload) = event(&shell_payload("s-1", "c-1", "git commit -m x", 0));
    let outcome = processor.process_at(&id, &ev, &payload, noon()).unwrap();

    assert_eq!(outcome, EventOutcome::Duplicate);
    assert!(store.raw_events_page(&id, 0, 10).unwrap().is_empty());
    assert!(store.load_stats(&id).unwrap().is_none());
}

#[test]
fn test_failed_commit_leaves_no_partial_award() {
    let store = Arc::new(FaultyStore::new(false));
    let id = DeviceId::generate();
    Accounts::new(store.clone(), RewardSettings::default())
        .register(id.as_str(), "Flaky", noon())
        .unwrap();
    let processor = EventProcessor::new(store.clone(), RewardSettings::default());

    store.fail_next_commits(1);
    let (ev, payload) = event(&shell_payload("s-1", "c-1", "git commit -m x", 0));
    assert!(processor.process_at(&id, &ev, &payload, noon()).is_err());

    let stats = store.load_stats(&id).unwrap().unwrap();
    assert_eq!(stats.total_xp, 25);
    assert_eq!(stats.total_commits, 0);
    assert_eq!(ledger_total(store.as_ref(), &id), stats.total_xp);
    assert!(store
        .load_quest_progress(&id)
        .unwrap()
        .get(&QuestId::FirstBlood)
        .is_none());

    let (ev, payload) = event(&shell_payload("s-1", "c-2", "git commit -m y", 0));
    let outcome = processor.process_at(&id, &ev, &payload, noon()).unwrap();
    assert_eq!(outcome.xp_awarded(), 15);
    assert!(outcome
        .quest_completions()
        .iter()
        .any(|c| c.quest_id == "prog_first_blood"));

    let stats = store.load_stats(&id).unwrap().unwrap();
    // install + commit + daily ship it + first blood
    assert_eq!(stats.total_xp, 25 + 15 + 15 + 50);
    assert_eq!(ledger_total(store.as_ref(), &id), stats.total_xp);
}

#[test]
fn test_sessionless_events_are_deduplicated_per_device() {
    let (_dir, store) = create_test_store();
    let alice = register_device(&store, "Alice");
    let bob = register_device(&store, "Bob");
    let processor = processor(&store);

    let (ev, payload) = event(&json!({ "hook_event_name": "SessionStart" }));
    let first = processor.process_at(&alice, &ev, &payload, noon()).unwrap();
    let second = processor.process_at(&bob, &ev, &payload, noon()).unwrap();
    assert_eq!(first.status(), "ok");
    assert_eq!(second.status(), "ok");
    assert_eq!(second.xp_awarded(), 10);

    let replay = processor.process_at(&alice, &ev, &payload, noon()).unwrap();
    assert_eq!(replay, EventOutcome::Duplicate);
}
