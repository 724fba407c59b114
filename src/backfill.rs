//! Recount career counters from the raw event archive
//!
//! Replays every archived payload of a device through the same classifier
//! and extractors the live pipeline uses, then overwrites the counter columns.
//! XP, streaks and the level are left alone. Running it twice gives the same
//! result.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    Device, DeviceId, DeviceStats, EventKind, HookEvent, HookPayload, RawEvent, RewardSource,
    ToolUse,
};
use crate::rewards::classifier::{classify, extract_file_extension, parse_commit_stats};
use crate::rewards::counters::{record_extension, update_counters};
use crate::store::{RewardStore, StoreError};

/// Raw events fetched per storage call
pub const PAGE_SIZE: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The counter columns backfill owns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillCounters {
    pub total_commits: u32,
    pub total_test_passes: u32,
    pub total_branches: u32,
    pub total_prs: u32,
    pub total_merged_prs: u32,
    pub total_insertions: i64,
    pub total_sessions: u32,
    pub total_session_minutes: i64,
    pub file_extensions: BTreeSet<String>,
}

impl BackfillCounters {
    pub fn from_stats(stats: &DeviceStats) -> Self {
        Self {
            total_commits: stats.total_commits,
            total_test_passes: stats.total_test_passes,
            total_branches: stats.total_branches,
            total_prs: stats.total_prs,
            total_merged_prs: stats.total_merged_prs,
            total_insertions: stats.total_insertions,
            total_sessions: stats.total_sessions,
            total_session_minutes: stats.total_session_minutes,
            file_extensions: stats.file_extensions.clone(),
        }
    }

    /// Overwrite the counter columns of `stats`
    pub fn apply_to(&self, stats: &mut DeviceStats) {
        stats.total_commits = self.total_commits;
        stats.total_test_passes = self.total_test_passes;
        stats.total_branches = self.total_branches;
        stats.total_prs = self.total_prs;
        stats.total_merged_prs = self.total_merged_prs;
        stats.total_insertions = self.total_insertions;
        stats.total_sessions = self.total_sessions;
        stats.total_session_minutes = self.total_session_minutes;
        stats.file_extensions = self.file_extensions.clone();
    }

    /// `(name, before, after)` for every column that differs
    pub fn diff(&self, after: &Self) -> Vec<(&'static str, String, String)> {
        let mut changes = Vec::new();
        let mut check = |name: &'static str, before: String, now: String| {
            if before != now {
                changes.push((name, before, now));
            }
        };
        check("total_commits", self.total_commits.to_string(), after.total_commits.to_string());
        check(
            "total_test_passes",
            self.total_test_passes.to_string(),
            after.total_test_passes.to_string(),
        );
        check("total_branches", self.total_branches.to_string(), after.total_branches.to_string());
        check("total_prs", self.total_prs.to_string(), after.total_prs.to_string());
        check(
            "total_merged_prs",
            self.total_merged_prs.to_string(),
            after.total_merged_prs.to_string(),
        );
        check(
            "total_insertions",
            self.total_insertions.to_string(),
            after.total_insertions.to_string(),
        );
        check("total_sessions", self.total_sessions.to_string(), after.total_sessions.to_string());
        check(
            "total_session_minutes",
            self.total_session_minutes.to_string(),
            after.total_session_minutes.to_string(),
        );
        check(
            "file_extensions",
            format!("{:?}", self.file_extensions),
            format!("{:?}", after.file_extensions),
        );
        changes
    }
}

/// Accumulates counters over events fed oldest first
#[derive(Debug)]
pub struct Recount {
    stats: DeviceStats,
    session_starts: HashMap<String, DateTime<Utc>>,
    session_ends: HashMap<String, DateTime<Utc>>,
    max_session_minutes: i64,
    skipped: usize,
}

impl Recount {
    pub fn new(max_session_minutes: i64) -> Self {
        Self {
            stats: DeviceStats::default(),
            session_starts: HashMap::new(),
            session_ends: HashMap::new(),
            max_session_minutes,
            skipped: 0,
        }
    }

    pub fn observe(&mut self, raw: &RawEvent) {
        match raw.event_kind.as_str() {
            "SessionStart" => {
                if let Some(session) = &raw.session_id {
                    self.session_starts
                        .entry(session.clone())
                        .or_insert(raw.received_at);
                }
            }
            "SessionEnd" => {
                if let Some(session) = &raw.session_id {
                    self.session_ends.insert(session.clone(), raw.received_at);
                }
            }
            "PostToolUse" => self.observe_tool_use(raw),
            _ => {}
        }
    }

    fn observe_tool_use(&mut self, raw: &RawEvent) {
        let event = serde_json::from_value::<HookPayload>(raw.payload.clone())
            .ok()
            .and_then(|payload| HookEvent::from_payload(&payload).ok());
        let Some(event) = event else {
            self.skipped += 1;
            tracing::debug!("[questhook:backfill] Skipping unreadable event {}", raw.id);
            return;
        };

        match &event.kind {
            EventKind::PostToolUse(ToolUse::FileEdit { file_path }) => {
                if let Some(ext) = extract_file_extension(file_path) {
                    record_extension(&mut self.stats, &ext);
                }
            }
            EventKind::PostToolUse(ToolUse::Shell(run)) => {
                let Some(source) = classify(&event).source else {
                    return;
                };
                self.stats = update_counters(&self.stats, source);
                if source == RewardSource::Commit {
                    let inserted = parse_commit_stats(&run.stdout).map_or(0, |d| d.insertions);
                    self.stats.total_insertions += inserted;
                }
            }
            _ => {}
        }
    }

    /// Events that could not be parsed
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(mut self) -> BackfillCounters {
        // Sessions are counted by their start; minutes need both ends
        self.stats.total_sessions = u32::try_from(self.session_starts.len()).unwrap_or(u32::MAX);
        self.stats.total_session_minutes = self
            .session_starts
            .iter()
            .filter_map(|(session, start)| {
                let end = self.session_ends.get(session)?;
                (end > start).then(|| (*end - *start).num_minutes().min(self.max_session_minutes))
            })
            .sum();
        BackfillCounters::from_stats(&self.stats)
    }
}

/// Recount an in-memory list of events
pub fn compute_backfill<'a>(
    events: impl IntoIterator<Item = &'a RawEvent>,
    max_session_minutes: i64,
) -> BackfillCounters {
    let mut recount = Recount::new(max_session_minutes);
    for event in events {
        recount.observe(event);
    }
    recount.finish()
}

/// What a backfill run found (and, unless dry, wrote)
#[derive(Debug, Clone)]
pub struct BackfillReport {
    pub device: Device,
    pub events_scanned: usize,
    pub events_skipped: usize,
    pub before: BackfillCounters,
    pub after: BackfillCounters,
    pub applied: bool,
}

/// Recount one device from its archive, paging oldest first.
pub fn run_backfill(
    store: &dyn RewardStore,
    device_id: &DeviceId,
    max_session_minutes: i64,
    dry_run: bool,
) -> Result<BackfillReport, BackfillError> {
    let device = store
        .get_device(device_id)?
        .ok_or_else(|| BackfillError::DeviceNotFound(device_id.clone()))?;
    let mut stats = store.load_stats(device_id)?.unwrap_or_default();
    let before = BackfillCounters::from_stats(&stats);

    let mut recount = Recount::new(max_session_minutes);
    let mut scanned = 0;
    let mut cursor = 0;
    loop {
        let page = store.raw_events_page(device_id, cursor, PAGE_SIZE)?;
        for event in &page {
            recount.observe(event);
        }
        scanned += page.len();
        tracing::debug!("[questhook:backfill] fetched {} events", scanned);

        match page.last() {
            Some(last) if page.len() == PAGE_SIZE => cursor = last.id,
            _ => break,
        }
    }

    let skipped = recount.skipped();
    let after = recount.finish();
    let applied = !dry_run && scanned > 0;
    if applied {
        after.apply_to(&mut stats);
        store.save_stats(device_id, &stats)?;
        tracing::info!(
            "[questhook:backfill] {} recounted from {} events",
            device_id.short(),
            scanned
        );
    }

    Ok(BackfillReport {
        device,
        events_scanned: scanned,
        events_skipped: skipped,
        before,
        after,
        applied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn raw(id: i64, session: &str, kind: &str, payload: serde_json::Value, minute: i64) -> RawEvent {
        let base = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        RawEvent {
            id,
            device_id: DeviceId::parse("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap(),
            session_id: Some(session.to_string()),
            event_kind: kind.to_string(),
            payload,
            received_at: base + Duration::minutes(minute),
        }
    }

    fn bash(cmd: &str, exit: i64, stdout: &str) -> serde_json::Value {
        json!({
            "hook_event_name": "PostToolUse",
            "tool_name": "Bash",
            "tool_input": {"command": cmd},
            "tool_response": {"exit_code": exit, "stdout": stdout}
        })
    }

    #[test]
    fn test_recount_matches_live_rules() {
        let events = vec![
            raw(1, "a", "SessionStart", json!({"hook_event_name": "SessionStart"}), 0),
            raw(2, "a", "PostToolUse", bash("git commit -m x", 0, "1 file changed, 12 insertions(+)"), 5),
            raw(3, "a", "PostToolUse", bash("git commit -m y", 1, ""), 6),
            raw(4, "a", "PostToolUse", bash("cargo test", 0, ""), 7),
            raw(5, "a", "PostToolUse", bash("git checkout -b feat/x", 0, ""), 8),
            raw(6, "a", "PostToolUse", bash("gh pr create --fill", 0, ""), 9),
            raw(7, "a", "PostToolUse", bash("gh pr merge 3", 0, ""), 10),
            raw(
                8,
                "a",
                "PostToolUse",
                json!({"hook_event_name": "PostToolUse", "tool_name": "Edit",
                       "tool_input": {"file_path": "src/Main.RS"}}),
                11,
            ),
            raw(9, "a", "SessionEnd", json!({"hook_event_name": "SessionEnd"}), 30),
            raw(10, "b", "SessionStart", json!({"hook_event_name": "SessionStart"}), 40),
        ];

        let counters = compute_backfill(&events, 480);
        assert_eq!(counters.total_commits, 1);
        assert_eq!(counters.total_insertions, 12);
        assert_eq!(counters.total_test_passes, 1);
        assert_eq!(counters.total_branches, 1);
        assert_eq!(counters.total_prs, 1);
        assert_eq!(counters.total_merged_prs, 1);
        assert_eq!(counters.file_extensions.iter().collect::<Vec<_>>(), vec!["rs"]);
        // Session b never ended: counted, but no minutes
        assert_eq!(counters.total_sessions, 2);
        assert_eq!(counters.total_session_minutes, 30);
    }

    #[test]
    fn test_session_minutes_are_capped() {
        let events = vec![
            raw(1, "long", "SessionStart", json!({}), 0),
            raw(2, "long", "SessionEnd", json!({}), 60 * 12),
        ];
        assert_eq!(compute_backfill(&events, 480).total_session_minutes, 480);
    }

    #[test]
    fn test_unreadable_payload_is_skipped() {
        let mut recount = Recount::new(480);
        recount.observe(&raw(1, "a", "PostToolUse", json!("not an object"), 0));
        assert_eq!(recount.skipped(), 1);
        assert_eq!(recount.finish(), BackfillCounters::default());
    }

    #[test]
    fn test_apply_keeps_xp_and_streaks() {
        let mut stats = DeviceStats {
            total_xp: 900,
            level: 4,
            current_streak: 3,
            total_commits: 99,
            ..DeviceStats::default()
        };
        let counters = BackfillCounters {
            total_commits: 7,
            ..BackfillCounters::default()
        };
        counters.apply_to(&mut stats);
        assert_eq!(stats.total_commits, 7);
        assert_eq!(stats.total_xp, 900);
        assert_eq!(stats.level, 4);
        assert_eq!(stats.current_streak, 3);
    }

    #[test]
    fn test_diff_lists_changed_columns() {
        let before = BackfillCounters {
            total_commits: 3,
            ..BackfillCounters::default()
        };
        let after = BackfillCounters {
            total_commits: 5,
            ..BackfillCounters::default()
        };
        let diff = before.diff(&after);
        assert_eq!(diff, vec![("total_commits", "3".to_string(), "5".to_string())]);
        assert!(after.diff(&after).is_empty());
    }
}
