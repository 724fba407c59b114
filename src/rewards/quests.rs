//! Quest catalogue and progress evaluation
//!
//! Two kinds of quests:
//! - **daily** quests count occurrences of an event within one UTC day and
//!   can be completed once per day (`Idle -> ActiveToday -> CompletedToday`,
//!   back to `Idle` at the day boundary)
//! - **progressive** quests read a career counter and complete once, forever
//!   (`NotStarted -> InProgress -> Completed`)

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::{DeviceId, DeviceStats, LedgerEntry, RewardSource};

/// Unique identifier for each quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuestId {
    // Daily
    DailyShipIt,
    DailyQualityCheck,
    DailyCodeToday,
    // Commits
    FirstBlood,
    GettingStarted,
    ShippingMachine,
    // Tests
    TestBeliever,
    TestEvangelist,
    // Streaks
    ConsistentCoder,
    LegendaryStreak,
    // Pull requests
    PrMaker,
    PrMachine,
    // Craft
    Polyglot,
}

impl QuestId {
    /// Get the string ID for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyShipIt => "daily_ship_it",
            Self::DailyQualityCheck => "daily_quality_check",
            Self::DailyCodeToday => "daily_code_today",
            Self::FirstBlood => "prog_first_blood",
            Self::GettingStarted => "prog_getting_started",
            Self::ShippingMachine => "prog_shipping_machine",
            Self::TestBeliever => "prog_test_believer",
            Self::TestEvangelist => "prog_test_evangelist",
            Self::ConsistentCoder => "prog_streak_7",
            Self::LegendaryStreak => "prog_streak_30",
            Self::PrMaker => "prog_pr_maker",
            Self::PrMachine => "prog_pr_machine",
            Self::Polyglot => "craft_polyglot",
        }
    }

    /// Parse from database string
    pub fn from_str(s: &str) -> Option<Self> {
        QUESTS.iter().map(|q| q.id).find(|id| id.as_str() == s)
    }
}

/// Career counter a progressive quest reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCounter {
    Commits,
    TestPasses,
    LongestStreak,
    Prs,
    DistinctExtensions,
}

impl StatCounter {
    pub fn read(&self, stats: &DeviceStats) -> u32 {
        match self {
            Self::Commits => stats.total_commits,
            Self::TestPasses => stats.total_test_passes,
            Self::LongestStreak => stats.longest_streak,
            Self::Prs => stats.total_prs,
            Self::DistinctExtensions => {
                u32::try_from(stats.file_extensions.len()).unwrap_or(u32::MAX)
            }
        }
    }
}

/// What drives a quest's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestTrack {
    /// Occurrences of the triggering event today
    Daily,
    /// A career counter, monotonic
    Progressive(StatCounter),
}

impl QuestTrack {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Progressive(_) => "progressive",
        }
    }
}

/// Event that may advance quests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestTrigger {
    Commit,
    TestPass,
    Pr,
    SessionCommit,
    Streak,
    FileExtension,
}

impl QuestTrigger {
    /// Trigger for a reward source, if that source advances any quest
    pub fn for_source(source: RewardSource) -> Option<Self> {
        match source {
            RewardSource::Commit => Some(Self::Commit),
            RewardSource::TestPass => Some(Self::TestPass),
            RewardSource::Pr => Some(Self::Pr),
            RewardSource::SessionCommit => Some(Self::SessionCommit),
            RewardSource::Streak => Some(Self::Streak),
            _ => None,
        }
    }

    /// Quests this trigger can advance
    pub fn quests(&self) -> &'static [QuestId] {
        match self {
            Self::Commit => &[
                QuestId::DailyShipIt,
                QuestId::FirstBlood,
                QuestId::GettingStarted,
                QuestId::ShippingMachine,
            ],
            Self::TestPass => &[
                QuestId::DailyQualityCheck,
                QuestId::TestBeliever,
                QuestId::TestEvangelist,
            ],
            Self::Pr => &[QuestId::PrMaker, QuestId::PrMachine],
            Self::SessionCommit => &[QuestId::DailyCodeToday],
            Self::Streak => &[QuestId::ConsistentCoder, QuestId::LegendaryStreak],
            Self::FileExtension => &[QuestId::Polyglot],
        }
    }
}

/// Quest definition with all metadata
#[derive(Debug, Clone)]
pub struct Quest {
    pub id: QuestId,
    pub name: &'static str,
    pub description: &'static str,
    pub track: QuestTrack,
    pub goal: u32,
    pub xp_reward: i64,
}

impl Quest {
    pub fn get(id: QuestId) -> &'static Quest {
        QUESTS
            .iter()
            .find(|q| q.id == id)
            .expect("every QuestId has a catalogue entry")
    }

    pub fn is_daily(&self) -> bool {
        self.track == QuestTrack::Daily
    }
}

/// All quest definitions
pub static QUESTS: &[Quest] = &[
    Quest {
        id: QuestId::DailyShipIt,
        name: "Ship It",
        description: "Make at least 1 commit today",
        track: QuestTrack::Daily,
        goal: 1,
        xp_reward: 15,
    },
    Quest {
        id: QuestId::DailyQualityCheck,
        name: "Quality Check",
        description: "Run tests and pass them today",
        track: QuestTrack::Daily,
        goal: 1,
        xp_reward: 10,
    },
    Quest {
        id: QuestId::DailyCodeToday,
        name: "Code Today",
        description: "End a session with a commit",
        track: QuestTrack::Daily,
        goal: 1,
        xp_reward: 20,
    },
    Quest {
        id: QuestId::FirstBlood,
        name: "First Blood",
        description: "Make your first commit",
        track: QuestTrack::Progressive(StatCounter::Commits),
        goal: 1,
        xp_reward: 50,
    },
    Quest {
        id: QuestId::GettingStarted,
        name: "Getting Started",
        description: "Make 5 commits",
        track: QuestTrack::Progressive(StatCounter::Commits),
        goal: 5,
        xp_reward: 75,
    },
    Quest {
        id: QuestId::ShippingMachine,
        name: "Shipping Machine",
        description: "Make 50 commits",
        track: QuestTrack::Progressive(StatCounter::Commits),
        goal: 50,
        xp_reward: 200,
    },
    Quest {
        id: QuestId::TestBeliever,
        name: "Test Believer",
        description: "Pass tests 10 times",
        track: QuestTrack::Progressive(StatCounter::TestPasses),
        goal: 10,
        xp_reward: 100,
    },
    Quest {
        id: QuestId::TestEvangelist,
        name: "Test Evangelist",
        description: "Pass tests 100 times",
        track: QuestTrack::Progressive(StatCounter::TestPasses),
        goal: 100,
        xp_reward: 500,
    },
    Quest {
        id: QuestId::ConsistentCoder,
        name: "Consistent Coder",
        description: "7-day coding streak",
        track: QuestTrack::Progressive(StatCounter::LongestStreak),
        goal: 7,
        xp_reward: 150,
    },
    Quest {
        id: QuestId::LegendaryStreak,
        name: "Legendary Streak",
        description: "30-day coding streak",
        track: QuestTrack::Progressive(StatCounter::LongestStreak),
        goal: 30,
        xp_reward: 1000,
    },
    Quest {
        id: QuestId::PrMaker,
        name: "PR Maker",
        description: "Create your first PR",
        track: QuestTrack::Progressive(StatCounter::Prs),
        goal: 1,
        xp_reward: 100,
    },
    Quest {
        id: QuestId::PrMachine,
        name: "PR Machine",
        description: "Create 10 PRs",
        track: QuestTrack::Progressive(StatCounter::Prs),
        goal: 10,
        xp_reward: 300,
    },
    Quest {
        id: QuestId::Polyglot,
        name: "Polyglot",
        description: "Work in 5 different file types",
        track: QuestTrack::Progressive(StatCounter::DistinctExtensions),
        goal: 5,
        xp_reward: 75,
    },
];

/// Stored progress for one (device, quest)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestProgress {
    pub quest_id: QuestId,
    pub current_value: u32,
    /// Day the daily counter belongs to
    pub reset_on: Option<NaiveDate>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuestProgress {
    pub fn new(quest_id: QuestId) -> Self {
        Self {
            quest_id,
            current_value: 0,
            reset_on: None,
            completed_at: None,
        }
    }

    /// Daily counter value for `today`, 0 if the row belongs to another day.
    pub fn value_on(&self, today: NaiveDate) -> u32 {
        if self.reset_on == Some(today) {
            self.current_value
        } else {
            0
        }
    }

    /// Whether the quest is done for the period containing `today`.
    pub fn is_completed(&self, quest: &Quest, today: NaiveDate) -> bool {
        match (quest.track, self.completed_at) {
            (_, None) => false,
            (QuestTrack::Progressive(_), Some(_)) => true,
            (QuestTrack::Daily, Some(at)) => at.date_naive() == today,
        }
    }
}

/// Progress rows keyed by quest
pub type ProgressMap = HashMap<QuestId, QuestProgress>;

/// Observable quest state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestState {
    NotStarted,
    InProgress,
    Completed,
    Idle,
    ActiveToday,
    CompletedToday,
}

/// Current counter value for a quest
pub fn counter_value(
    quest: &Quest,
    stats: &DeviceStats,
    progress: Option<&QuestProgress>,
    today: NaiveDate,
) -> u32 {
    match quest.track {
        QuestTrack::Daily => progress.map(|p| p.value_on(today)).unwrap_or(0),
        QuestTrack::Progressive(counter) => counter.read(stats),
    }
}

/// State machine position of a quest
pub fn quest_state(
    quest: &Quest,
    stats: &DeviceStats,
    progress: Option<&QuestProgress>,
    today: NaiveDate,
) -> QuestState {
    let completed = progress.is_some_and(|p| p.is_completed(quest, today));
    let value = counter_value(quest, stats, progress, today);
    match (quest.track, completed, value) {
        (QuestTrack::Progressive(_), true, _) => QuestState::Completed,
        (QuestTrack::Progressive(_), false, 0) => QuestState::NotStarted,
        (QuestTrack::Progressive(_), false, _) => QuestState::InProgress,
        (QuestTrack::Daily, true, _) => QuestState::CompletedToday,
        (QuestTrack::Daily, false, 0) => QuestState::Idle,
        (QuestTrack::Daily, false, _) => QuestState::ActiveToday,
    }
}

/// A quest that was just completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestCompletion {
    pub quest_id: &'static str,
    pub quest_name: &'static str,
    pub xp_awarded: i64,
}

/// Ledger entries and quest rows a request has produced but not yet written.
///
/// Everything staged here is committed together with the stats flush.
#[derive(Debug, Default)]
pub struct PendingWrites {
    pub ledger: Vec<LedgerEntry>,
    pub progress: Vec<QuestProgress>,
}

impl PendingWrites {
    pub fn credit(&mut self, entry: LedgerEntry) {
        self.ledger.push(entry);
    }

    /// Stage the latest version of a progress row
    pub fn stage_progress(&mut self, row: &QuestProgress) {
        match self.progress.iter_mut().find(|p| p.quest_id == row.quest_id) {
            Some(staged) => *staged = row.clone(),
            None => self.progress.push(row.clone()),
        }
    }

    /// Staged ledger entries from `source`
    pub fn count(&self, source: RewardSource) -> u32 {
        let n = self.ledger.iter().filter(|e| e.source == source).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

/// Evaluates quests for one device during one request.
///
/// Changed progress rows and quest ledger entries are staged in a
/// [`PendingWrites`]. The quest bonus is added to `stats.total_xp` in place,
/// so the caller's aggregate always holds the real total.
pub struct QuestEngine<'a> {
    device_id: &'a DeviceId,
    today: NaiveDate,
    now: DateTime<Utc>,
}

impl<'a> QuestEngine<'a> {
    pub fn new(device_id: &'a DeviceId, now: DateTime<Utc>) -> Self {
        Self {
            device_id,
            today: now.date_naive(),
            now,
        }
    }

    /// Advance every quest relevant to `trigger` and collect completions.
    pub fn check(
        &self,
        stats: &mut DeviceStats,
        progress: &mut ProgressMap,
        pending: &mut PendingWrites,
        trigger: QuestTrigger,
    ) -> Vec<QuestCompletion> {
        let mut completions = Vec::new();

        for &id in trigger.quests() {
            let quest = Quest::get(id);
            let row = progress.entry(id).or_insert_with(|| QuestProgress::new(id));

            if !quest.is_daily() && row.completed_at.is_some() {
                continue;
            }

            let mut value = counter_value(quest, stats, Some(row), self.today);
            if quest.is_daily() {
                value += 1;
                row.current_value = value;
                row.reset_on = Some(self.today);
                pending.stage_progress(row);
            }

            if value < quest.goal || row.is_completed(quest, self.today) {
                continue;
            }

            row.completed_at = Some(self.now);
            if !quest.is_daily() {
                row.current_value = value;
            }
            pending.stage_progress(row);
            pending.credit(LedgerEntry::new(
                self.device_id,
                RewardSource::QuestComplete,
                quest.xp_reward,
                self.now,
            ));
            stats.total_xp += quest.xp_reward;

            tracing::info!(
                "[questhook:quests] {} completed {} (+{} XP)",
                self.device_id.short(),
                quest.id.as_str(),
                quest.xp_reward
            );
            completions.push(QuestCompletion {
                quest_id: quest.id.as_str(),
                quest_name: quest.name,
                xp_awarded: quest.xp_reward,
            });
        }

        completions
    }
}
