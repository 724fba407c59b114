//! Reward engine: classification, counters, streaks, levels, quests and the
//! event pipeline that ties them together

pub mod classifier;
pub mod counters;
pub mod dedup;
pub mod levels;
pub mod processor;
pub mod quests;
pub mod streaks;

pub use classifier::{classify, Classification, CommitStats};
pub use dedup::{fingerprint, DedupGate};
pub use levels::{compute_level, level_title, xp_for_level, LevelProgress};
pub use processor::{EventOutcome, EventProcessor, EventResponse};
pub use quests::{Quest, QuestCompletion, QuestId, QuestProgress, QuestState, QUESTS};
pub use streaks::{compute_streak, StreakOutcome};
