//! Questhook - gamified coding activity
//!
//! Coding-assistant hooks on each developer machine report tool events
//! (shell commands, file edits, session start and end) to a small HTTP
//! service. The service turns them into experience points, levels, daily
//! streaks and quests, and serves profiles and a leaderboard back.
//!
//! ## Pipeline
//!
//! Every event is fingerprinted and deduplicated, archived raw, classified
//! into at most one reward source, and then credited against the device's
//! stats and quest progress. See [`rewards::EventProcessor`].

pub mod accounts;
pub mod backfill;
pub mod config;
pub mod domain;
pub mod rewards;
pub mod server;
pub mod store;
pub mod time_bucket;

pub use domain::*;
