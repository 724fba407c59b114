//! Per-device running totals

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stats row, one per device.
///
/// Loaded once per request, mutated in memory by every pipeline step and
/// flushed once at the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub total_xp: i64,
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_session_date: Option<NaiveDate>,

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

impl DeviceStats {
    /// Fresh stats for a newly registered device
    pub fn with_xp(total_xp: i64) -> Self {
        Self {
            total_xp,
            ..Self::default()
        }
    }
}
