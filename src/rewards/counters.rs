//! Running-total updates keyed by reward source

use crate::domain::{DeviceStats, RewardSource};

/// Return `stats` with the single counter `source` tracks bumped by one.
///
/// Sources without a counter (streak, quest bonuses, install, ...) leave the
/// stats untouched.
pub fn update_counters(stats: &DeviceStats, source: RewardSource) -> DeviceStats {
    let mut updated = stats.clone();
    match source {
        RewardSource::Commit => updated.total_commits += 1,
        RewardSource::TestPass => updated.total_test_passes += 1,
        RewardSource::Pr => updated.total_prs += 1,
        RewardSource::MergedPr => updated.total_merged_prs += 1,
        RewardSource::Branch => updated.total_branches += 1,
        RewardSource::Streak
        | RewardSource::SessionCommit
        | RewardSource::QuestComplete
        | RewardSource::Install
        | RewardSource::FirstSession => {}
    }
    updated
}

/// Add a file extension to the distinct set. Returns true if it was new.
pub fn record_extension(stats: &mut DeviceStats, ext: &str) -> bool {
    stats.file_extensions.insert(ext.to_string())
}
