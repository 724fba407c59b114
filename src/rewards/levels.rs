//! XP and Level system
//!
//! Levels follow a square-root curve: reaching level `L` takes `L² * 50` XP.
//! Titles come from a small threshold table.

use serde::Serialize;

/// XP multiplier of the level curve
const XP_PER_LEVEL_SQUARED: i64 = 50;

/// Title thresholds (must be sorted by level, descending)
pub static TITLES: &[(u32, &str)] = &[
    (30, "Legendary Promptsmith"),
    (20, "Architecture Overlord"),
    (15, "Refactor Mage"),
    (10, "Code Conjurer"),
    (5, "Context Crafter"),
    (1, "Prompt Padawan"),
    (0, "New Recruit"),
];

/// Level for a total XP amount. Zero and negative XP map to level 0.
pub fn compute_level(total_xp: i64) -> u32 {
    if total_xp <= 0 {
        return 0;
    }
    let ratio = total_xp / XP_PER_LEVEL_SQUARED;
    let mut level = (ratio as f64).sqrt() as i64;
    // Float sqrt can land one off near perfect squares.
    while level * level > ratio {
        level -= 1;
    }
    while (level + 1) * (level + 1) <= ratio {
        level += 1;
    }
    u32::try_from(level).unwrap_or(u32::MAX)
}

/// Minimum XP needed to reach `level`.
pub fn xp_for_level(level: u32) -> i64 {
    let level = i64::from(level);
    level * level * XP_PER_LEVEL_SQUARED
}

/// Title shown for a level
pub fn level_title(level: u32) -> &'static str {
    TITLES
        .iter()
        .find(|(threshold, _)| level >= *threshold)
        .map(|(_, title)| *title)
        .unwrap_or("New Recruit")
}

/// Level progress as shown on a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub level: u32,
    pub title: &'static str,
    /// XP earned since reaching the current level
    pub xp_in_level: i64,
    /// XP span between the current and the next level
    pub xp_to_next_level: i64,
}

impl LevelProgress {
    pub fn for_xp(total_xp: i64) -> Self {
        let level = compute_level(total_xp);
        let current = xp_for_level(level);
        let next = xp_for_level(level.saturating_add(1));
        Self {
            level,
            title: level_title(level),
            xp_in_level: total_xp.max(0) - current,
            xp_to_next_level: next - current,
        }
    }
}
