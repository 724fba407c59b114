//! Daily session streaks
//!
//! Pure functions. The caller guarantees one call per session end; repeated
//! session ends on the same day are absorbed by the same-day rule.

use chrono::{Days, NaiveDate};

/// XP per streak day
pub const STREAK_XP_PER_DAY: i64 = 10;

/// Outcome of a session end for the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakOutcome {
    pub xp: i64,
    pub streak: u32,
}

/// Compute streak continuation and its XP.
///
/// - same day as the last session: nothing changes
/// - the day after: the streak grows and pays `10 * new_streak`
/// - anything else: the streak restarts at 1 and pays 10
pub fn compute_streak(last_session: Option<NaiveDate>, current: u32, today: NaiveDate) -> StreakOutcome {
    if last_session == Some(today) {
        return StreakOutcome {
            xp: 0,
            streak: current,
        };
    }

    let yesterday = today.checked_sub_days(Days::new(1));
    let streak = if last_session.is_some() && last_session == yesterday {
        current + 1
    } else {
        1
    };

    StreakOutcome {
        xp: STREAK_XP_PER_DAY * i64::from(streak),
        streak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_first_session_starts_streak() {
        let d = day("2026-03-10");
        assert_eq!(compute_streak(None, 0, d), StreakOutcome { xp: 10, streak: 1 });
    }

    #[test]
    fn test_consecutive_day_extends() {
        let d = day("2026-03-10");
        assert_eq!(
            compute_streak(Some(day("2026-03-09")), 5, d),
            StreakOutcome { xp: 60, streak: 6 }
        );
    }

    #[test]
    fn test_same_day_is_noop() {
        let d = day("2026-03-10");
        assert_eq!(compute_streak(Some(d), 5, d), StreakOutcome { xp: 0, streak: 5 });
    }

    #[test]
    fn test_gap_resets() {
        let d = day("2026-03-10");
        assert_eq!(
            compute_streak(Some(day("2026-03-08")), 10, d),
            StreakOutcome { xp: 10, streak: 1 }
        );
    }

    #[test]
    fn test_month_boundary() {
        assert_eq!(
            compute_streak(Some(day("2026-02-28")), 2, day("2026-03-01")),
            StreakOutcome { xp: 30, streak: 3 }
        );
    }
}
