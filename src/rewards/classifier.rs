//! Event classification
//!
//! Maps a hook event to a reward source and a base XP amount. Pure, no I/O.
//! Also hosts the two raw-stat extractors (commit diffstat and file
//! extension) that feed counters without awarding XP themselves.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{EventKind, HookEvent, RewardSource, ShellRun, ToolUse};

static COMMIT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgit\s+commit\b").expect("valid commit regex"));

static TEST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(pytest|jest|vitest|npm\s+test|yarn\s+test|go\s+test|cargo\s+test|rspec|mocha|phpunit|dotnet\s+test|mvn\s+test|gradle\s+test)\b",
    )
    .expect("valid test regex")
});

// A branch name is required: bare `git checkout -b` does not count.
static BRANCH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bgit\s+(?:checkout\s+-b|switch\s+-c)\s+[^\s-]\S*").expect("valid branch regex")
});

static PR_CREATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgh\s+pr\s+create\b").expect("valid pr create regex"));

static PR_MERGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bgh\s+pr\s+merge\b").expect("valid pr merge regex"));

static DIFFSTAT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d+) files? changed(?:, (\d+) insertions?\(\+\))?(?:, (\d+) deletions?\(-\))?",
    )
    .expect("valid diffstat regex")
});

/// Longest file extension still treated as a language marker
const MAX_EXTENSION_LEN: usize = 10;

/// XP table for shell command families
pub struct BaseXp;

impl BaseXp {
    pub const COMMIT: i64 = 15;
    pub const TEST_PASS: i64 = 8;
    pub const BRANCH: i64 = 0;
    pub const PR: i64 = 10;
    pub const MERGED_PR: i64 = 20;
}

/// Result of classifying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub xp: i64,
    pub source: Option<RewardSource>,
}

impl Classification {
    pub const NONE: Self = Self { xp: 0, source: None };

    fn new(xp: i64, source: RewardSource) -> Self {
        Self {
            xp,
            source: Some(source),
        }
    }

    /// Ledger label, empty when the event earns nothing
    pub fn label(&self) -> &'static str {
        self.source.map(|s| s.as_str()).unwrap_or("")
    }
}

/// Diffstat parsed from `git commit` output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitStats {
    pub files_changed: u32,
    pub insertions: i64,
    pub deletions: i64,
}

/// Classify a hook event.
pub fn classify(event: &HookEvent) -> Classification {
    match &event.kind {
        EventKind::PostToolUse(ToolUse::Shell(run)) => classify_shell(run),
        _ => Classification::NONE,
    }
}

/// Classify a finished shell command. First match in table order wins.
pub fn classify_shell(run: &ShellRun) -> Classification {
    if !run.succeeded() {
        return Classification::NONE;
    }
    let cmd = run.command.as_str();

    if is_commit_command(cmd) {
        Classification::new(BaseXp::COMMIT, RewardSource::Commit)
    } else if is_test_command(cmd) {
        Classification::new(BaseXp::TEST_PASS, RewardSource::TestPass)
    } else if is_branch_command(cmd) {
        Classification::new(BaseXp::BRANCH, RewardSource::Branch)
    } else if is_pr_create_command(cmd) {
        Classification::new(BaseXp::PR, RewardSource::Pr)
    } else if is_pr_merge_command(cmd) {
        Classification::new(BaseXp::MERGED_PR, RewardSource::MergedPr)
    } else {
        Classification::NONE
    }
}

pub fn is_commit_command(cmd: &str) -> bool {
    COMMIT_PATTERN.is_match(cmd)
}

pub fn is_test_command(cmd: &str) -> bool {
    TEST_PATTERN.is_match(cmd)
}

pub fn is_branch_command(cmd: &str) -> bool {
    BRANCH_PATTERN.is_match(cmd)
}

pub fn is_pr_create_command(cmd: &str) -> bool {
    PR_CREATE_PATTERN.is_match(cmd)
}

pub fn is_pr_merge_command(cmd: &str) -> bool {
    PR_MERGE_PATTERN.is_match(cmd)
}

/// Parse `"3 files changed, 42 insertions(+), 7 deletions(-)"`.
///
/// The file count is required; insertions and deletions default to 0.
/// Returns `None` when the text carries no diffstat.
pub fn parse_commit_stats(stdout: &str) -> Option<CommitStats> {
    let caps = DIFFSTAT_PATTERN.captures(stdout)?;
    let number = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<i64>().ok());

    Some(CommitStats {
        files_changed: caps.get(1)?.as_str().parse().ok()?,
        insertions: number(2).unwrap_or(0),
        deletions: number(3).unwrap_or(0),
    })
}

/// Lowercase extension of an edited file, if it looks like a real one.
///
/// Dotfiles without a suffix, extension-less names and suffixes longer than
/// ten characters yield `None`.
pub fn extract_file_extension(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (base, ext) = name.rsplit_once('.')?;

    if base.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    Some(ext.to_lowercase())
}
