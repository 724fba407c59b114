//! Reward sources and the XP ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceId;

/// Why XP was (or would have been) awarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    Commit,
    TestPass,
    Branch,
    Pr,
    MergedPr,
    Streak,
    SessionCommit,
    QuestComplete,
    Install,
    FirstSession,
}

impl RewardSource {
    /// Label stored in the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::TestPass => "test_pass",
            Self::Branch => "branch",
            Self::Pr => "pr",
            Self::MergedPr => "merged_pr",
            Self::Streak => "streak",
            Self::SessionCommit => "session_commit",
            Self::QuestComplete => "quest_complete",
            Self::Install => "install",
            Self::FirstSession => "first_session",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "commit" => Some(Self::Commit),
            "test_pass" => Some(Self::TestPass),
            "branch" => Some(Self::Branch),
            "pr" => Some(Self::Pr),
            "merged_pr" => Some(Self::MergedPr),
            "streak" => Some(Self::Streak),
            "session_commit" => Some(Self::SessionCommit),
            "quest_complete" => Some(Self::QuestComplete),
            "install" => Some(Self::Install),
            "first_session" => Some(Self::FirstSession),
            _ => None,
        }
    }
}

/// One immutable row of the XP ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub device_id: DeviceId,
    pub source: RewardSource,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(device_id: &DeviceId, source: RewardSource, amount: i64, at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.clone(),
            source,
            amount,
            created_at: at,
        }
    }
}
