//! Core domain types for Questhook

mod device;
mod event;
mod raw_event;
mod reward;
mod stats;

pub use device::{Device, DeviceId, DeviceIdError};
pub use event::{EventError, EventKind, HookEvent, HookPayload, ShellRun, ToolUse, SHELL_TOOL};
pub use raw_event::RawEvent;
pub use reward::{LedgerEntry, RewardSource};
pub use stats::DeviceStats;
