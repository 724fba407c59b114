//! Inbound hook events
//!
//! The hook client posts loosely shaped JSON. [`HookPayload`] mirrors that
//! wire shape (unknown fields are ignored), and [`HookEvent`] is the validated
//! form the reward engine works with.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool name of the shell-execution tool
pub const SHELL_TOOL: &str = "Bash";

/// Tools whose `file_path` argument feeds the file-extension tracker
const FILE_TOOLS: &[&str] = &["Edit", "Write"];

/// Wire shape of a hook event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub hook_event_name: String,
    pub session_id: Option<String>,
    pub tool_name: Option<String>,
    #[serde(alias = "tool_call_id")]
    pub tool_use_id: Option<String>,
    pub tool_input: Option<Value>,
    pub tool_response: Option<Value>,
    pub cwd: Option<String>,
    pub duration_ms: Option<u64>,
}

/// Error type for payload validation
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing hook_event_name")]
    MissingKind,
}

/// A validated hook event
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    pub session_id: Option<String>,
    /// Per-invocation id (`tool_use_id`), absent for session-level events
    pub invocation_id: Option<String>,
    pub cwd: Option<String>,
    pub duration_ms: Option<u64>,
    pub kind: EventKind,
}

/// What happened
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    PostToolUse(ToolUse),
    /// Any other hook (Stop, Notification, ...): archived, never rewarded
    Other(String),
}

/// The tool a `PostToolUse` event reports on
#[derive(Debug, Clone, PartialEq)]
pub enum ToolUse {
    Shell(ShellRun),
    FileEdit { file_path: String },
    Other(String),
}

/// A finished shell command
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShellRun {
    pub command: String,
    pub exit_code: Option<i64>,
    pub stdout: String,
}

impl ShellRun {
    pub fn new(command: impl Into<String>, exit_code: Option<i64>) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stdout: String::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Only an explicit zero exit code counts as success.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl HookEvent {
    /// Parse and validate a JSON body.
    ///
    /// Returns the typed event together with the untouched JSON value, which
    /// the caller archives verbatim.
    pub fn parse(body: &str) -> Result<(Self, Value), EventError> {
        let raw: Value = serde_json::from_str(body)?;
        let payload: HookPayload = serde_json::from_value(raw.clone())?;
        let event = Self::from_payload(&payload)?;
        Ok((event, raw))
    }

    /// Validate a wire payload into a typed event
    pub fn from_payload(payload: &HookPayload) -> Result<Self, EventError> {
        let name = payload.hook_event_name.trim();
        if name.is_empty() {
            return Err(EventError::MissingKind);
        }

        let kind = match name {
            "SessionStart" => EventKind::SessionStart,
            "SessionEnd" => EventKind::SessionEnd,
            "PostToolUse" => EventKind::PostToolUse(tool_use(payload)),
            other => EventKind::Other(other.to_string()),
        };

        Ok(Self {
            session_id: non_empty(payload.session_id.as_deref()),
            invocation_id: non_empty(payload.tool_use_id.as_deref()),
            cwd: payload.cwd.clone(),
            duration_ms: payload.duration_ms,
            kind,
        })
    }

    /// Hook name as sent on the wire
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            EventKind::SessionStart => "SessionStart",
            EventKind::SessionEnd => "SessionEnd",
            EventKind::PostToolUse(_) => "PostToolUse",
            EventKind::Other(name) => name,
        }
    }

    pub fn shell_run(&self) -> Option<&ShellRun> {
        match &self.kind {
            EventKind::PostToolUse(ToolUse::Shell(run)) => Some(run),
            _ => None,
        }
    }

    pub fn is_session_start(&self) -> bool {
        matches!(self.kind, EventKind::SessionStart)
    }

    pub fn is_session_end(&self) -> bool {
        matches!(self.kind, EventKind::SessionEnd)
    }
}

fn tool_use(payload: &HookPayload) -> ToolUse {
    let tool = payload.tool_name.as_deref().unwrap_or_default();
    let input = payload.tool_input.as_ref();
    let response = payload.tool_response.as_ref();

    if tool == SHELL_TOOL {
        return ToolUse::Shell(ShellRun {
            command: string_field(input, "command"),
            exit_code: response
                .and_then(|r| r.get("exit_code"))
                .and_then(Value::as_i64),
            stdout: string_field(response, "stdout"),
        });
    }

    if FILE_TOOLS.contains(&tool) {
        return ToolUse::FileEdit {
            file_path: string_field(input, "file_path"),
        };
    }

    ToolUse::Other(tool.to_string())
}

fn string_field(value: Option<&Value>, key: &str) -> String {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
