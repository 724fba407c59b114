//! Shared test utilities for pipeline and API tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use questhook::config::RewardSettings;
use questhook::domain::{DeviceId, HookEvent};
use questhook::rewards::EventProcessor;
use questhook::store::{RewardStore, SqliteStore};

/// A file-backed store in a temp directory. Keep the `TempDir` alive for the
/// duration of the test.
pub fn create_test_store() -> (TempDir, Arc<SqliteStore>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = SqliteStore::open(
        &temp_dir.path().join("questhook.db"),
        std::time::Duration::from_secs(5),
    )
    .expect("Failed to open store");
    (temp_dir, Arc::new(store))
}

/// Register a device through the accounts service and return its id
pub fn register_device(store: &Arc<SqliteStore>, name: &str) -> DeviceId {
    let id = DeviceId::generate();
    let accounts = questhook::accounts::Accounts::new(store.clone(), RewardSettings::default());
    accounts
        .register(id.as_str(), name, Utc::now())
        .expect("Failed to register device");
    id
}

pub fn processor(store: &Arc<SqliteStore>) -> EventProcessor {
    let store: Arc<dyn RewardStore> = store.clone();
    EventProcessor::new(store, RewardSettings::default())
}

/// Fixed instant used by most tests
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

/// JSON body of a finished shell command
pub fn shell_payload(session: &str, invocation: &str, command: &str, exit_code: i64) -> Value {
    json!({
        "hook_event_name": "PostToolUse",
        "session_id": session,
        "tool_name": "Bash",
        "tool_use_id": invocation,
        "tool_input": { "command": command },
        "tool_response": { "exit_code": exit_code, "stdout": "" }
    })
}

pub fn session_payload(kind: &str, session: &str) -> Value {
    json!({ "hook_event_name": kind, "session_id": session })
}

/// Parse a payload the way the HTTP handler does
pub fn event(payload: &Value) -> (HookEvent, Value) {
    HookEvent::parse(&payload.to_string()).expect("Failed to parse event")
}
