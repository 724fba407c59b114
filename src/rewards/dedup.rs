//! Exactly-once gate for hook events
//!
//! Hook clients retry, so the same tool invocation can arrive more than once.
//! Each event is reduced to a fingerprint and the gate inserts a marker for
//! it; only the request whose insert wins goes on to be rewarded.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::domain::{DeviceId, HookEvent};
use crate::store::{InsertOutcome, RewardStore};

/// Hex characters kept from the digest
const FINGERPRINT_LEN: usize = 32;

/// Stable fingerprint of an event: `sha256("{session}:{kind}:{invocation}")`,
/// hex, first 32 characters.
///
/// Session-level events have no invocation id and fall back to the session
/// id, so every session gets at most one `SessionStart` / `SessionEnd`.
pub fn fingerprint(event: &HookEvent) -> String {
    let session = event.session_id.as_deref().unwrap_or("no-session");
    let invocation = event
        .invocation_id
        .as_deref()
        .or(event.session_id.as_deref())
        .unwrap_or("unknown");

    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", session, event.kind_name(), invocation).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Insert-if-absent gate over the processed-event markers
pub struct DedupGate<'a> {
    store: &'a dyn RewardStore,
}

impl<'a> DedupGate<'a> {
    pub fn new(store: &'a dyn RewardStore) -> Self {
        Self { store }
    }

    /// Claim `fingerprint` for `device_id`. Returns true if it was already
    /// claimed.
    ///
    /// A failed insert also counts as a duplicate.
    pub fn is_duplicate(&self, fingerprint: &str, device_id: &DeviceId, at: DateTime<Utc>) -> bool {
        match self.store.mark_processed(fingerprint, device_id, at) {
            Ok(InsertOutcome::Inserted) => false,
            Ok(InsertOutcome::AlreadyPresent) => {
                tracing::debug!(
                    "[questhook:dedup] {} duplicate event {}",
                    device_id.short(),
                    fingerprint
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    "[questhook:dedup] {} unexpected marker insert failure for {}: {}",
                    device_id.short(),
                    fingerprint,
                    e
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, ShellRun, ToolUse};

    fn event(session: Option<&str>, invocation: Option<&str>, kind: EventKind) -> HookEvent {
        HookEvent {
            session_id: session.map(str::to_string),
            invocation_id: invocation.map(str::to_string),
            cwd: None,
            duration_ms: None,
            kind,
        }
    }

    fn commit() -> EventKind {
        EventKind::PostToolUse(ToolUse::Shell(ShellRun::new("git commit -m x", Some(0))))
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint(&event(Some("s"), Some("t"), commit()));
        assert_eq!(fp.len(), 32);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_matches_digest_of_key() {
        let fp = fingerprint(&event(Some("s-1"), Some("toolu_1"), commit()));
        let expected = hex::encode(Sha256::digest(b"s-1:PostToolUse:toolu_1"));
        assert_eq!(fp, &expected[..32]);
    }

    #[test]
    fn test_fingerprint_ignores_payload_details() {
        let a = event(Some("s"), Some("t"), commit());
        let b = event(
            Some("s"),
            Some("t"),
            EventKind::PostToolUse(ToolUse::Shell(ShellRun::new("pytest", Some(1)))),
        );
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_distinguishes_invocations_and_kinds() {
        let a = fingerprint(&event(Some("s"), Some("t1"), commit()));
        let b = fingerprint(&event(Some("s"), Some("t2"), commit()));
        let start = fingerprint(&event(Some("s"), None, EventKind::SessionStart));
        let end = fingerprint(&event(Some("s"), None, EventKind::SessionEnd));
        assert_ne!(a, b);
        assert_ne!(start, end);
    }

    #[test]
    fn test_fingerprint_fallbacks() {
        let expected = hex::encode(Sha256::digest(b"no-session:Stop:unknown"));
        let fp = fingerprint(&event(None, None, EventKind::Other("Stop".to_string())));
        assert_eq!(fp, &expected[..32]);

        let expected = hex::encode(Sha256::digest(b"s-9:SessionEnd:s-9"));
        let fp = fingerprint(&event(Some("s-9"), None, EventKind::SessionEnd));
        assert_eq!(fp, &expected[..32]);
    }
}
