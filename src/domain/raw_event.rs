//! Archived hook payloads

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::DeviceId;

/// One archived payload, as accepted by the event endpoint.
///
/// `id` is assigned by the store and orders events oldest first; it is 0 for
/// an event that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub id: i64,
    pub device_id: DeviceId,
    pub session_id: Option<String>,
    pub event_kind: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(
        device_id: &DeviceId,
        session_id: Option<String>,
        event_kind: impl Into<String>,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            device_id: device_id.clone(),
            session_id,
            event_kind: event_kind.into(),
            payload,
            received_at,
        }
    }
}
