//! Route handlers

use chrono::Utc;
use serde_json::{json, Value};
use tiny_http::Request;

use super::rate_limit::Bucket;
use super::types::{ApiError, RegisterRequest};
use super::{header_value, read_request_body, ApiState};
use crate::accounts::{ProfilePatch, RegisterOutcome};
use crate::domain::{DeviceId, HookEvent};
use crate::rewards::EventResponse;

pub(super) type Reply = (u16, Value);

pub(super) fn route(
    state: &ApiState,
    method: &str,
    path: &str,
    request: &mut Request,
) -> Result<Reply, ApiError> {
    match (method, path) {
        ("GET", "/health") => handle_health(state),
        ("POST", "/api/devices") => handle_register(state, request),
        ("POST", "/api/events") => handle_event(state, request),
        ("GET", "/api/leaderboard") => handle_leaderboard(state),
        ("DELETE", "/api/me") => handle_delete_me(state, request),
        ("GET", p) if p.starts_with("/api/profile/") => {
            handle_profile_get(state, path_param(p, "/api/profile/")?)
        }
        ("PATCH", p) if p.starts_with("/api/profile/") => {
            handle_profile_patch(state, path_param(p, "/api/profile/")?, request)
        }
        ("GET", p) if p.starts_with("/api/activity/") => {
            handle_activity(state, path_param(p, "/api/activity/")?)
        }
        _ => Err(ApiError::NotFound("no such route")),
    }
}

fn path_param<'a>(path: &'a str, prefix: &str) -> Result<&'a str, ApiError> {
    path.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty() && !rest.contains('/'))
        .ok_or(ApiError::NotFound("no such route"))
}

fn client_key(request: &Request) -> String {
    request
        .remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

fn enforce_limit(state: &ApiState, bucket: Bucket, request: &Request) -> Result<(), ApiError> {
    state.limiter.check(bucket, &client_key(request))?;
    Ok(())
}

/// Parse `Authorization: Bearer <device id>`
fn bearer_device(request: &Request) -> Result<DeviceId, ApiError> {
    let value = header_value(request, "Authorization").ok_or(ApiError::Unauthorized)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthorized)?;
    DeviceId::parse(token).map_err(|_| ApiError::Unauthorized)
}

/// Bearer device that is also registered
fn require_device(state: &ApiState, request: &Request) -> Result<DeviceId, ApiError> {
    let device_id = bearer_device(request)?;
    state.accounts.require_device(&device_id)?;
    Ok(device_id)
}

/// GET /health
fn handle_health(state: &ApiState) -> Result<Reply, ApiError> {
    match state.store.ping() {
        Ok(()) => Ok((200, json!({ "status": "ok", "db": "ok" }))),
        Err(e) => {
            tracing::error!("[questhook:http] Health check DB failure: {}", e);
            Err(ApiError::Unavailable)
        }
    }
}

/// POST /api/devices
fn handle_register(state: &ApiState, request: &mut Request) -> Result<Reply, ApiError> {
    enforce_limit(state, Bucket::Register, request)?;
    let body = read_request_body(request, state.max_body_bytes)?;
    let req: RegisterRequest = serde_json::from_str(&body).map_err(ApiError::from_json)?;

    match state
        .accounts
        .register(&req.device_id, &req.character_name, Utc::now())?
    {
        RegisterOutcome::Registered { xp_awarded } => Ok((
            201,
            json!({ "status": "registered", "xp_awarded": xp_awarded }),
        )),
        RegisterOutcome::AlreadyRegistered => Ok((200, json!({ "status": "already_registered" }))),
    }
}

/// POST /api/events
fn handle_event(state: &ApiState, request: &mut Request) -> Result<Reply, ApiError> {
    enforce_limit(state, Bucket::Events, request)?;
    let device_id = bearer_device(request)?;
    let body = read_request_body(request, state.max_body_bytes)?;
    let (event, payload) = HookEvent::parse(&body)?;
    state.accounts.require_device(&device_id)?;

    let outcome = state.processor.process(&device_id, &event, &payload)?;
    let response = serde_json::to_value(EventResponse::from(&outcome))
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((200, response))
}

/// GET /api/profile/{id}
fn handle_profile_get(state: &ApiState, device_id: &str) -> Result<Reply, ApiError> {
    let profile = state.accounts.profile(device_id, Utc::now())?;
    let body = serde_json::to_value(profile).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok((200, body))
}

/// PATCH /api/profile/{id}
fn handle_profile_patch(
    state: &ApiState,
    target: &str,
    request: &mut Request,
) -> Result<Reply, ApiError> {
    let caller = require_device(state, request)?;
    let body = read_request_body(request, state.max_body_bytes)?;
    let patch: ProfilePatch = serde_json::from_str(&body).map_err(ApiError::from_json)?;
    state.accounts.update_profile(&caller, target, &patch)?;
    Ok((200, json!({ "status": "updated" })))
}

/// GET /api/activity/{id}
fn handle_activity(state: &ApiState, device_id: &str) -> Result<Reply, ApiError> {
    let activity = state.accounts.activity(device_id, Utc::now())?;
    Ok((200, json!({ "activity": activity })))
}

/// GET /api/leaderboard
fn handle_leaderboard(state: &ApiState) -> Result<Reply, ApiError> {
    let rows = state.accounts.leaderboard()?;
    Ok((200, json!({ "leaderboard": rows })))
}

/// DELETE /api/me
fn handle_delete_me(state: &ApiState, request: &mut Request) -> Result<Reply, ApiError> {
    let device_id = require_device(state, request)?;
    state.accounts.delete(&device_id)?;
    state.processor.forget_device(&device_id);
    Ok((
        200,
        json!({
            "status": "deleted",
            "message": "All your data has been permanently deleted.",
        }),
    ))
}
