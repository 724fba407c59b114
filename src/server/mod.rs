//! HTTP API for hook clients and the dashboard
//!
//! Listens on `server.host:server.port` (default 127.0.0.1:8787) and serves:
//! - GET /health
//! - POST /api/devices - register a device
//! - POST /api/events - ingest one hook event (bearer auth)
//! - GET|PATCH /api/profile/{device_id}
//! - GET /api/activity/{device_id}
//! - GET /api/leaderboard
//! - DELETE /api/me (bearer auth)
//!
//! A fixed pool of worker threads pulls requests off one shared listener.

mod handlers;
pub mod rate_limit;
pub mod types;

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, error, info};

use crate::accounts::Accounts;
use crate::config::Config;
use crate::rewards::EventProcessor;
use crate::store::RewardStore;
use rate_limit::RateLimiter;
use types::ApiError;

/// Shared state for all request workers
pub struct ApiState {
    pub store: Arc<dyn RewardStore>,
    pub processor: EventProcessor,
    pub accounts: Accounts,
    pub limiter: RateLimiter,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
}

impl ApiState {
    pub fn new(store: Arc<dyn RewardStore>, config: &Config) -> Self {
        Self {
            processor: EventProcessor::new(store.clone(), config.rewards.clone()),
            accounts: Accounts::new(store.clone(), config.rewards.clone()),
            limiter: RateLimiter::new(
                config.rate_limit.register_per_minute,
                config.rate_limit.events_per_minute,
            ),
            cors_origins: config.server.cors_origins.clone(),
            max_body_bytes: config.server.max_body_bytes,
            store,
        }
    }

    fn allowed_origin(&self, request: &Request) -> Option<String> {
        let origin = header_value(request, "Origin")?;
        self.cors_origins
            .iter()
            .any(|o| o == "*" || *o == origin)
            .then_some(origin)
    }
}

/// A running server. Dropping it does not stop the workers; call
/// [`RunningServer::shutdown`].
pub struct RunningServer {
    addr: SocketAddr,
    server: Arc<Server>,
    workers: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until every worker exits
    pub fn join(self) {
        for worker in self.workers {
            let _ = worker.join();
        }
    }

    /// Wake all workers and wait for them to finish
    pub fn shutdown(self) {
        for _ in &self.workers {
            self.server.unblock();
        }
        self.join();
    }
}

/// Bind the listener and start the worker pool.
pub fn start_http_server(bind_addr: &str, workers: usize, state: Arc<ApiState>) -> Result<RunningServer> {
    let server = Server::http(bind_addr)
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("Failed to start server on {bind_addr}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .ok_or_else(|| anyhow!("Server is not bound to an IP address"))?;
    let server = Arc::new(server);

    info!("[questhook:http] Server listening on http://{} ({} workers)", addr, workers);

    let workers = (0..workers.max(1))
        .map(|i| {
            let server = Arc::clone(&server);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("questhook-http-{i}"))
                .spawn(move || worker_loop(&server, &state))
                .context("Failed to spawn HTTP worker")
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RunningServer {
        addr,
        server,
        workers,
    })
}

fn worker_loop(server: &Server, state: &ApiState) {
    loop {
        match server.recv() {
            Ok(request) => handle_request(state, request),
            Err(e) => {
                debug!("[questhook:http] Worker stopping: {}", e);
                break;
            }
        }
    }
}

fn handle_request(state: &ApiState, mut request: Request) {
    let method = request.method().to_string();
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or(url.as_str()).to_string();
    let origin = state.allowed_origin(&request);

    if method == "OPTIONS" {
        let response = Response::empty(204)
            .with_header(header("Access-Control-Allow-Methods", "GET, POST, PATCH, DELETE"))
            .with_header(header("Access-Control-Allow-Headers", "Authorization, Content-Type"));
        let _ = request.respond(with_cors(response, origin.as_deref()));
        return;
    }

    let mut retry_after = None;
    let (status, body) = match handlers::route(state, &method, &path, &mut request) {
        Ok(reply) => reply,
        Err(err) => {
            if let ApiError::RateLimited { retry_after: secs } = &err {
                retry_after = Some(*secs);
            }
            if let ApiError::Internal(source) = &err {
                error!("[questhook:http] {} {} failed: {}", method, path, source);
            } else {
                debug!("[questhook:http] {} {} -> {}: {}", method, path, err.status(), err);
            }
            (
                err.status(),
                serde_json::json!({ "error": err.code(), "detail": err.to_string() }),
            )
        }
    };
    respond_json(request, status, &body, origin.as_deref(), retry_after);
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap()
}

fn json_content_type() -> Header {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap()
}

fn with_cors<R: Read>(mut response: Response<R>, origin: Option<&str>) -> Response<R> {
    if let Some(origin) = origin {
        if let Ok(allow) = Header::from_bytes(&b"Access-Control-Allow-Origin"[..], origin.as_bytes()) {
            response.add_header(allow);
            response.add_header(header("Vary", "Origin"));
        }
    }
    response
}

pub(crate) fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str().to_string())
}

fn read_request_body(request: &mut Request, limit: usize) -> Result<String, ApiError> {
    let mut body = String::new();
    let mut reader = request.as_reader().take((limit + 1) as u64);
    if let Err(e) = reader.read_to_string(&mut body) {
        return Err(ApiError::BadRequest(format!("failed to read body: {e}")));
    }
    if body.len() > limit {
        return Err(ApiError::PayloadTooLarge);
    }
    Ok(body)
}

fn respond_json(
    request: Request,
    status_code: u16,
    value: &serde_json::Value,
    origin: Option<&str>,
    retry_after: Option<u64>,
) {
    let body =
        serde_json::to_string(value).unwrap_or_else(|_| "{\"error\":\"serialize\"}".to_string());
    let mut response = Response::from_string(body)
        .with_status_code(status_code)
        .with_header(json_content_type());
    if let Some(secs) = retry_after {
        response.add_header(header("Retry-After", &secs.to_string()));
    }
    let _ = request.respond(with_cors(response, origin));
}
