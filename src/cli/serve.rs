//! Serve command implementation

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use questhook::config::Config;
use questhook::server::{start_http_server, ApiState};
use questhook::store::{RewardStore, SqliteStore};

/// Run the HTTP API until the process is killed
pub fn serve_command(config_path: Option<&Path>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let db_path = config.database_path();
    let store = SqliteStore::open(&db_path, config.storage.busy_timeout())
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    info!("[questhook:store] Using database {}", db_path.display());

    let store: Arc<dyn RewardStore> = Arc::new(store);
    let state = Arc::new(ApiState::new(store, &config));
    let server = start_http_server(&config.server.bind_addr(), config.server.workers, state)?;
    println!("Listening on http://{}", server.addr());

    server.join();
    Ok(())
}
