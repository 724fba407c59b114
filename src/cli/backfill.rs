//! Backfill command implementation

use anyhow::{Context, Result};
use std::path::Path;

use questhook::backfill::run_backfill;
use questhook::config::Config;
use questhook::domain::DeviceId;
use questhook::store::SqliteStore;

/// Recount a device's counters from its raw events and print the changes
pub fn backfill_command(config_path: Option<&Path>, device: &str, dry_run: bool) -> Result<()> {
    let config = Config::load(config_path)?;
    let device_id = DeviceId::parse(device).context("Invalid device id")?;

    let db_path = config.database_path();
    let store = SqliteStore::open(&db_path, config.storage.busy_timeout())
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    let report = run_backfill(
        &store,
        &device_id,
        config.rewards.max_session_minutes,
        dry_run,
    )?;

    println!(
        "Device {} ({}): {} events scanned, {} skipped\n",
        report.device.character_name,
        device_id.short(),
        report.events_scanned,
        report.events_skipped
    );

    let changes = report.before.diff(&report.after);
    if changes.is_empty() {
        println!("No changes.");
        return Ok(());
    }

    println!("  {:<24} {:>12} {:>12}", "field", "before", "after");
    for (field, before, after) in &changes {
        println!("  {:<24} {:>12} {:>12}", field, before, after);
    }
    println!();

    if report.applied {
        println!("Applied {} changes.", changes.len());
    } else if dry_run {
        println!("Dry run: nothing written.");
    } else {
        println!("No raw events archived: nothing written.");
    }

    Ok(())
}
