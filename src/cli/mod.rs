//! CLI command implementations

pub mod backfill;
pub mod init;
pub mod serve;
