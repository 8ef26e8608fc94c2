//! Command-line interface definitions for the `snapdump` binary.
//!
//! This module centralises the clap parser structure so both the main binary
//! and the build script can reuse it when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `snapdump` binary.
#[derive(Debug, Parser)]
#[command(
    name = "snapdump",
    about = "Dump the latest snapshot of an RDS instance through a disposable copy"
)]
pub(crate) struct Cli {
    /// Name of the production instance whose snapshots are enumerated. The
    /// instance itself is never touched; its most recent available snapshot
    /// is restored into a disposable instance instead.
    #[arg(value_name = "DB_INSTANCE_NAME")]
    pub(crate) source_instance: String,
    /// Databases to dump. When omitted, the configured database list is
    /// used, falling back to the restored instance's default database.
    #[arg(value_name = "DB_NAME")]
    pub(crate) databases: Vec<String>,
}
