//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};

/// flok - ordered, locked, tamper-checked migrations
#[derive(Parser, Debug)]
#[command(name = "flok")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Migrations directory (overrides migrations_dir in flok.yml)
    #[arg(short, long, global = true, env = "FLOK_MIGRATIONS_DIR")]
    pub migrations: Option<String>,

    /// Config file path (default: ./flok.yml if present)
    #[arg(short, long, global = true, env = "FLOK_CONFIG")]
    pub config: Option<String>,

    /// Where locks and status records are kept
    #[arg(short, long, global = true, value_enum, env = "FLOK_BACKEND")]
    pub backend: Option<BackendArg>,

    /// Database path for the duckdb backend
    #[arg(short, long, global = true, env = "FLOK_DATABASE")]
    pub database: Option<String>,
}

/// Persistence backends
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// Lock file and JSON status files
    File,
    /// DuckDB tables
    Duckdb,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply all pending migrations
    Up,

    /// Revert the most recently applied migration
    Down,

    /// List migrations and their state
    Show(ShowArgs),

    /// Inspect or remove the run lock
    Lock(LockArgs),

    /// Forget the recorded status of a migration so it can run again
    Clear(ClearArgs),
}

/// Arguments for the show command
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Which migrations to list
    #[arg(value_enum, default_value = "all")]
    pub filter: ShowFilter,

    /// Print only the number of matching migrations
    #[arg(long)]
    pub count: bool,
}

/// Migration filters for show
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFilter {
    /// Every migration
    All,
    /// Not yet applied and not blocked
    Pending,
    /// Errored or changed
    Blocked,
    /// Applied and healthy
    Done,
    /// Source changed since the last run
    Changed,
}

/// Arguments for the lock command
#[derive(Args, Debug)]
pub struct LockArgs {
    /// Remove a stale lock
    #[arg(long)]
    pub clear: bool,
}

/// Arguments for the clear command
#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Migration id
    pub id: String,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
