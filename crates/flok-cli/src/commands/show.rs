//! Show command implementation

use anyhow::Result;
use flok_core::{Migration, MigrationState};
use std::sync::Arc;

use crate::cli::{GlobalArgs, ShowArgs, ShowFilter};
use crate::commands::common::{pipeline_failure, print_table};
use crate::context::RuntimeContext;
use crate::logger::ConsoleLogger;

/// Execute the show command
pub(crate) async fn execute(
    args: &ShowArgs,
    global: &GlobalArgs,
    logger: Arc<ConsoleLogger>,
) -> Result<()> {
    let ctx = RuntimeContext::for_command("show", global, logger)?;

    let migrations = ctx
        .engine
        .load()
        .await
        .map_err(|e| pipeline_failure("show", e))?;
    let selected = select(&migrations, args.filter);

    if args.count {
        println!("{}", selected.len());
        return Ok(());
    }

    if selected.is_empty() {
        println!("No migrations found.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = selected.iter().map(|m| row(m)).collect();
    print_table(&["ID", "STATE", "LAST RUN", "RUN TIME", "TITLE"], &rows);
    Ok(())
}

/// Migrations matching `filter`, in `up` order
pub(crate) fn select(migrations: &[Migration], filter: ShowFilter) -> Vec<&Migration> {
    migrations
        .iter()
        .filter(|m| match filter {
            ShowFilter::All => true,
            ShowFilter::Pending => m.state() == MigrationState::Pending,
            ShowFilter::Blocked => m.state() == MigrationState::Blocked,
            ShowFilter::Done => m.state() == MigrationState::Done,
            ShowFilter::Changed => m.is_changed(),
        })
        .collect()
}

fn row(migration: &Migration) -> Vec<String> {
    let status = migration.status();
    vec![
        migration.id().to_string(),
        migration.state().to_string(),
        status
            .run_method
            .map(|m| m.to_string())
            .unwrap_or_else(|| "-".to_string()),
        status
            .run_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string()),
        migration.title().to_string(),
    ]
}

#[cfg(test)]
#[path = "show_test.rs"]
mod tests;
