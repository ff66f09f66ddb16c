//! Up command implementation

use anyhow::Result;
use std::sync::Arc;

use crate::cli::GlobalArgs;
use crate::commands::common::pipeline_failure;
use crate::context::RuntimeContext;
use crate::logger::ConsoleLogger;

/// Execute the up command
pub(crate) async fn execute(global: &GlobalArgs, logger: Arc<ConsoleLogger>) -> Result<()> {
    let ctx = RuntimeContext::for_command("up", global, logger)?;

    let report = ctx
        .engine
        .up()
        .await
        .map_err(|e| pipeline_failure("up", e))?;

    if report.executed.is_empty() {
        println!("Nothing to migrate ({} migrations up to date)", report.total);
    } else {
        println!(
            "Applied {} of {} migrations: {}",
            report.executed.len(),
            report.total,
            report.executed.join(", ")
        );
    }
    Ok(())
}
