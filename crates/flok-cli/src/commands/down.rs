//! Down command implementation

use anyhow::Result;
use std::sync::Arc;

use crate::cli::GlobalArgs;
use crate::commands::common::pipeline_failure;
use crate::context::RuntimeContext;
use crate::logger::ConsoleLogger;

/// Execute the down command
pub(crate) async fn execute(global: &GlobalArgs, logger: Arc<ConsoleLogger>) -> Result<()> {
    let ctx = RuntimeContext::for_command("down", global, logger)?;

    let report = ctx
        .engine
        .down()
        .await
        .map_err(|e| pipeline_failure("down", e))?;

    match report.executed.first() {
        Some(id) => println!("Reverted {}", id),
        None => println!("Nothing to revert"),
    }
    Ok(())
}
