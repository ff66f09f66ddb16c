//! Clear command implementation

use anyhow::Result;
use std::sync::Arc;

use crate::cli::{ClearArgs, GlobalArgs};
use crate::commands::common::pipeline_failure;
use crate::context::RuntimeContext;
use crate::logger::ConsoleLogger;

/// Execute the clear command
pub(crate) async fn execute(
    args: &ClearArgs,
    global: &GlobalArgs,
    logger: Arc<ConsoleLogger>,
) -> Result<()> {
    let ctx = RuntimeContext::for_command("clear", global, logger)?;

    let existed = ctx
        .engine
        .clear(&args.id)
        .await
        .map_err(|e| pipeline_failure("clear", e))?;

    if existed {
        println!("Cleared status of {}", args.id);
    }
    Ok(())
}
