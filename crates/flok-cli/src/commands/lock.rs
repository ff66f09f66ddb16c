//! Lock command implementation

use anyhow::Result;
use flok_core::LockRecord;
use std::sync::Arc;

use crate::cli::{GlobalArgs, LockArgs};
use crate::commands::common::pipeline_failure;
use crate::context::RuntimeContext;
use crate::logger::ConsoleLogger;

/// Execute the lock command
pub(crate) async fn execute(
    args: &LockArgs,
    global: &GlobalArgs,
    logger: Arc<ConsoleLogger>,
) -> Result<()> {
    let ctx = RuntimeContext::for_command("lock", global, logger)?;

    let current = ctx
        .engine
        .lock_status()
        .await
        .map_err(|e| pipeline_failure("lock", e))?;
    let Some(record) = current else {
        println!("Not locked");
        return Ok(());
    };

    if !args.clear {
        println!("{}", describe(&record));
        return Ok(());
    }

    let removed = ctx
        .engine
        .force_unlock()
        .await
        .map_err(|e| pipeline_failure("lock", e))?;
    let holder = removed.as_ref().unwrap_or(&record).holder();
    println!("Removed lock held by {}", holder);
    Ok(())
}

/// One-line description of a lock holder
pub(crate) fn describe(record: &LockRecord) -> String {
    let mut line = format!(
        "Locked by {}@{} (pid {}) since {} ({}s ago)",
        record.username,
        record.hostname,
        record.pid,
        record.date.to_rfc3339(),
        record.age().as_secs()
    );
    if !record.network.is_empty() {
        line.push_str(&format!(" [{}]", record.network.join(", ")));
    }
    line
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
