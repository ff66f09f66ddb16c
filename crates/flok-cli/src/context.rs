//! Runtime context for CLI commands

use anyhow::{Context, Result};
use flok_core::{Backend, Config, DirectorySource, Engine, EngineLogger};
use flok_duckdb::{DuckDbBackend, DuckDbMiddleware};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::{BackendArg, GlobalArgs};
use crate::commands::common::pipeline_failure;
use crate::logger::ConsoleLogger;

/// Runtime context containing the resolved configuration and engine
pub(crate) struct RuntimeContext {
    /// Configuration after command-line overrides
    pub config: Config,

    /// Engine wired to the configured backend
    pub engine: Engine,
}

impl RuntimeContext {
    /// Create a new runtime context from global arguments
    pub fn new(args: &GlobalArgs, logger: Arc<ConsoleLogger>) -> Result<Self> {
        let config = resolve_config(args)?;
        log::debug!(
            "using {} backend with migrations in {}",
            config.backend,
            config.migrations_dir.display()
        );

        let builder = Engine::builder()
            .source(DirectorySource::new(&config.migrations_dir))
            .logger(logger.clone());

        let engine = match config.backend {
            Backend::File => builder
                .lock_file(config.lock_file())
                .status_dir(config.status_dir())
                .lock_lease(config.lock_lease()),
            Backend::Duckdb => {
                let path = config.database_path();
                let backend = DuckDbBackend::new(&path.display().to_string())
                    .with_context(|| format!("Failed to open database {}", path.display()))?
                    .with_lease(config.lock_lease())
                    .with_logger(EngineLogger::new(logger));
                let backend = Arc::new(backend);
                builder
                    .middleware(Arc::new(DuckDbMiddleware::new(&backend)))
                    .lock_provider(backend.clone())
                    .status_store(backend)
            }
        }
        .build()
        .context("Failed to build migration engine")?;

        Ok(Self { config, engine })
    }

    /// [`RuntimeContext::new`] for `command`, reporting setup failures like
    /// pipeline failures
    pub fn for_command(
        command: &str,
        args: &GlobalArgs,
        logger: Arc<ConsoleLogger>,
    ) -> Result<Self> {
        Self::new(args, logger).map_err(|e| pipeline_failure(command, format!("{e:#}")))
    }
}

/// Load flok.yml and apply command-line overrides
pub(crate) fn resolve_config(args: &GlobalArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(Path::new(path)).context("Failed to load configuration file")?,
        None => Config::discover(Path::new(".")).context("Failed to load configuration")?,
    };

    if let Some(dir) = &args.migrations {
        config.migrations_dir = PathBuf::from(dir);
    }
    if let Some(backend) = args.backend {
        config.backend = match backend {
            BackendArg::File => Backend::File,
            BackendArg::Duckdb => Backend::Duckdb,
        };
    }
    if let Some(database) = &args.database {
        config.database.path = Some(PathBuf::from(database));
    }
    Ok(config)
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
