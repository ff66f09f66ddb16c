//! Migrations defined by YAML files.
//!
//! ```yaml
//! id: 20240101_create_users
//! title: Create users table
//! time: 2024-01-01T00:00:00Z
//! dependencies: [20231201_init]
//! up: ./scripts/create_users.sh
//! down:
//!   sql: DROP TABLE users
//! ```
//!
//! `up` and `down` take either a shell command or `{shell: ...}` /
//! `{sql: ...}`. SQL operations run through the [`SqlConnection`] a database
//! middleware attached to the context. The signature covers the definition
//! file only.

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::logger::emit;
use crate::migration::{BoxError, MigrationContext, MigrationUnit, SourceRef};
use crate::status::StatusError;

/// Lines of stderr kept in a failed command's status record
const STDERR_TAIL_LINES: usize = 20;

/// Executes SQL on behalf of `sql:` operations
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run one or more statements
    async fn execute_batch(&self, sql: &str) -> Result<(), BoxError>;
}

/// Context extension holding the SQL executor for the current run
#[derive(Clone)]
pub struct SqlConnection(pub Arc<dyn SqlExecutor>);

/// Context extension with extra environment variables for shell operations
#[derive(Debug, Clone, Default)]
pub struct ScriptEnv(pub BTreeMap<String, String>);

impl ScriptEnv {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

/// Raw YAML shape of a definition file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptDefinition {
    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    title: Option<String>,

    time: TimeDef,

    #[serde(default)]
    dependencies: Vec<String>,

    #[serde(default)]
    up: Option<OperationDef>,

    #[serde(default)]
    down: Option<OperationDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeDef {
    Millis(i64),
    Timestamp(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OperationDef {
    Command(String),
    Detailed(OperationSpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OperationSpec {
    #[serde(default)]
    shell: Option<String>,

    #[serde(default)]
    sql: Option<String>,

    /// Extra environment for `shell`
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// One executable step of a script migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Run through `sh -c` in the definition's directory
    Shell {
        command: String,
        env: BTreeMap<String, String>,
    },
    /// Run through the context's [`SqlConnection`]
    Sql(String),
}

impl OperationDef {
    fn into_operation(self, id: &str, which: &str) -> CoreResult<Operation> {
        match self {
            OperationDef::Command(command) => Ok(Operation::Shell {
                command,
                env: BTreeMap::new(),
            }),
            OperationDef::Detailed(detail) => match (detail.shell, detail.sql) {
                (Some(command), None) => Ok(Operation::Shell {
                    command,
                    env: detail.env,
                }),
                (None, Some(sql)) if detail.env.is_empty() => Ok(Operation::Sql(sql)),
                (None, Some(_)) => Err(CoreError::validation(
                    id,
                    format!("{which}: env applies only to shell operations"),
                )),
                _ => Err(CoreError::validation(
                    id,
                    format!("{which} needs exactly one of 'shell' or 'sql'"),
                )),
            },
        }
    }
}

/// Parse a `time` value: epoch milliseconds or an RFC 3339 timestamp
fn parse_time(id: &str, time: TimeDef) -> CoreResult<i64> {
    match time {
        TimeDef::Millis(ms) => Ok(ms),
        TimeDef::Timestamp(raw) => {
            if let Ok(ms) = raw.trim().parse::<i64>() {
                return Ok(ms);
            }
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|t| t.timestamp_millis())
                .map_err(|e| CoreError::validation(id, format!("invalid time '{raw}': {e}")))
        }
    }
}

/// A migration loaded from a YAML definition file
#[derive(Debug, Clone)]
pub struct ScriptMigration {
    id: String,
    title: String,
    time: i64,
    dependencies: Vec<String>,
    up: Option<Operation>,
    down: Option<Operation>,
    path: PathBuf,
}

impl ScriptMigration {
    /// Load a definition file. The id defaults to the file stem, the title to the id.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(path, &content)
    }

    /// Parse definition `content` that was read from `path`
    pub fn parse(path: &Path, content: &str) -> CoreResult<Self> {
        let def: ScriptDefinition = serde_yaml::from_str(content).map_err(|e| {
            CoreError::validation(path.display().to_string(), format!("invalid definition: {e}"))
        })?;

        let id = match def.id {
            Some(id) => id,
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
        };
        if id.trim().is_empty() {
            return Err(CoreError::validation(
                path.display().to_string(),
                "migration id must not be empty",
            ));
        }

        let time = parse_time(&id, def.time)?;
        let up = def.up.map(|op| op.into_operation(&id, "up")).transpose()?;
        let down = def
            .down
            .map(|op| op.into_operation(&id, "down"))
            .transpose()?;

        Ok(Self {
            title: def.title.unwrap_or_else(|| id.clone()),
            id,
            time,
            dependencies: def.dependencies,
            up,
            down,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn up_operation(&self) -> Option<&Operation> {
        self.up.as_ref()
    }

    pub fn down_operation(&self) -> Option<&Operation> {
        self.down.as_ref()
    }

    async fn execute(&self, op: Option<&Operation>, ctx: &MigrationContext) -> Result<(), BoxError> {
        let Some(op) = op else {
            return Err(format!("migration {} has no {} operation", self.id, ctx.method()).into());
        };
        match op {
            Operation::Shell { command, env } => self.run_shell(command, env, ctx).await,
            Operation::Sql(sql) => {
                let Some(SqlConnection(executor)) = ctx.extension::<SqlConnection>() else {
                    return Err(Box::new(StatusError::new(
                        "ExecutionError",
                        "sql operation needs a database connection; run with the duckdb backend",
                    )));
                };
                emit!(ctx.logger(), Debug, "[{}] executing sql", self.id);
                executor.execute_batch(sql).await
            }
        }
    }

    async fn run_shell(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
        ctx: &MigrationContext,
    ) -> Result<(), BoxError> {
        let mut cmd = shell_command(command);
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        cmd.env("FLOK_MIGRATION_ID", &self.id)
            .env("FLOK_MIGRATION_TITLE", &self.title)
            .env("FLOK_RUN_METHOD", ctx.method().to_string())
            .env("FLOK_ENGINE_VERSION", ctx.engine_version());
        if let Some(extra) = ctx.extension::<ScriptEnv>() {
            cmd.envs(&extra.0);
        }
        cmd.envs(env);

        emit!(ctx.logger(), Debug, "[{}] running `{}`", self.id, command);
        let output = cmd.output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            emit!(ctx.logger(), Info, "[{}] {}", self.id, line);
        }

        if output.status.success() {
            return Ok(());
        }

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        let mut message = format!("command `{command}` exited with code {exit_code}");
        if let Some(last) = lines.last() {
            message.push_str(": ");
            message.push_str(last);
        }

        Err(Box::new(
            StatusError::new("ExecutionError", message)
                .with_field("exitCode", exit_code)
                .with_field("stderr", tail),
        ))
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[async_trait]
impl MigrationUnit for ScriptMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn time(&self) -> i64 {
        self.time
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn source(&self) -> SourceRef {
        SourceRef::File(self.path.clone())
    }

    fn has_up(&self) -> bool {
        self.up.is_some()
    }

    fn has_down(&self) -> bool {
        self.down.is_some()
    }

    async fn up(&self, ctx: &mut MigrationContext) -> Result<(), BoxError> {
        self.execute(self.up.as_ref(), ctx).await
    }

    async fn down(&self, ctx: &mut MigrationContext) -> Result<(), BoxError> {
        self.execute(self.down.as_ref(), ctx).await
    }
}

#[cfg(test)]
#[path = "script_test.rs"]
mod tests;
