//! Hooks that prepare a migration's context before its operation runs.

use async_trait::async_trait;

use crate::migration::{BoxError, MigrationContext};

/// Runs before every migration operation, in registration order.
///
/// Middleware typically attaches a resource to the context through its
/// extensions. A failing middleware aborts the run; the failure is recorded
/// in the migration's status like an operation error.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name recorded alongside failures
    fn name(&self) -> &str;

    async fn before(&self, ctx: &mut MigrationContext) -> Result<(), BoxError>;
}
