//! Executor seams

use async_trait::async_trait;

use crate::command::CommandSpec;
use crate::options::ExecOptions;
use crate::result::ExecResult;

/// Something that can run one process to completion
///
/// Implemented by [`LocalExecutor`](crate::local::LocalExecutor); the SSH
/// executor wraps any implementation, which lets tests observe exactly what
/// would have been spawned.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` under `opts` and report how it ended
    async fn run(&self, spec: &CommandSpec, opts: &ExecOptions) -> ExecResult;

    /// Short name for logs
    fn executor_type(&self) -> &'static str;
}

/// Resolves the names this machine answers to
#[async_trait]
pub trait LocalIdentity: Send + Sync {
    /// Short hostname
    async fn hostname(&self) -> String;

    /// Fully-qualified hostname
    async fn fqdn(&self) -> String;
}
