//! Routing between local and remote execution

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::identity::SystemIdentity;
use crate::local::LocalExecutor;
use crate::locate::{find_binary, find_remote_binary};
use crate::options::ExecOptions;
use crate::result::ExecResult;
use crate::ssh::{SshConfig, SshExecutor};
use crate::traits::{CommandRunner, LocalIdentity};

/// Host name that always means this machine
pub const LOCALHOST: &str = "localhost";

/// Where a binary was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryLocation {
    /// Executable at this path on this machine
    Local(PathBuf),
    /// Present and executable on the remote host
    Remote,
    /// Not found
    Missing,
}

impl BinaryLocation {
    /// Whether the binary was found
    #[must_use]
    pub fn found(&self) -> bool {
        !matches!(self, BinaryLocation::Missing)
    }
}

/// Runs commands locally or over SSH depending on the target host
pub struct Dispatcher<R = LocalExecutor> {
    local: LocalExecutor,
    ssh: SshExecutor<R>,
    identity: Arc<dyn LocalIdentity>,
}

impl Dispatcher<LocalExecutor> {
    /// Dispatcher using the system identity and the local executor for SSH
    #[must_use]
    pub fn new(ssh: SshConfig) -> Self {
        Self::with_parts(
            LocalExecutor::new(),
            SshExecutor::new(ssh),
            Arc::new(SystemIdentity::new()),
        )
    }
}

impl<R: CommandRunner> Dispatcher<R> {
    /// Dispatcher from explicit parts
    pub fn with_parts(
        local: LocalExecutor,
        ssh: SshExecutor<R>,
        identity: Arc<dyn LocalIdentity>,
    ) -> Self {
        Self {
            local,
            ssh,
            identity,
        }
    }

    /// SSH executor used for remote hosts
    pub fn ssh(&self) -> &SshExecutor<R> {
        &self.ssh
    }

    /// Whether `host` names this machine
    ///
    /// Identity is looked up on every call.
    pub async fn is_local(&self, host: &str) -> bool {
        if host == LOCALHOST {
            return true;
        }

        let hostname = self.identity.hostname().await;
        let fqdn = self.identity.fqdn().await;
        host == hostname || host == fqdn
    }

    /// Run `command` on `host`
    #[instrument(skip(self, opts))]
    pub async fn run(&self, host: &str, command: &str, opts: &ExecOptions) -> ExecResult {
        if self.is_local(host).await {
            debug!(host = %host, "host is local, running in place");
            self.local.execute(command, opts).await
        } else {
            debug!(host = %host, "host is remote, running over ssh");
            self.ssh.execute_remote(host, command, opts).await
        }
    }

    /// Look for binary `name` on `host`
    #[instrument(skip(self))]
    pub async fn which(&self, host: &str, name: &str) -> BinaryLocation {
        if self.is_local(host).await {
            return find_binary(name).map_or(BinaryLocation::Missing, BinaryLocation::Local);
        }

        if find_remote_binary(&self.ssh, host, name).await {
            BinaryLocation::Remote
        } else {
            BinaryLocation::Missing
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::command::CommandSpec;
    use crate::result::ExecStatus;

    struct FixedIdentity;

    #[async_trait]
    impl LocalIdentity for FixedIdentity {
        async fn hostname(&self) -> String {
            "build01".to_string()
        }

        async fn fqdn(&self) -> String {
            "build01.example.net".to_string()
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandRunner for CountingRunner {
        async fn run(&self, _spec: &CommandSpec, _opts: &ExecOptions) -> ExecResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ExecResult::new(ExecStatus::Exited(0), Duration::ZERO)
        }

        fn executor_type(&self) -> &'static str {
            "counting"
        }
    }

    fn dispatcher() -> Dispatcher<CountingRunner> {
        Dispatcher::with_parts(
            LocalExecutor::new(),
            SshExecutor::with_runner(CountingRunner::default(), SshConfig::default()),
            Arc::new(FixedIdentity),
        )
    }

    fn remote_calls(dispatcher: &Dispatcher<CountingRunner>) -> usize {
        dispatcher.ssh().inner().calls.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_localhost_matches_direct_execution() {
        let dispatcher = dispatcher();
        let opts = ExecOptions::new().with_capture();

        let routed = dispatcher.run("localhost", "echo hello", &opts).await;
        let direct = LocalExecutor::new().execute("echo hello", &opts).await;

        assert_eq!(routed.status, direct.status);
        assert_eq!(routed.captured, direct.captured);
        assert_eq!(routed.host, None);
        assert_eq!(remote_calls(&dispatcher), 0);
    }

    #[tokio::test]
    async fn test_own_names_are_local() {
        let dispatcher = dispatcher();

        assert!(dispatcher.is_local("build01").await);
        assert!(dispatcher.is_local("build01.example.net").await);
        assert!(!dispatcher.is_local("build01.example").await);
        assert!(!dispatcher.is_local("LOCALHOST").await);
    }

    #[tokio::test]
    async fn test_other_hosts_go_over_ssh() {
        let dispatcher = dispatcher();

        let result = dispatcher
            .run("web1", "uptime", &ExecOptions::default())
            .await;

        assert!(result.ok());
        assert_eq!(result.host.as_deref(), Some("web1"));
        assert_eq!(remote_calls(&dispatcher), 1);
    }

    #[tokio::test]
    async fn test_which_local() {
        let dispatcher = dispatcher();

        assert!(matches!(
            dispatcher.which("localhost", "sh").await,
            BinaryLocation::Local(_)
        ));
        assert_eq!(
            dispatcher.which("localhost", "fleetrun-no-such-binary").await,
            BinaryLocation::Missing
        );
    }

    #[tokio::test]
    async fn test_which_remote_absolute() {
        let dispatcher = dispatcher();

        assert_eq!(
            dispatcher.which("web1", "/usr/bin/rsync").await,
            BinaryLocation::Remote
        );
        assert_eq!(remote_calls(&dispatcher), 1);
    }
}
