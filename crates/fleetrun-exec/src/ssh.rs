//! Remote command execution through the system `ssh` client

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::command::CommandSpec;
use crate::error::QuoteError;
use crate::local::LocalExecutor;
use crate::options::ExecOptions;
use crate::quote::{shell_quote, split_words};
use crate::result::{ExecResult, ExecStatus};
use crate::traits::CommandRunner;

/// Agent variables removed from the client's environment unless forwarding is wanted
pub const AGENT_ENV_VARS: [&str; 2] = ["SSH_AUTH_SOCK", "SSH_AGENT_PID"];

/// Client flags that turn off host-key verification
pub const NO_HOST_KEY_CHECK_OPTS: [&str; 4] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
];

/// Executor-wide SSH client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Client binary
    #[serde(default = "default_program")]
    pub program: String,
    /// Extra client arguments added to every call, before per-call options
    #[serde(default)]
    pub options: Vec<String>,
    /// Verify host keys unless a call opts out
    #[serde(default = "default_strict_host_key_checking")]
    pub strict_host_key_checking: bool,
    /// Let calls that ask for it keep the caller's agent
    #[serde(default)]
    pub forward_agent: bool,
}

fn default_program() -> String {
    "ssh".to_string()
}

fn default_strict_host_key_checking() -> bool {
    true
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            options: Vec::new(),
            strict_host_key_checking: default_strict_host_key_checking(),
            forward_agent: false,
        }
    }
}

impl SshConfig {
    /// Use a different client binary
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Add an extra client argument
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Disable host-key verification for every call
    #[must_use]
    pub fn without_host_key_checking(mut self) -> Self {
        self.strict_host_key_checking = false;
        self
    }

    /// Allow agent forwarding
    #[must_use]
    pub fn with_agent_forwarding(mut self) -> Self {
        self.forward_agent = true;
        self
    }
}

/// SSH command executor
///
/// Wraps an inner [`CommandRunner`] (the local executor by default) and
/// hands it a fully assembled client invocation. Timeouts, capture and
/// transcripts are applied by the inner runner to the client process.
#[derive(Debug, Clone)]
pub struct SshExecutor<R = LocalExecutor> {
    inner: R,
    config: SshConfig,
}

impl SshExecutor<LocalExecutor> {
    /// Create an executor over the local executor
    #[must_use]
    pub fn new(config: SshConfig) -> Self {
        Self::with_runner(LocalExecutor::new(), config)
    }
}

impl Default for SshExecutor<LocalExecutor> {
    fn default() -> Self {
        Self::new(SshConfig::default())
    }
}

impl<R: CommandRunner> SshExecutor<R> {
    /// Create an executor over any runner
    pub fn with_runner(inner: R, config: SshConfig) -> Self {
        Self { inner, config }
    }

    /// Client settings
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Runner the client is spawned through
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Assemble the client invocation for `command` on `host`
    ///
    /// Order: batch mode, host-key bypass (when asked for or disabled on the
    /// executor), one verbosity flag, executor options, per-call options,
    /// host, remote command.
    ///
    /// # Errors
    /// Returns `QuoteError` if `opts.ssh_opts` has unbalanced quoting
    pub fn build_spec(
        &self,
        host: &str,
        command: &str,
        opts: &ExecOptions,
    ) -> Result<CommandSpec, QuoteError> {
        let mut spec = CommandSpec::new(&self.config.program).args(["-o", "BatchMode=yes"]);

        if opts.no_strict_host_key_checking || !self.config.strict_host_key_checking {
            spec = spec.args(NO_HOST_KEY_CHECK_OPTS);
        }

        spec = spec.arg(if opts.ssh_verbose { "-v" } else { "-q" });
        spec = spec.args(self.config.options.iter().cloned());

        if let Some(extra) = &opts.ssh_opts {
            spec = spec.args(split_words(extra)?);
        }

        let remote = if opts.nohup {
            nohup_wrap(command)
        } else {
            command.to_string()
        };
        spec = spec.arg(host).arg(remote);

        if !(opts.use_ssh_agent && self.config.forward_agent) {
            for var in AGENT_ENV_VARS {
                spec = spec.env_remove(var);
            }
        }

        Ok(spec)
    }

    /// Run `command` on `host`, retrying failed attempts as configured
    #[instrument(skip(self, opts), fields(retry = opts.retry))]
    pub async fn execute_remote(&self, host: &str, command: &str, opts: &ExecOptions) -> ExecResult {
        let spec = match self.build_spec(host, command, opts) {
            Ok(spec) => spec,
            Err(e) => {
                error!(host = %host, error = %e, "invalid ssh options");
                let mut result = ExecResult::new(
                    ExecStatus::SpawnFailed(format!("invalid ssh options: {e}")),
                    Duration::ZERO,
                )
                .with_return_rv(opts.return_rv);
                result.host = Some(host.to_string());
                return result;
            }
        };

        debug!(
            host = %host,
            runner = self.inner.executor_type(),
            invocation = %spec.display(),
            "executing remote command"
        );

        let first = self.attempt(&spec, host, opts, 1).await;
        if first.ok() {
            return first;
        }

        if opts.retry == 0 {
            warn!(
                host = %host,
                status = first.exit_code(),
                "remote command failed, no retry"
            );
            return first;
        }

        let mut last = first;
        for retry in 1..=opts.retry {
            info!(
                host = %host,
                retry,
                of = opts.retry,
                status = last.exit_code(),
                sleep = ?opts.sleep,
                "remote command failed, retrying"
            );
            tokio::time::sleep(opts.sleep).await;

            let result = self.attempt(&spec, host, opts, retry.saturating_add(1)).await;
            if result.ok() {
                info!(host = %host, retry, "remote command succeeded on retry");
                return result;
            }
            last = result;
        }

        error!(
            host = %host,
            attempts = last.attempts,
            status = last.exit_code(),
            "remote command failed after all retries"
        );
        last
    }

    async fn attempt(
        &self,
        spec: &CommandSpec,
        host: &str,
        opts: &ExecOptions,
        attempt: u32,
    ) -> ExecResult {
        let mut result = self.inner.run(spec, opts).await;
        result.attempts = attempt;
        result.host = Some(host.to_string());
        result
    }
}

/// Detach `command` from the session
///
/// The command runs under `nohup sh -c` with every standard stream pointed
/// away from the transport channel, in the background, so the client can
/// return while it keeps running. Redirections inside `command` still apply.
#[must_use]
pub fn nohup_wrap(command: &str) -> String {
    format!(
        "nohup sh -c {} > /dev/null 2>&1 < /dev/null &",
        shell_quote(command)
    )
}
