//! Local command execution using `tokio::process`

use std::fs::{File, OpenOptions};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tempfile::NamedTempFile;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::command::CommandSpec;
use crate::options::ExecOptions;
use crate::policy::OutputPolicy;
use crate::result::{ExecResult, ExecStatus};
use crate::traits::CommandRunner;
use crate::transcript;

/// Local command executor
///
/// Runs one process per call, with its stdio set up by [`OutputPolicy`] and
/// an optional watchdog. Every child leads its own process group so a
/// timeout can take down everything it started.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor {
    /// Where temp capture files are created (system default when `None`)
    temp_dir: Option<PathBuf>,
}

/// Stdio for one spawn, plus the temp file backing a capture
struct Outputs {
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
    temp: Option<NamedTempFile>,
}

impl LocalExecutor {
    /// Create a new local executor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create temp capture files in `dir`
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Run a shell command string
    #[instrument(skip(self, opts), level = "debug")]
    pub async fn execute(&self, command: &str, opts: &ExecOptions) -> ExecResult {
        self.execute_spec(&CommandSpec::shell(command), opts).await
    }

    async fn execute_spec(&self, spec: &CommandSpec, opts: &ExecOptions) -> ExecResult {
        let policy = OutputPolicy::decide(opts);
        let command = spec.display();

        if opts.dry_run {
            info!(command = %command, "dry run, not executing");
            return ExecResult::dry_run().with_return_rv(opts.return_rv);
        }

        if let OutputPolicy::LogFile(path) = &policy {
            write_transcript(path, &format!("start: {command}")).await;
        }

        debug!(command = %command, policy = ?policy, timeout = ?opts.timeout, "executing local command");

        let start = Instant::now();
        let result = self.spawn_and_wait(spec, opts, &policy).await;
        let duration = start.elapsed();

        let result = match result {
            Ok((status, captured)) => {
                let mut result = ExecResult::new(status, duration);
                result.captured = captured;
                result
            }
            Err(reason) => ExecResult::new(ExecStatus::SpawnFailed(reason), duration),
        }
        .with_return_rv(opts.return_rv);

        if let OutputPolicy::LogFile(path) = &policy {
            write_transcript(
                path,
                &format!(
                    "finish: {command} (exit {}, {:.3}s)",
                    result.exit_code(),
                    duration.as_secs_f64()
                ),
            )
            .await;
        }

        match &result.status {
            ExecStatus::TimedOut(limit) => warn!(
                command = %command,
                timeout = ?limit,
                "command timed out, process group killed"
            ),
            ExecStatus::SpawnFailed(reason) => warn!(
                command = %command,
                reason = %reason,
                "failed to start command"
            ),
            _ if result.ok() => debug!(
                command = %command,
                status = result.exit_code(),
                duration = ?duration,
                "command completed"
            ),
            _ => warn!(
                command = %command,
                status = ?result.status,
                duration = ?duration,
                "command failed"
            ),
        }

        result
    }

    /// Spawn the child and wait for it, racing the watchdog when one is set
    ///
    /// `Err` carries the reason the process could not be started.
    async fn spawn_and_wait(
        &self,
        spec: &CommandSpec,
        opts: &ExecOptions,
        policy: &OutputPolicy,
    ) -> Result<(ExecStatus, Option<String>), String> {
        let outputs = self
            .open_outputs(policy)
            .map_err(|e| format!("cannot open output for {policy:?}: {e}"))?;

        // A child that shares the caller's terminal has to stay in the
        // foreground group, or its first read stops it with SIGTTIN
        let own_group = !policy.inherits_stdin();

        let mut cmd = spec.prepare();
        cmd.stdin(outputs.stdin)
            .stdout(outputs.stdout)
            .stderr(outputs.stderr)
            .kill_on_drop(true);
        if own_group {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| e.to_string())?;
        let mut group = if own_group {
            GroupGuard::for_child(&child)
        } else {
            GroupGuard::default()
        };

        let waited = if opts.has_timeout() {
            match timeout(opts.timeout, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    group.kill();
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "failed to kill timed out child");
                    }
                    return Ok((ExecStatus::TimedOut(opts.timeout), None));
                }
            }
        } else {
            child.wait().await
        };

        let status = waited.map_err(|e| format!("failed to wait for process: {e}"))?;
        group.disarm();

        let captured = match &outputs.temp {
            Some(temp) => Some(read_capture(temp.path()).await),
            None => None,
        };

        Ok((exit_status(status), captured))
    }

    fn open_outputs(&self, policy: &OutputPolicy) -> std::io::Result<Outputs> {
        let stdin = if policy.inherits_stdin() {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let (file, temp) = match policy {
            OutputPolicy::Inherit => {
                return Ok(Outputs {
                    stdin,
                    stdout: Stdio::inherit(),
                    stderr: Stdio::inherit(),
                    temp: None,
                });
            }
            OutputPolicy::Discard => {
                return Ok(Outputs {
                    stdin,
                    stdout: Stdio::null(),
                    stderr: Stdio::null(),
                    temp: None,
                });
            }
            OutputPolicy::LogFile(path) => (open_file(path, true)?, None),
            OutputPolicy::CaptureFile { path, append } => (open_file(path, *append)?, None),
            OutputPolicy::CaptureTemp => {
                let temp = match &self.temp_dir {
                    Some(dir) => NamedTempFile::new_in(dir)?,
                    None => NamedTempFile::new()?,
                };
                (temp.as_file().try_clone()?, Some(temp))
            }
        };

        Ok(Outputs {
            stdin,
            stdout: Stdio::from(file.try_clone()?),
            stderr: Stdio::from(file),
            temp,
        })
    }
}

#[async_trait]
impl CommandRunner for LocalExecutor {
    async fn run(&self, spec: &CommandSpec, opts: &ExecOptions) -> ExecResult {
        self.execute_spec(spec, opts).await
    }

    fn executor_type(&self) -> &'static str {
        "local"
    }
}

fn open_file(path: &Path, append: bool) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options.open(path)
}

fn exit_status(status: ExitStatus) -> ExecStatus {
    match status.code() {
        Some(code) => ExecStatus::Exited(code),
        None => ExecStatus::Signaled(status.signal().unwrap_or_default()),
    }
}

async fn read_capture(path: &Path) -> String {
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read captured output");
            String::new()
        }
    }
}

async fn write_transcript(path: &Path, message: &str) {
    if let Err(e) = transcript::append(path, &transcript::line(message)).await {
        warn!(path = %path.display(), error = %e, "failed to write transcript");
    }
}

/// Process group of a running child, killed if the wait is abandoned
///
/// Dropping the call future (a timeout upstream, Ctrl-C in the CLI) drops
/// this guard, so nothing the command started outlives the call.
#[derive(Debug, Default)]
struct GroupGuard {
    pgid: Option<Pid>,
}

impl GroupGuard {
    /// The child leads its own group, so its pid is the group id
    fn for_child(child: &Child) -> Self {
        Self {
            pgid: child
                .id()
                .and_then(|pid| i32::try_from(pid).ok())
                .map(Pid::from_raw),
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take()
            && let Err(e) = killpg(pgid, Signal::SIGKILL)
        {
            debug!(pgid = pgid.as_raw(), error = %e, "killpg failed");
        }
    }

    /// The child exited on its own; leave the group alone
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::result::{ReturnValue, TIMEOUT_EXIT_CODE};

    #[tokio::test]
    async fn test_run_success() {
        let executor = LocalExecutor::new();
        let result = executor.execute("true", &ExecOptions::default()).await;

        assert!(result.ok());
        assert_eq!(result.exit_code(), 0);
        assert!(result.captured().is_none());
    }

    #[tokio::test]
    async fn test_run_failure() {
        let executor = LocalExecutor::new();
        let result = executor.execute("exit 42", &ExecOptions::default()).await;

        assert!(!result.ok());
        assert_eq!(result.exit_code(), 42);
    }

    #[tokio::test]
    async fn test_return_rv_encoding() {
        let executor = LocalExecutor::new();
        let opts = ExecOptions::new().with_return_rv();

        let ok = executor.execute("exit 0", &opts).await;
        let failed = executor.execute("exit 1", &opts).await;

        assert_eq!(ok.value(), ReturnValue::ExitCode(0));
        assert_eq!(failed.value(), ReturnValue::ExitCode(1));
    }

    #[tokio::test]
    async fn test_capture_to_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new().with_temp_dir(dir.path());

        let result = executor
            .execute("echo hello", &ExecOptions::new().with_capture())
            .await;

        assert!(result.ok());
        assert_eq!(result.captured(), Some("hello\n"));
        assert_eq!(result.value(), ReturnValue::Captured("hello\n".to_string()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_capture_includes_stderr() {
        let executor = LocalExecutor::new();
        let result = executor
            .execute("echo out; echo err >&2", &ExecOptions::new().with_capture())
            .await;

        assert_eq!(result.captured(), Some("out\nerr\n"));
    }

    #[tokio::test]
    async fn test_failed_capture_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new().with_temp_dir(dir.path());

        let result = executor
            .execute("echo partial; exit 3", &ExecOptions::new().with_capture())
            .await;

        assert!(!result.ok());
        assert_eq!(result.value(), ReturnValue::Failed);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_capture_to_out_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let executor = LocalExecutor::new();

        executor
            .execute("echo one", &ExecOptions::new().with_out_file(&out, false))
            .await;
        let result = executor
            .execute("echo two", &ExecOptions::new().with_out_file(&out, true))
            .await;

        assert!(result.ok());
        assert!(result.captured().is_none());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "one\ntwo\n");

        executor
            .execute("echo three", &ExecOptions::new().with_out_file(&out, false))
            .await;
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "three\n");
    }

    #[tokio::test]
    async fn test_log_file_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        let executor = LocalExecutor::new();

        let result = executor
            .execute(
                "echo out; echo err >&2",
                &ExecOptions::new().with_log_file(&log).with_capture(),
            )
            .await;

        assert!(result.ok());
        assert!(result.captured().is_none());

        let content = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("start: /bin/sh -c"));
        assert_eq!(lines[1], "out");
        assert_eq!(lines[2], "err");
        assert!(lines[3].contains("(exit 0,"));
    }

    #[tokio::test]
    async fn test_dry_run_does_not_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let executor = LocalExecutor::new();

        let result = executor
            .execute(
                &format!("touch {}; exit 7", marker.display()),
                &ExecOptions::new().with_dry_run(),
            )
            .await;

        assert!(result.ok());
        assert_eq!(result.status, ExecStatus::DryRun);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let executor = LocalExecutor::new();
        let start = Instant::now();
        let result = executor
            .execute(
                "sleep 5",
                &ExecOptions::new().with_timeout(Duration::from_millis(200)),
            )
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(result.timed_out());
        assert!(!result.ok());
        assert_eq!(result.exit_code(), TIMEOUT_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_timeout_not_hit() {
        let executor = LocalExecutor::new();
        let result = executor
            .execute(
                "exit 4",
                &ExecOptions::new().with_timeout(Duration::from_secs(5)),
            )
            .await;

        assert_eq!(result.status, ExecStatus::Exited(4));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let executor = LocalExecutor::new();
        let result = executor
            .run(
                &CommandSpec::new("/nonexistent/fleetrun-binary"),
                &ExecOptions::default(),
            )
            .await;

        assert!(matches!(result.status, ExecStatus::SpawnFailed(_)));
        assert_eq!(result.exit_code(), -1);
        assert!(result.check().is_err());
    }

    #[tokio::test]
    async fn test_unopenable_out_file_is_spawn_failure() {
        let executor = LocalExecutor::new();
        let result = executor
            .execute(
                "echo hi",
                &ExecOptions::new().with_out_file("/nonexistent/dir/out.txt", false),
            )
            .await;

        assert!(matches!(result.status, ExecStatus::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_signaled_process() {
        let executor = LocalExecutor::new();
        let result = executor
            .execute("kill -9 $$", &ExecOptions::default())
            .await;

        assert_eq!(result.status, ExecStatus::Signaled(9));
        assert!(!result.ok());
    }

    /// Process group of the `sh` running the command, as the command sees it
    #[cfg(target_os = "linux")]
    const SHELL_PGRP: &str = "$(cut -d' ' -f5 /proc/$$/stat)";

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_verbose_child_stays_in_caller_group() {
        let ours = nix::unistd::getpgrp().as_raw();
        let command = format!("test \"{SHELL_PGRP}\" = {ours}");

        let result = LocalExecutor::new()
            .execute(&command, &ExecOptions::new().with_verbose())
            .await;

        assert!(result.ok());
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_quiet_child_leads_own_group() {
        let command = format!("test \"{SHELL_PGRP}\" = $$");

        let result = LocalExecutor::new()
            .execute(&command, &ExecOptions::default())
            .await;

        assert!(result.ok());
    }
}
