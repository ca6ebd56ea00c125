//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Exit code reported for a call that hit its timeout
pub const TIMEOUT_EXIT_CODE: i32 = 1;

/// Exit code reported when the process never produced one
pub const NO_EXIT_CODE: i32 = -1;

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExecStatus {
    /// Process ran to completion with this code
    Exited(i32),
    /// Process was killed by this signal
    Signaled(i32),
    /// Watchdog fired after this long and the process group was killed
    TimedOut(Duration),
    /// Nothing was spawned
    DryRun,
    /// Process could not be started
    SpawnFailed(String),
}

/// Outcome of one execution
///
/// `ok()` is the success predicate and `exit_code()` the raw code. Captured
/// text is kept apart from the status so an empty successful capture is
/// still a success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// How the process ended
    pub status: ExecStatus,
    /// Output read back from the temp capture file
    pub captured: Option<String>,
    /// Wall-clock time of the final attempt
    pub duration: Duration,
    /// Number of attempts made (remote retries included)
    pub attempts: u32,
    /// Remote host, when this ran over the transport
    pub host: Option<String>,
    /// Encoding requested for [`ExecResult::value`]
    #[serde(default)]
    pub return_rv: bool,
}

impl ExecResult {
    /// Result of a single attempt
    #[must_use]
    pub fn new(status: ExecStatus, duration: Duration) -> Self {
        Self {
            status,
            captured: None,
            duration,
            attempts: 1,
            host: None,
            return_rv: false,
        }
    }

    /// Synthesized result of a dry run
    #[must_use]
    pub fn dry_run() -> Self {
        Self::new(ExecStatus::DryRun, Duration::ZERO)
    }

    /// Attach captured output
    #[must_use]
    pub fn with_captured(mut self, captured: String) -> Self {
        self.captured = Some(captured);
        self
    }

    /// Record the legacy encoding the caller asked for
    #[must_use]
    pub fn with_return_rv(mut self, return_rv: bool) -> Self {
        self.return_rv = return_rv;
        self
    }

    /// Check if command succeeded (exit code 0 or dry run)
    #[must_use]
    pub fn ok(&self) -> bool {
        matches!(self.status, ExecStatus::Exited(0) | ExecStatus::DryRun)
    }

    /// Raw exit code
    ///
    /// 0 on success, [`TIMEOUT_EXIT_CODE`] on timeout, [`NO_EXIT_CODE`] when
    /// the process was signaled or never started.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match &self.status {
            ExecStatus::Exited(code) => *code,
            ExecStatus::DryRun => 0,
            ExecStatus::TimedOut(_) => TIMEOUT_EXIT_CODE,
            ExecStatus::Signaled(_) | ExecStatus::SpawnFailed(_) => NO_EXIT_CODE,
        }
    }

    /// Captured output, if the call captured to a temp file
    #[must_use]
    pub fn captured(&self) -> Option<&str> {
        self.captured.as_deref()
    }

    /// Whether the watchdog ended this call
    #[must_use]
    pub fn timed_out(&self) -> bool {
        matches!(self.status, ExecStatus::TimedOut(_))
    }

    /// Legacy shape of the result
    ///
    /// With `return_rv` set this is always the exit code. Otherwise success
    /// is the captured text when there is one, else a plain truthy marker,
    /// and failure is falsy.
    #[must_use]
    pub fn value(&self) -> ReturnValue {
        if self.return_rv {
            return ReturnValue::ExitCode(self.exit_code());
        }

        match (self.ok(), &self.captured) {
            (true, Some(text)) => ReturnValue::Captured(text.clone()),
            (true, None) => ReturnValue::Ok,
            (false, _) => ReturnValue::Failed,
        }
    }

    /// Turn a failed result into an [`ExecError`]
    ///
    /// # Errors
    /// Returns the error matching the way the execution failed
    pub fn check(self) -> Result<Self, ExecError> {
        match &self.status {
            ExecStatus::Exited(0) | ExecStatus::DryRun => Ok(self),
            ExecStatus::Exited(status) => Err(ExecError::NonZeroExit { status: *status }),
            ExecStatus::Signaled(_) => Err(ExecError::NonZeroExit {
                status: NO_EXIT_CODE,
            }),
            ExecStatus::TimedOut(timeout) => Err(ExecError::Timeout { timeout: *timeout }),
            ExecStatus::SpawnFailed(reason) => match &self.host {
                Some(host) => Err(ExecError::Transport {
                    host: host.clone(),
                    reason: reason.clone(),
                }),
                None => Err(ExecError::SpawnFailed(reason.clone())),
            },
        }
    }
}

/// Legacy dual encoding of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnValue {
    /// Raw exit code, requested with `return_rv`
    ExitCode(i32),
    /// Success without payload
    Ok,
    /// Success with captured text
    Captured(String),
    /// Failure
    Failed,
}

impl ReturnValue {
    /// Truthiness as older callers test it
    ///
    /// An exit code is truthy when non-zero, so `ExitCode(0)` (success) is
    /// falsy and callers of that encoding must compare against 0. Empty
    /// captured text is falsy and cannot be told apart from a failure here;
    /// use [`ExecResult::ok`] instead.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            ReturnValue::ExitCode(code) => *code != 0,
            ReturnValue::Ok => true,
            ReturnValue::Captured(text) => !text.is_empty(),
            ReturnValue::Failed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(code: i32) -> ExecResult {
        ExecResult::new(ExecStatus::Exited(code), Duration::from_millis(5))
    }

    #[test]
    fn test_ok_and_exit_code() {
        assert!(exited(0).ok());
        assert!(!exited(3).ok());
        assert_eq!(exited(3).exit_code(), 3);
        assert!(ExecResult::dry_run().ok());
        assert_eq!(ExecResult::dry_run().exit_code(), 0);
    }

    #[test]
    fn test_timeout_reports_code_one() {
        let result = ExecResult::new(
            ExecStatus::TimedOut(Duration::from_secs(1)),
            Duration::from_secs(1),
        );

        assert!(!result.ok());
        assert!(result.timed_out());
        assert_eq!(result.exit_code(), TIMEOUT_EXIT_CODE);
    }

    #[test]
    fn test_value_without_return_rv() {
        assert_eq!(exited(0).value(), ReturnValue::Ok);
        assert!(exited(0).value().is_truthy());
        assert_eq!(exited(1).value(), ReturnValue::Failed);
        assert!(!exited(1).value().is_truthy());
    }

    #[test]
    fn test_value_with_return_rv() {
        assert_eq!(
            exited(0).with_return_rv(true).value(),
            ReturnValue::ExitCode(0)
        );
        assert_eq!(
            exited(1).with_return_rv(true).value(),
            ReturnValue::ExitCode(1)
        );
    }

    #[test]
    fn test_empty_capture_is_falsy_but_ok() {
        let result = exited(0).with_captured(String::new());

        assert!(result.ok());
        assert!(!result.value().is_truthy());
    }

    #[test]
    fn test_check_maps_taxonomy() {
        assert!(exited(0).check().is_ok());
        assert_eq!(
            exited(2).check(),
            Err(ExecError::NonZeroExit { status: 2 })
        );

        let mut spawn = ExecResult::new(
            ExecStatus::SpawnFailed("no such file".to_string()),
            Duration::ZERO,
        );
        assert_eq!(
            spawn.clone().check(),
            Err(ExecError::SpawnFailed("no such file".to_string()))
        );

        spawn.host = Some("web1".to_string());
        assert!(matches!(spawn.check(), Err(ExecError::Transport { host, .. }) if host == "web1"));
    }

    #[test]
    fn test_serializes_status_tag() {
        let json = serde_json::to_value(exited(0)).unwrap();

        assert_eq!(json["status"]["kind"], "exited");
        assert_eq!(json["status"]["detail"], 0);
    }
}
