//! Per-call execution options

use std::path::PathBuf;
use std::time::Duration;

/// Delay between remote retry attempts when none is configured
pub const DEFAULT_RETRY_SLEEP: Duration = Duration::from_secs(10);

/// Options for one execution
///
/// Every field is an independent toggle. Fields in the second group only
/// affect remote execution and are ignored by
/// [`LocalExecutor`](crate::local::LocalExecutor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOptions {
    /// Append both streams to this file; wins over `capture_output`
    pub log_file: Option<PathBuf>,
    /// Redirect stdout and stderr to a file for retrieval
    pub capture_output: bool,
    /// Capture destination; a temp file is used and read back when absent
    pub out_file: Option<PathBuf>,
    /// Append to `out_file` instead of truncating it
    pub append: bool,
    /// Inherit the caller's streams instead of discarding output
    pub verbose: bool,
    /// Wall-clock budget, zero disables the watchdog
    pub timeout: Duration,
    /// Ask for the raw exit code in the legacy [`ReturnValue`](crate::result::ReturnValue) view
    pub return_rv: bool,
    /// Skip the spawn and report success
    pub dry_run: bool,

    /// Detach the remote command from the session
    pub nohup: bool,
    /// Keep the caller's agent variables for this call
    pub use_ssh_agent: bool,
    /// Bypass host-key verification for this call
    pub no_strict_host_key_checking: bool,
    /// Extra client options, split into words like a shell would
    pub ssh_opts: Option<String>,
    /// Verbose client output instead of quiet
    pub ssh_verbose: bool,
    /// Additional attempts after a failed first one
    pub retry: u32,
    /// Pause before each retry
    pub sleep: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            log_file: None,
            capture_output: false,
            out_file: None,
            append: false,
            verbose: false,
            timeout: Duration::ZERO,
            return_rv: false,
            dry_run: false,
            nohup: false,
            use_ssh_agent: false,
            no_strict_host_key_checking: false,
            ssh_opts: None,
            ssh_verbose: false,
            retry: 0,
            sleep: DEFAULT_RETRY_SLEEP,
        }
    }
}

impl ExecOptions {
    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append output to a transcript file
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Capture output into a temp file and return it
    #[must_use]
    pub fn with_capture(mut self) -> Self {
        self.capture_output = true;
        self
    }

    /// Capture output into `path`
    #[must_use]
    pub fn with_out_file(mut self, path: impl Into<PathBuf>, append: bool) -> Self {
        self.capture_output = true;
        self.out_file = Some(path.into());
        self.append = append;
        self
    }

    /// Let output through to the caller's streams
    #[must_use]
    pub fn with_verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Set the wall-clock budget
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Select the raw exit-code encoding for [`ExecResult::value`](crate::result::ExecResult::value)
    #[must_use]
    pub fn with_return_rv(mut self) -> Self {
        self.return_rv = true;
        self
    }

    /// Skip the spawn
    #[must_use]
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Detach the remote command
    #[must_use]
    pub fn with_nohup(mut self) -> Self {
        self.nohup = true;
        self
    }

    /// Keep agent variables (only honored when the executor forwards the agent)
    #[must_use]
    pub fn with_ssh_agent(mut self) -> Self {
        self.use_ssh_agent = true;
        self
    }

    /// Skip host-key verification
    #[must_use]
    pub fn with_no_strict_host_key_checking(mut self) -> Self {
        self.no_strict_host_key_checking = true;
        self
    }

    /// Extra client options
    #[must_use]
    pub fn with_ssh_opts(mut self, opts: impl Into<String>) -> Self {
        self.ssh_opts = Some(opts.into());
        self
    }

    /// Verbose client output
    #[must_use]
    pub fn with_ssh_verbose(mut self) -> Self {
        self.ssh_verbose = true;
        self
    }

    /// Retry a failed remote call `retry` more times, pausing `sleep` before each
    #[must_use]
    pub fn with_retry(mut self, retry: u32, sleep: Duration) -> Self {
        self.retry = retry;
        self.sleep = sleep;
        self
    }

    /// Whether a watchdog is needed
    #[must_use]
    pub fn has_timeout(&self) -> bool {
        !self.timeout.is_zero()
    }
}
