//! Output redirection decision

use std::path::PathBuf;

use crate::options::ExecOptions;

/// Where a command's stdout and stderr go
///
/// Decided once per call before spawning. Redirections written inside a
/// shell command string (`2>/dev/null`, `>&2`) are applied by the shell
/// after these and still take effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Append both streams to a transcript file
    LogFile(PathBuf),
    /// Both streams into a caller-named file
    CaptureFile {
        /// Destination
        path: PathBuf,
        /// Append instead of truncate
        append: bool,
    },
    /// Both streams into a temp file that is read back and removed
    CaptureTemp,
    /// Both streams to the null device
    Discard,
    /// Caller's own streams
    Inherit,
}

impl OutputPolicy {
    /// Pick the policy for a set of options
    ///
    /// Precedence: log file, then capture (named file before temp file),
    /// then verbose inheritance, else discard.
    #[must_use]
    pub fn decide(opts: &ExecOptions) -> Self {
        if let Some(log_file) = &opts.log_file {
            return OutputPolicy::LogFile(log_file.clone());
        }

        if opts.capture_output {
            return match &opts.out_file {
                Some(path) => OutputPolicy::CaptureFile {
                    path: path.clone(),
                    append: opts.append,
                },
                None => OutputPolicy::CaptureTemp,
            };
        }

        if opts.verbose {
            OutputPolicy::Inherit
        } else {
            OutputPolicy::Discard
        }
    }

    /// Whether stdin stays attached to the caller
    #[must_use]
    pub fn inherits_stdin(&self) -> bool {
        matches!(self, OutputPolicy::Inherit)
    }
}
