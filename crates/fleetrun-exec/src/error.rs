//! Error types for fleetrun-exec

use std::time::Duration;

use thiserror::Error;

/// Failures of a single execution
///
/// Executors never return these directly: a failed command is reported on
/// [`ExecResult`](crate::result::ExecResult) and converted here by
/// [`ExecResult::check`](crate::result::ExecResult::check).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The OS could not start the command or open its output destination
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    /// Command ran and exited with a non-zero status (or was killed by a signal)
    #[error("command exited with status {status}")]
    NonZeroExit {
        /// Exit status, -1 when the process had none
        status: i32,
    },

    /// Command exceeded its wall-clock budget
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Secure-shell client could not be started
    #[error("transport to {host} failed: {reason}")]
    Transport {
        /// Target host
        host: String,
        /// Underlying spawn failure
        reason: String,
    },

    /// Binary name could not be resolved to an absolute path on a remote host
    #[error("could not resolve {name} on {host}")]
    Resolution {
        /// Target host
        host: String,
        /// Binary name that was looked up
        name: String,
    },
}

/// Errors from splitting a caller-supplied option string into words
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    /// A quote was opened and never closed
    #[error("unterminated {0} quote")]
    Unterminated(char),

    /// Input ended with a lone backslash
    #[error("trailing backslash")]
    TrailingBackslash,
}
