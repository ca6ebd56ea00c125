//! fleetrun-exec: local and remote command execution
//!
//! Runs shell commands locally or on a remote host through the system `ssh`
//! client, with output redirection, timeouts, retries and binary lookup.

pub mod command;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod local;
pub mod locate;
pub mod options;
pub mod policy;
pub mod quote;
pub mod result;
pub mod ssh;
pub mod traits;
pub mod transcript;

pub use command::CommandSpec;
pub use dispatch::{BinaryLocation, Dispatcher};
pub use error::{ExecError, QuoteError};
pub use identity::SystemIdentity;
pub use local::LocalExecutor;
pub use locate::{find_binary, find_binary_in, find_remote_binary};
pub use options::ExecOptions;
pub use policy::OutputPolicy;
pub use result::{ExecResult, ExecStatus, ReturnValue};
pub use ssh::{SshConfig, SshExecutor};
pub use traits::{CommandRunner, LocalIdentity};
