//! Structured description of a process to spawn

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::quote::shell_join;

/// Shell used for command strings
pub const SHELL: &str = "/bin/sh";

/// A process to spawn
///
/// Unlike `tokio::process::Command` this is `Clone`, so the remote path can
/// assemble it once and replay it on every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    env_remove: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Spec for `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            env_remove: Vec::new(),
            current_dir: None,
        }
    }

    /// Spec that runs `command` through `sh -c`
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(SHELL).arg("-c").arg(command)
    }

    /// Add an argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a variable in the child's environment
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Remove a variable from the child's environment only
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument vector
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Variables removed from the child's environment
    #[must_use]
    pub fn removed_env(&self) -> &[String] {
        &self.env_remove
    }

    /// Variables set in the child's environment
    #[must_use]
    pub fn get_envs(&self) -> &[(String, String)] {
        &self.env
    }

    /// Working directory
    #[must_use]
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Command line for logs and transcripts
    #[must_use]
    pub fn display(&self) -> String {
        shell_join(std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)))
    }

    /// Build the tokio command (stdio is left to the caller)
    pub(crate) fn prepare(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}
