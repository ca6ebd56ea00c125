//! Binary lookup, locally on the search path and remotely over SSH

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument, warn};

use crate::options::ExecOptions;
use crate::quote::shell_quote;
use crate::ssh::SshExecutor;
use crate::traits::CommandRunner;

/// Directories searched after `PATH`, in this order
pub const FALLBACK_DIRS: [&str; 6] = [
    "/sbin",
    "/bin",
    "/usr/sbin",
    "/usr/bin",
    "/usr/local/sbin",
    "/usr/local/bin",
];

/// Retries for the remote name lookup
const REMOTE_LOOKUP_RETRIES: u32 = 2;

/// Find `name` on the current `PATH` or in [`FALLBACK_DIRS`]
#[must_use]
pub fn find_binary(name: &str) -> Option<PathBuf> {
    find_binary_in(name, std::env::var_os("PATH").as_deref())
}

/// Find `name` on `path_var` (a `PATH`-style list) or in [`FALLBACK_DIRS`]
///
/// The first directory holding a regular file called `name` that the
/// caller may execute wins. A name containing a slash is not searched: it
/// is checked in place, relative to the working directory.
#[must_use]
pub fn find_binary_in(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    if name.contains('/') {
        return which::which_in(name, None::<&OsStr>, &cwd).ok();
    }

    let search_path = path_var
        .map(|p| std::env::split_paths(p).collect::<Vec<_>>())
        .unwrap_or_default();

    search_path
        .into_iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .chain(FALLBACK_DIRS.iter().map(PathBuf::from))
        .find_map(|dir| which::which_in(name, Some(&dir), &cwd).ok())
}

/// Whether `name` exists and is executable on `host`
///
/// A bare name is first resolved with `command -v` (captured, retried
/// twice); anything that does not resolve to an absolute path is reported
/// as missing.
#[instrument(skip(ssh))]
pub async fn find_remote_binary<R: CommandRunner>(
    ssh: &SshExecutor<R>,
    host: &str,
    name: &str,
) -> bool {
    let path = if name.starts_with('/') {
        name.to_string()
    } else {
        match resolve_remote(ssh, host, name).await {
            Some(path) => path,
            None => {
                warn!(host = %host, binary = %name, "could not resolve binary on remote host");
                return false;
            }
        }
    };

    let quoted = shell_quote(&path);
    let test = format!("test -f {quoted} && test -x {quoted}");
    let found = ssh
        .execute_remote(host, &test, &ExecOptions::default())
        .await
        .ok();

    debug!(host = %host, path = %path, found, "remote binary check");
    found
}

async fn resolve_remote<R: CommandRunner>(
    ssh: &SshExecutor<R>,
    host: &str,
    name: &str,
) -> Option<String> {
    let opts = ExecOptions {
        retry: REMOTE_LOOKUP_RETRIES,
        ..ExecOptions::new().with_capture()
    };
    let lookup = format!("command -v {}", shell_quote(name));
    let result = ssh.execute_remote(host, &lookup, &opts).await;

    if !result.ok() {
        return None;
    }

    result
        .captured()
        .and_then(|out| out.lines().next())
        .map(str::trim)
        .filter(|line| line.starts_with('/'))
        .map(str::to_string)
}
