//! Names of the local machine

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::local::LocalExecutor;
use crate::options::ExecOptions;
use crate::traits::LocalIdentity;

/// Budget for the `hostname -f` lookup
const FQDN_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity from the operating system
///
/// The short name comes from `gethostname(2)`, the fully-qualified one from
/// `hostname -f`, falling back to the short name when that fails.
#[derive(Debug, Clone, Default)]
pub struct SystemIdentity {
    local: LocalExecutor,
}

impl SystemIdentity {
    /// Create a new system identity resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalIdentity for SystemIdentity {
    async fn hostname(&self) -> String {
        match nix::unistd::gethostname() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(e) => {
                debug!(error = %e, "gethostname failed");
                String::new()
            }
        }
    }

    async fn fqdn(&self) -> String {
        let opts = ExecOptions::new()
            .with_capture()
            .with_timeout(FQDN_TIMEOUT);
        let result = self.local.execute("hostname -f", &opts).await;

        let fqdn = result
            .captured()
            .map(str::trim)
            .filter(|name| result.ok() && !name.is_empty())
            .map(str::to_string);

        match fqdn {
            Some(name) => name,
            None => self.hostname().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hostname_not_empty() {
        let identity = SystemIdentity::new();

        assert!(!identity.hostname().await.is_empty());
        assert!(!identity.fqdn().await.is_empty());
    }
}
