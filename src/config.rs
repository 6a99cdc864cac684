//! Runtime configuration shared by the verifier and the resolver.

use crate::cli::Cli;
use crate::secret::Secret;

/// Read-only configuration injected into every component at construction.
/// Nothing in the gateway mutates this after startup.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base address of the file-listing backend, no trailing slash.
    pub backend_url: String,
    /// Shared secret: signs download tokens and authenticates to the backend.
    pub token: Secret,
    /// This gateway's own public address, no trailing slash. A redirect whose
    /// target starts with this address re-enters the pipeline instead of
    /// being fetched from the network.
    pub public_url: String,
    /// Redirect hop budget for a single download.
    pub max_redirects: usize,
}

impl ProxyConfig {
    pub fn new(backend_url: &str, token: Secret, public_url: &str, max_redirects: usize) -> Self {
        Self {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            token,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_redirects,
        }
    }
}

impl From<&Cli> for ProxyConfig {
    fn from(cli: &Cli) -> Self {
        Self::new(
            &cli.backend_url,
            cli.token.clone(),
            &cli.public_url,
            cli.max_redirects,
        )
    }
}
