use std::num::NonZeroU16;

use clap::Parser;

use crate::secret::Secret;

#[derive(Parser, Debug)]
pub struct Cli {
    #[clap(short, long, default_value = "8080", env = "DLGATE_PORT")]
    pub port: NonZeroU16,

    #[clap(long, default_value = "127.0.0.1", env = "DLGATE_HOST")]
    pub host: String,

    /// Base address of the backend file API, e.g. https://files.example.com
    #[clap(short, long, env = "DLGATE_BACKEND_URL")]
    pub backend_url: String,

    /// Shared secret: signs download links and authenticates to the backend
    #[clap(short, long, env = "DLGATE_TOKEN")]
    pub token: Secret,

    /// Public address of this gateway, used to spot self-addressed redirects
    #[clap(long, env = "DLGATE_PUBLIC_URL")]
    pub public_url: String,

    /// Redirect hop budget for a single download
    #[clap(long, default_value = "10", env = "DLGATE_MAX_REDIRECTS")]
    pub max_redirects: usize,
}
