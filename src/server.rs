//! HTTP server setup and lifecycle management.

use std::net::SocketAddr;
use std::num::NonZeroU16;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::cli::Cli;
use crate::config::ProxyConfig;
use crate::error::GateError;
use crate::resolver::DownloadResolver;
use crate::router::route_request;

/// Main server struct holding configuration.
pub struct Server {
    bind_address: String,
    port: NonZeroU16,
    config: ProxyConfig,
}

impl Server {
    pub fn new(cli: Cli) -> Self {
        Self {
            bind_address: cli.host.clone(),
            port: cli.port,
            config: ProxyConfig::from(&cli),
        }
    }

    #[cfg(test)]
    /// Create a server instance for testing that binds to a random available
    /// port; the public address is derived from that port so self-addressed
    /// redirects can be exercised.
    pub(crate) async fn test_mode(
        backend_url: String,
        token: crate::secret::Secret,
    ) -> Result<(Self, u16), GateError> {
        use crate::constants::DEFAULT_MAX_REDIRECTS;

        let host = "127.0.0.1".to_string();
        let addr = format!("{host}:0");
        if let Ok(listener) = TcpListener::bind(&addr).await {
            let port = listener.local_addr()?.port();
            let server = Server::new(Cli {
                port: NonZeroU16::try_from(port).map_err(|_| {
                    GateError::Other(format!("Failed to convert port '{port}' to NonZeroU16"))
                })?,
                host: host.clone(),
                backend_url,
                token,
                public_url: format!("http://{host}:{port}"),
                max_redirects: DEFAULT_MAX_REDIRECTS,
            });
            return Ok((server, port));
        }

        Err(GateError::Other(
            "Could not find an available port for testing".to_string(),
        ))
    }

    pub async fn run(self) -> Result<(), GateError> {
        let addr = format!("{}:{}", self.bind_address, self.port);
        let addr: SocketAddr = addr.parse().map_err(|err| {
            GateError::Configuration(format!("Failed to parse address '{addr}': {err}"))
        })?;

        let resolver = Arc::new(DownloadResolver::new(Arc::new(self.config.clone()))?);

        info!(
            backend_url = %self.config.backend_url,
            public_url = %self.config.public_url,
            max_redirects = self.config.max_redirects,
            address = %addr,
            "Starting dlgate..."
        );

        let listener = TcpListener::bind(addr).await?;

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(error = %err, "Failed to accept connection");
                    continue;
                }
            };
            debug!(remote_addr = %remote_addr, "Accepted new connection");

            let io = TokioIo::new(stream);
            let resolver = resolver.clone();

            tokio::task::spawn(async move {
                if let Err(err) = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req| {
                            let resolver = Arc::clone(&resolver);
                            async move { route_request(req, remote_addr, resolver).await }
                        }),
                    )
                    .await
                {
                    debug!(error = %err, remote_addr = %remote_addr, "Error serving connection");
                }
            });
        }
    }
}
