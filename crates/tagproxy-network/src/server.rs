//! HTTP server lifecycle.
//!
//! [`HttpServer`] binds the listener up front so that bind failures surface
//! before the device loop starts, then serves the router until a
//! cancellation token fires. Shutdown is graceful: in-flight requests are
//! completed.
//!
//! # Example Usage
//!
//! ```no_run
//! use tagproxy_device::{DeviceConfig, DeviceController};
//! use tagproxy_network::{AppState, HttpServer, HttpServerConfig, Settings};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let device = DeviceController::new(DeviceConfig::default());
//! let state = AppState::new(device, Settings::default());
//!
//! let server = HttpServer::bind(HttpServerConfig::default(), state).await?;
//! println!("Listening on {}", server.local_addr()?);
//! server.serve(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::HttpServerError;
use crate::routes::{AppState, router};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tagproxy_core::constants::DEFAULT_HTTP_PORT;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Configuration for the HTTP server
///
/// # Example
///
/// ```
/// use tagproxy_network::HttpServerConfig;
///
/// let config = HttpServerConfig::default();
/// assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9090");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_HTTP_PORT),
        }
    }
}

impl HttpServerConfig {
    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }
}

/// Bound HTTP server for the device API.
#[derive(Debug)]
pub struct HttpServer {
    listener: TcpListener,
    state: AppState,
}

impl HttpServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns `BindFailed` if the address is in use or not permitted.
    pub async fn bind(config: HttpServerConfig, state: AppState) -> Result<Self, HttpServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| HttpServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;
        Ok(Self { listener, state })
    }

    /// Address the server listens on, with the actual port when bound to 0.
    pub fn local_addr(&self) -> Result<SocketAddr, HttpServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve requests until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), HttpServerError> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "HTTP server listening");

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                info!("HTTP server shutting down gracefully");
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Settings;
    use tagproxy_device::{DeviceConfig, DeviceController};

    fn state() -> AppState {
        AppState::new(DeviceController::new(DeviceConfig::default()), Settings::default())
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = HttpServerConfig::default().with_bind_addr("127.0.0.1:0".parse().unwrap());
        let server = HttpServer::bind(config, state()).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let config = HttpServerConfig::default().with_bind_addr("127.0.0.1:0".parse().unwrap());
        let first = HttpServer::bind(config, state()).await.unwrap();
        let taken = HttpServerConfig::default().with_bind_addr(first.local_addr().unwrap());

        let result = HttpServer::bind(taken, state()).await;
        assert!(matches!(result, Err(HttpServerError::BindFailed { .. })));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let config = HttpServerConfig::default().with_bind_addr("127.0.0.1:0".parse().unwrap());
        let server = HttpServer::bind(config, state()).await.unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.serve(cancel.clone()));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }
}
