//! Streamable HTTP hosting for the MCP server.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::Router;
use kibana_api::KibanaClient;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::server::core::KibanaMcpCore;

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8811";
pub const MCP_HTTP_PATH: &str = "/mcp";

/// MCP endpoint bound to a loopback socket, ready to serve.
#[derive(Debug)]
pub struct McpHttpServer {
    listener: TcpListener,
    client: Arc<KibanaClient>,
}

impl McpHttpServer {
    pub async fn bind(address: SocketAddr, client: Arc<KibanaClient>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("failed to bind MCP HTTP server to {address}"))?;
        Ok(Self { listener, client })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve MCP sessions until `shutdown` resolves, then close open sessions.
    ///
    /// Every session handler is dropped before this returns, so the caller holds
    /// the last reference to the Kibana client.
    pub async fn serve<S>(self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let address = self.local_addr()?;
        let sessions = CancellationToken::new();
        let client = self.client;
        let service: StreamableHttpService<KibanaMcpCore, LocalSessionManager> = StreamableHttpService::new(
            move || Ok(KibanaMcpCore::new(Arc::clone(&client))),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                stateful_mode: true,
                sse_keep_alive: None,
                cancellation_token: sessions.child_token(),
                ..Default::default()
            },
        );
        let router = Router::new().nest_service(MCP_HTTP_PATH, service);

        info!(%address, path = MCP_HTTP_PATH, "MCP HTTP server listening");
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                sessions.cancel();
            })
            .await
            .context("MCP HTTP server failed")?;
        info!(%address, "MCP HTTP server stopped");
        Ok(())
    }
}

/// Resolve a bind address, refusing anything that is not loopback.
pub fn resolve_bind_address(bind_address: Option<&str>) -> Result<SocketAddr> {
    let address = bind_address.unwrap_or(DEFAULT_BIND_ADDRESS);
    let parsed: SocketAddr = address
        .parse()
        .map_err(|error| anyhow!("invalid MCP HTTP bind address '{address}': {error}"))?;
    if !is_loopback(parsed.ip()) {
        return Err(anyhow!("MCP HTTP server must bind to a loopback address, got '{address}'"));
    }
    Ok(parsed)
}

fn is_loopback(address: IpAddr) -> bool {
    match address {
        IpAddr::V4(ip) => ip.is_loopback(),
        IpAddr::V6(ip) => ip.is_loopback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kibana_api::KibanaSettings;

    #[test]
    fn bind_address_defaults_to_loopback() {
        let address = resolve_bind_address(None).expect("default address");
        assert_eq!(address.to_string(), DEFAULT_BIND_ADDRESS);
        assert!(resolve_bind_address(Some("[::1]:9000")).is_ok());
    }

    #[test]
    fn bind_address_rejects_public_interfaces() {
        let error = resolve_bind_address(Some("0.0.0.0:8811")).expect_err("public bind");
        assert!(error.to_string().contains("loopback"));
        assert!(resolve_bind_address(Some("not-an-address")).is_err());
    }

    #[tokio::test]
    async fn serves_on_an_ephemeral_port_until_shutdown() {
        let client = Arc::new(
            KibanaClient::from_settings(&KibanaSettings {
                base_url: Some("http://127.0.0.1:9".to_string()),
                api_key: Some("key".to_string()),
                ..KibanaSettings::default()
            })
            .expect("client"),
        );
        let address = resolve_bind_address(Some("127.0.0.1:0")).expect("address");
        let server = McpHttpServer::bind(address, Arc::clone(&client)).await.expect("bind");
        assert_ne!(server.local_addr().expect("local address").port(), 0);

        server.serve(std::future::ready(())).await.expect("serve");
        assert_eq!(Arc::strong_count(&client), 1);
    }
}
