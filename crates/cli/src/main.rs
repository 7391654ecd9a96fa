use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kibana_api::KibanaClient;
use kibana_mcp::{McpHttpServer, resolve_bind_address, serve_stdio};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Serve Kibana Security alert operations over the Model Context Protocol.
///
/// Kibana is configured through KIBANA_URL plus either KIBANA_API_KEY or
/// KIBANA_USERNAME and KIBANA_PASSWORD.
#[derive(Parser, Debug)]
#[command(name = "kibana-mcp", version, about)]
struct Args {
    /// Transport used to talk to the MCP client
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Loopback address for the HTTP transport
    #[arg(long, default_value = kibana_mcp::server::DEFAULT_BIND_ADDRESS)]
    bind: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let client = match KibanaClient::from_env() {
        Ok(client) => Arc::new(client),
        Err(config_error) => {
            error!(error = %config_error, "invalid Kibana configuration");
            return Err(config_error).context("failed to configure the Kibana client");
        }
    };
    info!(
        base_url = client.base_url(),
        auth = client.config().auth_method.label(),
        "Kibana client ready"
    );

    let outcome = match args.transport {
        Transport::Stdio => serve_stdio(client).await,
        Transport::Http => serve_http(&args.bind, client).await,
    };
    info!(ok = outcome.is_ok(), "serve loop finished");
    outcome
}

async fn serve_http(bind: &str, client: Arc<KibanaClient>) -> Result<()> {
    let address = resolve_bind_address(Some(bind))?;
    let server = McpHttpServer::bind(address, client).await?;
    info!(address = %server.local_addr()?, "serving MCP over HTTP; press Ctrl-C to stop");

    server
        .serve(async {
            if let Err(signal_error) = tokio::signal::ctrl_c().await {
                error!(error = %signal_error, "failed to listen for Ctrl-C");
            }
            info!("shutting down MCP HTTP server");
        })
        .await
}

// stdout carries the stdio transport, so logs go to stderr.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stdio_on_loopback() {
        let args = Args::try_parse_from(["kibana-mcp"]).expect("default args");
        assert_eq!(args.transport, Transport::Stdio);
        assert_eq!(args.bind, "127.0.0.1:8811");
    }

    #[test]
    fn accepts_http_transport_and_bind() {
        let args = Args::try_parse_from(["kibana-mcp", "--transport", "http", "--bind", "127.0.0.1:9000"]).expect("http args");
        assert_eq!(args.transport, Transport::Http);
        assert_eq!(args.bind, "127.0.0.1:9000");
        assert!(Args::try_parse_from(["kibana-mcp", "--transport", "sse"]).is_err());
    }
}
