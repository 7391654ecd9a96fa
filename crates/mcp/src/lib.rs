//! Model Context Protocol (MCP) server for Kibana Security alerts.
//!
//! This crate exposes the backend operations of [`kibana_api`] as MCP tools,
//! resources, and prompts:
//!
//! - [`ToolRegistry`] publishes tool definitions and validates arguments before
//!   delegating to [`execute_tool_safely`], which turns every backend outcome into
//!   a [`ResultEnvelope`]
//! - [`Resolver`] routes `alert://` and `prompt://` URIs
//! - [`KibanaMcpCore`] implements the rmcp `ServerHandler`, served over stdio
//!   ([`serve_stdio`]) or streamable HTTP ([`McpHttpServer`])

pub mod server;

use std::sync::Arc;

use anyhow::Result;
use kibana_api::KibanaClient;
use rmcp::ServiceExt;
use tracing::info;

pub use server::{
    KibanaMcpCore, McpHttpServer, ResolveError, Resolution, ResourceUri, Resolver, ResultEnvelope, RoutingError,
    ToolName, ToolRegistry, ValidationError, execute_tool_safely, resolve_bind_address,
};

/// Serve the MCP protocol over stdin/stdout until the peer disconnects.
pub async fn serve_stdio(client: Arc<KibanaClient>) -> Result<()> {
    let service = KibanaMcpCore::new(client).serve(rmcp::transport::stdio()).await?;
    info!("MCP stdio transport ready");
    let reason = service.waiting().await?;
    info!(?reason, "MCP stdio transport closed");
    Ok(())
}
