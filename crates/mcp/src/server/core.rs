use std::future::Future;
use std::sync::Arc;

use kibana_api::KibanaClient;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ErrorData as McpError, GetPromptRequestParams, GetPromptResult, Implementation,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, PaginatedRequestParams, ProtocolVersion,
    ReadResourceRequestParams, ReadResourceResult, ServerCapabilities, ServerInfo,
};
use rmcp::{ServerHandler, service::RequestContext};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::server::errors::{cancelled_error, invalid_params_error, resolve_error, routing_error};
use crate::server::prompts::list_prompts;
use crate::server::registry::{ToolName, ToolRegistry};
use crate::server::resolver::Resolver;
use crate::server::resources::{list_resource_templates, list_resources, read_result};

const SERVER_INSTRUCTIONS: &str = "Kibana Security alert server.\nTOOLS:\n- get_alerts lists recent alerts (limit, search_text query string; '*' for all).\n- adjust_alert_status sets open|acknowledged|closed on one alert.\n- tag_alert adds tags to one alert.\n- find_rules, get_rule_exceptions and add_rule_exception_items manage detection rules and their exceptions (rule ids are internal UUIDs).\nRESOURCES:\n- alert://{alert_id} returns the full alert document.\n- prompt://{prompt_name} renders a named prompt (triage-alerts, investigate-alert, tune-rule).\nTool failures are returned as text beginning with \"Error executing tool\" or \"Invalid\".";

/// MCP handler exposing Kibana alert tools, resources, and prompts.
///
/// Cloning is cheap: the registry and resolver share one [`KibanaClient`].
#[derive(Debug, Clone)]
pub struct KibanaMcpCore {
    registry: Arc<ToolRegistry>,
    resolver: Resolver,
}

impl KibanaMcpCore {
    pub fn new(client: Arc<KibanaClient>) -> Self {
        Self {
            registry: Arc::new(ToolRegistry::new(Arc::clone(&client))),
            resolver: Resolver::new(client),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

/// Race a request against caller cancellation; a cancelled request drops `request`.
async fn run_cancellable<T>(
    ct: &CancellationToken,
    operation: &str,
    request: impl Future<Output = Result<T, McpError>>,
) -> Result<T, McpError> {
    tokio::select! {
        biased;
        _ = ct.cancelled() => {
            warn!(operation, "request cancelled");
            Err(cancelled_error(operation))
        }
        result = request => result,
    }
}

impl ServerHandler for KibanaMcpCore {
    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(self.registry.list_tools()))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let name = request.name.to_string();
            let tool = name.parse::<ToolName>().map_err(|error| {
                invalid_params_error(
                    "TOOL_NOT_FOUND",
                    error.to_string(),
                    serde_json::json!({ "name": name }),
                    "Call tools/list to inspect available tools.",
                )
            })?;

            let call = async { Ok(CallToolResult::from(self.registry.call(tool, request.arguments.unwrap_or_default()).await)) };
            run_cancellable(&context.ct, tool.as_str(), call).await
        }
    }

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        std::future::ready(Ok(list_resources()))
    }

    fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, McpError>> + Send + '_ {
        std::future::ready(Ok(list_resource_templates()))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            let uri = request.uri;
            debug!(%uri, "reading resource");
            let read = async {
                match self.resolver.resolve(&uri, None).await {
                    Ok(resolution) => Ok(read_result(&uri, resolution)),
                    Err(error) => {
                        warn!(%uri, %error, "resource resolution failed");
                        Err(resolve_error(&uri, &error))
                    }
                }
            };
            run_cancellable(&context.ct, "resources/read", read).await
        }
    }

    fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListPromptsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(list_prompts()))
    }

    fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<GetPromptResult, McpError>> + Send + '_ {
        std::future::ready(
            self.resolver
                .resolve_prompt(&request.name, request.arguments.as_ref())
                .map_err(|error| routing_error(&request.name, &error)),
        )
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: "kibana-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Kibana MCP".to_string()),
                ..Default::default()
            },
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kibana_api::KibanaSettings;
    use rmcp::model::ErrorCode;

    fn core() -> KibanaMcpCore {
        let client = KibanaClient::from_settings(&KibanaSettings {
            base_url: Some("http://127.0.0.1:9".to_string()),
            api_key: Some("key".to_string()),
            ..KibanaSettings::default()
        })
        .expect("client");
        KibanaMcpCore::new(Arc::new(client))
    }

    #[test]
    fn server_info_advertises_tools_resources_and_prompts() {
        let info = core().get_info();
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.capabilities.prompts.is_some());
        assert_eq!(info.server_info.name, "kibana-mcp");
    }

    #[test]
    fn registry_publishes_every_tool() {
        let names = core()
            .registry()
            .tools()
            .iter()
            .map(|tool| tool.name.to_string())
            .collect::<Vec<String>>();
        assert_eq!(
            names,
            vec![
                "tag_alert",
                "adjust_alert_status",
                "get_alerts",
                "find_rules",
                "get_rule_exceptions",
                "add_rule_exception_items",
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_request_is_a_retryable_protocol_error() {
        let ct = CancellationToken::new();
        ct.cancel();

        let error = run_cancellable(&ct, "get_alerts", std::future::pending::<Result<(), McpError>>())
            .await
            .expect_err("cancelled");

        assert_eq!(error.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(error.message, "request cancelled");
        let data = error.data.expect("error data");
        assert_eq!(data["retryable"], true);
        assert_eq!(data["error_code"], "REQUEST_CANCELLED");
        assert_eq!(data["context"]["operation"], "get_alerts");
    }

    #[tokio::test]
    async fn uncancelled_request_passes_its_result_through() {
        let ct = CancellationToken::new();
        let result = run_cancellable(&ct, "resources/read", async { Ok::<_, McpError>(7) }).await;
        assert_eq!(result.expect("completed"), 7);
    }
}
