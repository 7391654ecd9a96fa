mod core;
mod errors;
mod execution;
mod http;
mod prompts;
mod registry;
mod resolver;
mod resources;
mod schemas;

pub use core::KibanaMcpCore;
pub use execution::{ResultEnvelope, execute_tool_safely, failure_class};
pub use http::{DEFAULT_BIND_ADDRESS, MCP_HTTP_PATH, McpHttpServer, resolve_bind_address};
pub use prompts::{PromptName, list_prompts, render_prompt};
pub use registry::{ToolName, ToolRegistry, UnknownTool, ValidationError};
pub use resolver::{Resolution, ResolveError, ResourceUri, Resolver, RoutingError};
pub use resources::{list_resource_templates, list_resources, read_result};
pub use schemas::{
    AddRuleExceptionItemsParams, AdjustAlertStatusParams, FindRulesParams, GetAlertsParams, GetRuleExceptionsParams, TagAlertParams,
};
