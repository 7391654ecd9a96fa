//! Explicit tool registry.
//!
//! Tools are a closed enumeration ([`ToolName`]). The registry is built once
//! with the shared client, publishes one definition per tool, and dispatches
//! calls after validating arguments locally.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use kibana_api::KibanaClient;
use kibana_api::alerts::{self, AlertSearch, AlertStatus, StatusUpdateRequest, TagAlertRequest};
use kibana_api::rules::{self, AddExceptionItemsRequest, FindRulesQuery};
use rmcp::model::{JsonObject, ListToolsResult, Tool, ToolAnnotations};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::server::execution::{ResultEnvelope, execute_tool_safely};
use crate::server::schemas::{
    AddRuleExceptionItemsParams, AdjustAlertStatusParams, FindRulesParams, GetAlertsParams, GetRuleExceptionsParams, TagAlertParams,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    TagAlert,
    AdjustAlertStatus,
    GetAlerts,
    FindRules,
    GetRuleExceptions,
    AddRuleExceptionItems,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::TagAlert,
        ToolName::AdjustAlertStatus,
        ToolName::GetAlerts,
        ToolName::FindRules,
        ToolName::GetRuleExceptions,
        ToolName::AddRuleExceptionItems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::TagAlert => "tag_alert",
            ToolName::AdjustAlertStatus => "adjust_alert_status",
            ToolName::GetAlerts => "get_alerts",
            ToolName::FindRules => "find_rules",
            ToolName::GetRuleExceptions => "get_rule_exceptions",
            ToolName::AddRuleExceptionItems => "add_rule_exception_items",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            ToolName::TagAlert => "Add one or more tags to a security alert. Input: alert_id, tags[].",
            ToolName::AdjustAlertStatus => {
                "Change the workflow status of a security alert. Input: alert_id, new_status (open|acknowledged|closed)."
            }
            ToolName::GetAlerts => {
                "List recent security alerts, newest first. Input: optional limit (default 20), optional search_text query string ('*' for all)."
            }
            ToolName::FindRules => {
                "Search detection rules. Input: optional filter (KQL over alert.attributes.*), sort_field, sort_order, page (>= 1), per_page."
            }
            ToolName::GetRuleExceptions => "List the exception items attached to a detection rule. Input: rule_id (internal rule UUID).",
            ToolName::AddRuleExceptionItems => {
                "Add exception items to a detection rule's default exception list. Input: rule_id (internal rule UUID), items[]."
            }
        }
    }

    fn input_schema(&self) -> Arc<JsonObject> {
        match self {
            ToolName::TagAlert => schema_for::<TagAlertParams>(),
            ToolName::AdjustAlertStatus => schema_for::<AdjustAlertStatusParams>(),
            ToolName::GetAlerts => schema_for::<GetAlertsParams>(),
            ToolName::FindRules => schema_for::<FindRulesParams>(),
            ToolName::GetRuleExceptions => schema_for::<GetRuleExceptionsParams>(),
            ToolName::AddRuleExceptionItems => schema_for::<AddRuleExceptionItemsParams>(),
        }
    }

    fn annotations(&self) -> ToolAnnotations {
        let read_only = matches!(self, ToolName::GetAlerts | ToolName::FindRules | ToolName::GetRuleExceptions);
        let idempotent = !matches!(self, ToolName::AddRuleExceptionItems);
        ToolAnnotations::new()
            .read_only(read_only)
            .destructive(false)
            .idempotent(idempotent)
            .open_world(true)
    }

    pub fn definition(&self) -> Tool {
        Tool::new(self.as_str(), self.description(), self.input_schema()).annotate(self.annotations())
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tool '{0}'")]
pub struct UnknownTool(pub String);

impl FromStr for ToolName {
    type Err = UnknownTool;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == name)
            .ok_or_else(|| UnknownTool(name.to_string()))
    }
}

/// Pre-flight argument failures. These never reach the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid arguments for tool '{tool}': {detail}")]
    InvalidArguments { tool: ToolName, detail: String },

    #[error("Invalid arguments for tool '{tool}': '{field}' must not be empty")]
    EmptyField { tool: ToolName, field: &'static str },

    #[error("Invalid status '{value}'. Must be one of [open, acknowledged, closed].")]
    InvalidStatus { value: String },

    #[error("Invalid arguments for tool '{tool}': 'page' must be at least 1")]
    InvalidPage { tool: ToolName },

    #[error("Invalid UUID format for rule_id: {value}")]
    InvalidRuleId { value: String },
}

/// Published tool definitions plus the dispatcher that serves them.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    client: Arc<KibanaClient>,
    tools: Vec<Tool>,
}

impl ToolRegistry {
    pub fn new(client: Arc<KibanaClient>) -> Self {
        let tools = ToolName::ALL.iter().map(ToolName::definition).collect();
        Self { client, tools }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn list_tools(&self) -> ListToolsResult {
        ListToolsResult::with_all_items(self.tools.clone())
    }

    /// Resolve a tool by name and run it.
    ///
    /// Only an unknown name is an error; every other outcome, including
    /// invalid arguments and backend failures, is an envelope.
    pub async fn dispatch(&self, name: &str, arguments: Option<JsonObject>) -> Result<ResultEnvelope, UnknownTool> {
        let tool = name.parse::<ToolName>()?;
        Ok(self.call(tool, arguments.unwrap_or_default()).await)
    }

    pub async fn call(&self, tool: ToolName, arguments: JsonObject) -> ResultEnvelope {
        debug!(tool = %tool, argument_count = arguments.len(), "dispatching tool call");
        self.run(tool, Value::Object(arguments))
            .await
            .unwrap_or_else(ResultEnvelope::from)
    }

    async fn run(&self, tool: ToolName, arguments: Value) -> Result<ResultEnvelope, ValidationError> {
        let client = self.client.as_ref();
        let envelope = match tool {
            ToolName::TagAlert => {
                let request = tag_alert_request(parse_arguments(tool, arguments)?)?;
                execute_tool_safely(tool, alerts::tag_alert, client, request).await
            }
            ToolName::AdjustAlertStatus => {
                let request = status_update_request(parse_arguments(tool, arguments)?)?;
                execute_tool_safely(tool, alerts::adjust_alert_status, client, request).await
            }
            ToolName::GetAlerts => {
                let params: GetAlertsParams = parse_arguments(tool, arguments)?;
                let search = AlertSearch {
                    limit: params.limit,
                    search_text: params.search_text,
                };
                execute_tool_safely(tool, alerts::get_alerts, client, search).await
            }
            ToolName::FindRules => {
                let query = find_rules_query(parse_arguments(tool, arguments)?)?;
                execute_tool_safely(tool, rules::find_rules, client, query).await
            }
            ToolName::GetRuleExceptions => {
                let params: GetRuleExceptionsParams = parse_arguments(tool, arguments)?;
                let rule_id = parse_rule_id(&params.rule_id)?;
                execute_tool_safely(tool, rules::get_rule_exceptions, client, rule_id).await
            }
            ToolName::AddRuleExceptionItems => {
                let request = add_exception_items_request(parse_arguments(tool, arguments)?)?;
                execute_tool_safely(tool, rules::add_rule_exception_items, client, request).await
            }
        };
        Ok(envelope)
    }
}

fn parse_arguments<T: DeserializeOwned>(tool: ToolName, arguments: Value) -> Result<T, ValidationError> {
    serde_json::from_value(arguments).map_err(|error| ValidationError::InvalidArguments {
        tool,
        detail: error.to_string(),
    })
}

fn require_non_empty(tool: ToolName, field: &'static str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { tool, field });
    }
    Ok(trimmed.to_string())
}

fn tag_alert_request(params: TagAlertParams) -> Result<TagAlertRequest, ValidationError> {
    let tool = ToolName::TagAlert;
    let alert_id = require_non_empty(tool, "alert_id", params.alert_id)?;
    if params.tags.is_empty() || params.tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(ValidationError::EmptyField { tool, field: "tags" });
    }
    Ok(TagAlertRequest {
        alert_id,
        tags: params.tags,
    })
}

fn status_update_request(params: AdjustAlertStatusParams) -> Result<StatusUpdateRequest, ValidationError> {
    let status = params
        .new_status
        .parse::<AlertStatus>()
        .map_err(|_| ValidationError::InvalidStatus { value: params.new_status.clone() })?;
    let alert_id = require_non_empty(ToolName::AdjustAlertStatus, "alert_id", params.alert_id)?;
    Ok(StatusUpdateRequest { alert_id, status })
}

fn find_rules_query(params: FindRulesParams) -> Result<FindRulesQuery, ValidationError> {
    if params.page == Some(0) {
        return Err(ValidationError::InvalidPage { tool: ToolName::FindRules });
    }
    Ok(FindRulesQuery {
        filter: params.filter,
        sort_field: params.sort_field,
        sort_order: params.sort_order,
        page: params.page,
        per_page: params.per_page,
    })
}

fn add_exception_items_request(params: AddRuleExceptionItemsParams) -> Result<AddExceptionItemsRequest, ValidationError> {
    let rule_id = parse_rule_id(&params.rule_id)?;
    if params.items.is_empty() {
        return Err(ValidationError::EmptyField {
            tool: ToolName::AddRuleExceptionItems,
            field: "items",
        });
    }
    Ok(AddExceptionItemsRequest {
        rule_id,
        items: params.items,
    })
}

// Rule endpoints address rules by internal UUID, normalized to lowercase hyphenated form.
fn parse_rule_id(raw: &str) -> Result<String, ValidationError> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| ValidationError::InvalidRuleId { value: raw.to_string() })
}

fn schema_for<T: JsonSchema>() -> Arc<JsonObject> {
    match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(Value::Object(map)) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}
