//! Detection rule lookup and rule exception management.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::{BackendError, KibanaClient};

pub const FIND_RULES_PATH: &str = "/api/detection_engine/rules/_find";

/// Header pinning the versioned rule exceptions API.
pub const API_VERSION_HEADER: &str = "Elastic-Api-Version";
pub const EXCEPTIONS_API_VERSION: &str = "2023-10-31";

// Unreserved characters stay readable in the path.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Fields accepted by the rule search `sort_field` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SortField {
    #[serde(rename = "created_at")]
    CreatedAt,
    #[serde(rename = "createdAt")]
    CreatedAtCamel,
    #[serde(rename = "enabled")]
    Enabled,
    #[serde(rename = "execution_summary.last_execution.date")]
    LastExecutionDate,
    #[serde(rename = "execution_summary.last_execution.metrics.execution_gap_duration_s")]
    ExecutionGap,
    #[serde(rename = "execution_summary.last_execution.metrics.total_indexing_duration_ms")]
    TotalIndexingDuration,
    #[serde(rename = "execution_summary.last_execution.metrics.total_search_duration_ms")]
    TotalSearchDuration,
    #[serde(rename = "execution_summary.last_execution.status")]
    ExecutionStatus,
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "risk_score")]
    RiskScore,
    #[serde(rename = "riskScore")]
    RiskScoreCamel,
    #[serde(rename = "severity")]
    Severity,
    #[serde(rename = "updated_at")]
    UpdatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAtCamel,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::CreatedAtCamel => "createdAt",
            SortField::Enabled => "enabled",
            SortField::LastExecutionDate => "execution_summary.last_execution.date",
            SortField::ExecutionGap => "execution_summary.last_execution.metrics.execution_gap_duration_s",
            SortField::TotalIndexingDuration => "execution_summary.last_execution.metrics.total_indexing_duration_ms",
            SortField::TotalSearchDuration => "execution_summary.last_execution.metrics.total_search_duration_ms",
            SortField::ExecutionStatus => "execution_summary.last_execution.status",
            SortField::Name => "name",
            SortField::RiskScore => "risk_score",
            SortField::RiskScoreCamel => "riskScore",
            SortField::Severity => "severity",
            SortField::UpdatedAt => "updated_at",
            SortField::UpdatedAtCamel => "updatedAt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Query parameters for the rule search endpoint. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindRulesQuery {
    pub filter: Option<String>,
    pub sort_field: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl FindRulesQuery {
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = self.filter.as_deref().filter(|filter| !filter.trim().is_empty()) {
            pairs.push(("filter", filter.to_string()));
        }
        if let Some(field) = self.sort_field {
            pairs.push(("sort_field", field.as_str().to_string()));
        }
        if let Some(order) = self.sort_order {
            pairs.push(("sort_order", order.as_str().to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(per_page) = self.per_page {
            pairs.push(("per_page", per_page.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryOperator {
    #[default]
    Included,
    Excluded,
}

/// One condition of an exception item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExceptionEntry {
    /// Field equals a single value.
    Match {
        field: String,
        #[serde(default)]
        operator: EntryOperator,
        value: String,
    },
    /// Field equals any of the listed values.
    MatchAny {
        field: String,
        #[serde(default)]
        operator: EntryOperator,
        value: Vec<String>,
    },
    /// Field is present on the document.
    Exists {
        field: String,
        #[serde(default)]
        operator: EntryOperator,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionItemType {
    #[default]
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Windows,
    Linux,
    Macos,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceType {
    #[default]
    Single,
    Agnostic,
}

/// An exception item attached to a rule's default exception list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExceptionItem {
    pub name: String,
    #[serde(rename = "type", default)]
    pub item_type: ExceptionItemType,
    pub entries: Vec<ExceptionEntry>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// Accepted on input but never sent: the list is implied by the rule.
    #[serde(default, skip_serializing)]
    pub list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_types: Option<Vec<OsType>>,
    #[serde(default)]
    pub namespace_type: NamespaceType,
}

#[derive(Debug, Clone)]
pub struct AddExceptionItemsRequest {
    /// Internal rule id (UUID), not the user-facing `rule_id` signature.
    pub rule_id: String,
    pub items: Vec<ExceptionItem>,
}

pub fn rule_exceptions_path(rule_id: &str) -> String {
    format!(
        "/api/detection_engine/rules/{}/exceptions",
        utf8_percent_encode(rule_id, PATH_SEGMENT)
    )
}

/// Search detection rules.
pub async fn find_rules(client: &KibanaClient, query: FindRulesQuery) -> Result<String, BackendError> {
    let response: Value = client
        .send_json(client.request(Method::GET, FIND_RULES_PATH).query(&query.to_pairs()))
        .await?;
    info!(filter = ?query.filter, total = ?response.get("total"), "found rules");
    Ok(serde_json::to_string_pretty(&response)?)
}

/// List the exception items attached to a rule.
pub async fn get_rule_exceptions(client: &KibanaClient, rule_id: String) -> Result<String, BackendError> {
    let path = rule_exceptions_path(&rule_id);
    let response: Value = match client.send_json(client.request(Method::GET, &path)).await {
        Err(BackendError::Rejected { status: 404, .. }) => {
            return Err(BackendError::NotFound(format!("rule '{rule_id}' or its exception list")));
        }
        other => other?,
    };
    info!(%rule_id, "fetched rule exceptions");
    Ok(serde_json::to_string_pretty(&response)?)
}

/// Create exception items on a rule's default exception list.
pub async fn add_rule_exception_items(
    client: &KibanaClient,
    request: AddExceptionItemsRequest,
) -> Result<String, BackendError> {
    let path = rule_exceptions_path(&request.rule_id);
    let payload = json!({ "items": request.items });
    let response: Value = client
        .send_json(
            client
                .request(Method::POST, &path)
                .header(API_VERSION_HEADER, EXCEPTIONS_API_VERSION)
                .json(&payload),
        )
        .await?;
    info!(rule_id = %request.rule_id, count = request.items.len(), "added rule exception items");

    Ok(format!(
        "Added {} exception item(s) to rule {}.\n{}",
        request.items.len(),
        request.rule_id,
        serde_json::to_string_pretty(&response)?
    ))
}
