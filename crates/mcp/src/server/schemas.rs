use kibana_api::alerts::{DEFAULT_ALERT_LIMIT, MATCH_ALL};
use kibana_api::rules::{ExceptionItem, SortField, SortOrder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for tagging one alert.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TagAlertParams {
    #[schemars(description = "Identifier of the alert document to tag.")]
    pub alert_id: String,
    #[schemars(description = "Tags to add to the alert. Existing tags are kept.")]
    pub tags: Vec<String>,
}

/// Parameters for changing an alert's workflow status.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdjustAlertStatusParams {
    #[schemars(description = "Identifier of the alert document to update.")]
    pub alert_id: String,
    /// Kept as free text so unknown values produce a readable message instead of a schema error.
    #[schemars(description = "New workflow status: one of 'open', 'acknowledged', 'closed'.")]
    pub new_status: String,
}

/// Parameters for listing recent alerts.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GetAlertsParams {
    #[serde(default = "default_limit")]
    #[schemars(description = "Maximum number of alerts to return (default 20).")]
    pub limit: u32,
    #[serde(default = "default_search_text")]
    #[schemars(description = "Query string used to filter alerts, for example 'host.name:web-01'. '*' returns all alerts.")]
    pub search_text: String,
}

impl Default for GetAlertsParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            search_text: default_search_text(),
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_ALERT_LIMIT
}

fn default_search_text() -> String {
    MATCH_ALL.to_string()
}

/// Parameters for searching detection rules.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FindRulesParams {
    #[schemars(
        description = "KQL filter over rule attributes. Field names must be prefixed with 'alert.attributes.', for example 'alert.attributes.name:\"My Rule\"'."
    )]
    pub filter: Option<String>,
    #[schemars(description = "Field to sort results by.")]
    pub sort_field: Option<SortField>,
    #[schemars(description = "Sort direction: 'asc' or 'desc'.")]
    pub sort_order: Option<SortOrder>,
    #[schemars(description = "Page number, starting at 1.")]
    pub page: Option<u32>,
    #[schemars(description = "Number of rules per page.")]
    pub per_page: Option<u32>,
}

/// Parameters for listing a rule's exception items.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GetRuleExceptionsParams {
    #[schemars(description = "Internal id (UUID) of the detection rule.")]
    pub rule_id: String,
}

/// Parameters for adding exception items to a rule.
#[derive(JsonSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AddRuleExceptionItemsParams {
    #[schemars(description = "Internal id (UUID) of the detection rule, not its rule_id signature.")]
    pub rule_id: String,
    #[schemars(description = "Exception items to create. 'list_id' is ignored; the rule's default list is used.")]
    pub items: Vec<ExceptionItem>,
}
