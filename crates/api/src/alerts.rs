//! Detection-engine alert (signal) operations.
//!
//! Each public function issues exactly one request against Kibana and renders
//! the outcome as text for the caller.

use std::fmt;
use std::str::FromStr;

use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::info;

use crate::{BackendError, KibanaClient};

pub const SIGNALS_SEARCH_PATH: &str = "/api/detection_engine/signals/search";
pub const SIGNALS_STATUS_PATH: &str = "/api/detection_engine/signals/status";
pub const SIGNALS_TAGS_PATH: &str = "/api/detection_engine/signals/tags";

/// Search text that disables filtering.
pub const MATCH_ALL: &str = "*";
pub const DEFAULT_ALERT_LIMIT: u32 = 20;

/// Workflow status of a security alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Closed,
}

impl AlertStatus {
    pub const ALL: [AlertStatus; 3] = [AlertStatus::Open, AlertStatus::Acknowledged, AlertStatus::Closed];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown alert status '{0}'")]
pub struct UnknownAlertStatus(pub String);

impl FromStr for AlertStatus {
    type Err = UnknownAlertStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AlertStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownAlertStatus(value.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct TagAlertRequest {
    pub alert_id: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StatusUpdateRequest {
    pub alert_id: String,
    pub status: AlertStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertSearch {
    pub limit: u32,
    pub search_text: String,
}

impl Default for AlertSearch {
    fn default() -> Self {
        Self {
            limit: DEFAULT_ALERT_LIMIT,
            search_text: MATCH_ALL.to_string(),
        }
    }
}

/// Add tags to a single alert.
pub async fn tag_alert(client: &KibanaClient, request: TagAlertRequest) -> Result<String, BackendError> {
    let payload = json!({
        "ids": [request.alert_id],
        "tags": {
            "tags_to_add": request.tags,
            "tags_to_remove": [],
        },
    });
    let response: UpdateByQueryResponse = client
        .send_json(client.request(Method::POST, SIGNALS_TAGS_PATH).json(&payload))
        .await?;
    info!(alert_id = %request.alert_id, updated = response.updated, "tagged alert");

    Ok(format!(
        "Added tags [{}] to alert {}.\n{}",
        request.tags.join(", "),
        request.alert_id,
        response.describe()
    ))
}

/// Change the workflow status of a single alert.
pub async fn adjust_alert_status(client: &KibanaClient, request: StatusUpdateRequest) -> Result<String, BackendError> {
    let payload = json!({
        "signal_ids": [request.alert_id],
        "status": request.status,
    });
    let response: UpdateByQueryResponse = client
        .send_json(client.request(Method::POST, SIGNALS_STATUS_PATH).json(&payload))
        .await?;
    info!(alert_id = %request.alert_id, status = %request.status, updated = response.updated, "changed alert status");

    Ok(format!(
        "Changed status of alert {} to {}.\n{}",
        request.alert_id,
        request.status,
        response.describe()
    ))
}

/// Search recent alerts, newest first, rendering at most `limit` of them.
///
/// Filtering is delegated entirely to Kibana; hits are only capped, never
/// re-filtered.
pub async fn get_alerts(client: &KibanaClient, search: AlertSearch) -> Result<String, BackendError> {
    let response: SearchResponse = client
        .send_json(client.request(Method::POST, SIGNALS_SEARCH_PATH).json(&search_body(&search)))
        .await?;

    let total = response.hits.total_count();
    let alerts = response
        .hits
        .hits
        .iter()
        .take(search.limit as usize)
        .map(AlertSummary::from_hit)
        .collect::<Vec<AlertSummary>>();
    info!(search_text = %search.search_text, returned = alerts.len(), "fetched alerts");

    let rendered = json!({
        "search_text": search.search_text,
        "total": total.unwrap_or(alerts.len() as u64),
        "returned": alerts.len(),
        "alerts": alerts,
    });
    Ok(serde_json::to_string_pretty(&rendered)?)
}

/// Fetch a single alert document by id.
pub async fn get_alert(client: &KibanaClient, alert_id: &str) -> Result<String, BackendError> {
    let payload = json!({
        "query": { "ids": { "values": [alert_id] } },
        "size": 1,
    });
    let response: SearchResponse = client
        .send_json(client.request(Method::POST, SIGNALS_SEARCH_PATH).json(&payload))
        .await?;

    let Some(hit) = response.hits.hits.into_iter().next() else {
        return Err(BackendError::NotFound(format!("alert '{alert_id}'")));
    };
    let rendered = json!({
        "id": hit.id,
        "index": hit.index,
        "summary": AlertSummary::from_hit(&hit),
        "source": hit.source,
    });
    Ok(serde_json::to_string_pretty(&rendered)?)
}

/// Build the signals search payload for a query.
pub fn search_body(search: &AlertSearch) -> Value {
    let text = search.search_text.trim();
    let query = if text.is_empty() || text == MATCH_ALL {
        json!({ "match_all": {} })
    } else {
        json!({ "query_string": { "query": text } })
    };
    json!({
        "query": query,
        "size": search.limit,
        "sort": [{ "@timestamp": { "order": "desc" } }],
    })
}

/// Body returned by Kibana's update-by-query style endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpdateByQueryResponse {
    updated: u64,
    total: u64,
    version_conflicts: u64,
    failures: Vec<Value>,
}

impl UpdateByQueryResponse {
    fn describe(&self) -> String {
        let mut text = format!("Kibana updated {} of {} matching document(s).", self.updated, self.total);
        if self.version_conflicts > 0 {
            text.push_str(&format!(" Version conflicts: {}.", self.version_conflicts));
        }
        if !self.failures.is_empty() {
            text.push_str(&format!(" Failures: {}.", self.failures.len()));
        }
        text
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    total: Option<Value>,
    hits: Vec<SearchHit>,
}

impl SearchHits {
    // Elasticsearch reports either `{ "value": n }` or a bare number.
    fn total_count(&self) -> Option<u64> {
        match self.total.as_ref()? {
            Value::Number(number) => number.as_u64(),
            Value::Object(object) => object.get("value").and_then(Value::as_u64),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_index", default)]
    index: Option<String>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

/// Compact view of an alert used in listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl AlertSummary {
    fn from_hit(hit: &SearchHit) -> Self {
        let text = |path: &str| source_field(&hit.source, path).and_then(Value::as_str).map(ToString::to_string);
        let tags = source_field(&hit.source, "kibana.alert.workflow_tags")
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_str).map(ToString::to_string).collect())
            .unwrap_or_default();

        Self {
            id: hit.id.clone(),
            timestamp: text("@timestamp"),
            rule_name: text("kibana.alert.rule.name"),
            severity: text("kibana.alert.severity"),
            risk_score: source_field(&hit.source, "kibana.alert.risk_score").and_then(Value::as_f64),
            status: text("kibana.alert.workflow_status"),
            reason: text("kibana.alert.reason"),
            host: text("host.name"),
            tags,
        }
    }
}

/// Look up a dotted field in an alert document.
///
/// Alert indices store most fields under flat dotted keys, but ECS fields may
/// also appear as nested objects, so both layouts are accepted.
fn source_field<'a>(source: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = source.get(path) {
        return Some(value);
    }
    let mut segments = path.split('.');
    let mut current = source.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}
