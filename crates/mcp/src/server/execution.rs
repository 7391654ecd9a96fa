//! Safe execution of backend calls on behalf of tools.
//!
//! Every tool reaches Kibana through [`execute_tool_safely`], which turns any
//! [`BackendError`] into a single diagnostic text item so a failing call never
//! escapes as a protocol error.

use std::future::Future;

use kibana_api::{BackendError, KibanaClient};
use rmcp::model::{CallToolResult, Content};
use tracing::{info, warn};

use crate::server::registry::{ToolName, ValidationError};

/// Uniform tool result: an ordered list of text items.
///
/// Success and failure share the same shape; a failure is a single item
/// describing what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    items: Vec<String>,
}

impl ResultEnvelope {
    pub fn text(text: impl Into<String>) -> Self {
        Self { items: vec![text.into()] }
    }

    /// Render a backend failure for `tool`.
    pub fn failure(tool: ToolName, error: &BackendError) -> Self {
        Self::text(format!(
            "Error executing tool '{tool}' [{}]: {error}",
            failure_class(error)
        ))
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Concatenated text of all items.
    pub fn joined(&self) -> String {
        self.items.join("\n")
    }
}

impl From<ValidationError> for ResultEnvelope {
    fn from(error: ValidationError) -> Self {
        Self::text(error.to_string())
    }
}

impl From<ResultEnvelope> for CallToolResult {
    fn from(envelope: ResultEnvelope) -> Self {
        CallToolResult::success(envelope.items.into_iter().map(Content::text).collect())
    }
}

/// Short label for a backend failure, shown in envelope diagnostics.
pub fn failure_class(error: &BackendError) -> &'static str {
    match error {
        BackendError::Connectivity(_) => "connectivity",
        BackendError::Timeout(_) => "timeout",
        BackendError::Rejected { .. } => "backend-rejected",
        BackendError::MalformedResponse(_) => "malformed-response",
        BackendError::NotFound(_) => "not-found",
    }
}

/// Invoke `call(client, args)` and normalize its outcome into an envelope.
pub async fn execute_tool_safely<'a, A, F, Fut>(tool: ToolName, call: F, client: &'a KibanaClient, args: A) -> ResultEnvelope
where
    F: FnOnce(&'a KibanaClient, A) -> Fut,
    Fut: Future<Output = Result<String, BackendError>> + 'a,
{
    info!(tool = %tool, "executing tool");
    match call(client, args).await {
        Ok(text) => ResultEnvelope::text(text),
        Err(error) => {
            warn!(tool = %tool, class = failure_class(&error), %error, "tool failed");
            ResultEnvelope::failure(tool, &error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kibana_api::KibanaSettings;

    fn client() -> KibanaClient {
        KibanaClient::from_settings(&KibanaSettings {
            base_url: Some("http://127.0.0.1:9".to_string()),
            api_key: Some("key".to_string()),
            ..KibanaSettings::default()
        })
        .expect("client")
    }

    async fn succeed(_client: &KibanaClient, name: String) -> Result<String, BackendError> {
        Ok(format!("hello {name}"))
    }

    async fn reject(_client: &KibanaClient, _args: ()) -> Result<String, BackendError> {
        Err(BackendError::rejected(403, "forbidden"))
    }

    #[tokio::test]
    async fn success_is_a_single_text_item() {
        let client = client();
        let envelope = execute_tool_safely(ToolName::GetAlerts, succeed, &client, "a1".to_string()).await;
        assert_eq!(envelope.items(), ["hello a1".to_string()]);
    }

    #[tokio::test]
    async fn failures_name_the_tool_and_class() {
        let client = client();
        let envelope = execute_tool_safely(ToolName::TagAlert, reject, &client, ()).await;
        assert_eq!(envelope.items().len(), 1);
        assert_eq!(
            envelope.joined(),
            "Error executing tool 'tag_alert' [backend-rejected]: Kibana API returned HTTP 403: forbidden"
        );
    }

    #[test]
    fn envelopes_convert_to_text_content() {
        let result = CallToolResult::from(ResultEnvelope::text("done"));
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.content[0].as_text().map(|text| text.text.as_str()), Some("done"));
    }
}
