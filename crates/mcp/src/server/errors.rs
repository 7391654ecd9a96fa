//! Structured protocol error helpers.

use chrono::Utc;
use kibana_api::BackendError;
use rmcp::model::ErrorData;
use serde_json::Value;

use crate::server::resolver::{ResolveError, RoutingError};

fn build_error_data(error_code: &str, category: &str, message: &str, context: Value, retryable: bool, suggested_action: &str) -> Value {
    serde_json::json!({
        "error_code": error_code,
        "category": category,
        "message": message,
        "context": context,
        "retryable": retryable,
        "suggested_action": suggested_action,
        "correlation_id": format!("kibana-{}", Utc::now().timestamp_millis()),
    })
}

pub fn invalid_params_error(error_code: &str, message: impl Into<String>, context: Value, suggested_action: &str) -> ErrorData {
    let message = message.into();
    ErrorData::invalid_params(
        message.clone(),
        Some(build_error_data(error_code, "validation", &message, context, false, suggested_action)),
    )
}

pub fn not_found_error(error_code: &str, message: impl Into<String>, context: Value, suggested_action: &str) -> ErrorData {
    let message = message.into();
    ErrorData::resource_not_found(
        message.clone(),
        Some(build_error_data(error_code, "not_found", &message, context, false, suggested_action)),
    )
}

pub fn execution_error(error_code: &str, message: impl Into<String>, context: Value, retryable: bool, suggested_action: &str) -> ErrorData {
    let message = message.into();
    ErrorData::internal_error(
        message.clone(),
        Some(build_error_data(error_code, "execution", &message, context, retryable, suggested_action)),
    )
}

/// Error returned when the caller cancels an in-flight request.
pub fn cancelled_error(operation: &str) -> ErrorData {
    execution_error(
        "REQUEST_CANCELLED",
        "request cancelled",
        serde_json::json!({ "operation": operation }),
        true,
        "Reissue the request if the result is still needed.",
    )
}

/// Convert a resource or prompt resolution failure into protocol error data.
pub fn resolve_error(uri: &str, error: &ResolveError) -> ErrorData {
    match error {
        ResolveError::Routing(routing) => routing_error(uri, routing),
        ResolveError::Backend(backend) => backend_error(uri, backend),
    }
}

pub fn routing_error(uri: &str, error: &RoutingError) -> ErrorData {
    let context = serde_json::json!({ "uri": uri });
    match error {
        RoutingError::UnknownPrompt { .. } => not_found_error(
            "PROMPT_NOT_FOUND",
            error.to_string(),
            context,
            "Call prompts/list to inspect available prompts.",
        ),
        RoutingError::MissingArgument { .. } => invalid_params_error(
            "PROMPT_ARGUMENT_MISSING",
            error.to_string(),
            context,
            "Provide all required prompt arguments and retry.",
        ),
        RoutingError::Malformed { .. } | RoutingError::UnknownScheme { .. } | RoutingError::MissingIdentifier { .. } => {
            invalid_params_error(
                "RESOURCE_URI_INVALID",
                error.to_string(),
                context,
                "Use alert://<alert_id> or prompt://<prompt_name>.",
            )
        }
    }
}

pub fn backend_error(uri: &str, error: &BackendError) -> ErrorData {
    let context = serde_json::json!({ "uri": uri });
    match error {
        BackendError::NotFound(_) => not_found_error(
            "RESOURCE_NOT_FOUND",
            error.to_string(),
            context,
            "Verify the identifier with get_alerts and retry.",
        ),
        BackendError::Connectivity(_) | BackendError::Timeout(_) => execution_error(
            "BACKEND_UNAVAILABLE",
            error.to_string(),
            context,
            true,
            "Check that Kibana is reachable and retry.",
        ),
        BackendError::Rejected { status, .. } => execution_error(
            "BACKEND_REJECTED",
            error.to_string(),
            context,
            *status >= 500,
            "Check the credentials and privileges configured for Kibana.",
        ),
        BackendError::MalformedResponse(_) => execution_error(
            "BACKEND_MALFORMED_RESPONSE",
            error.to_string(),
            context,
            false,
            "Verify KIBANA_URL points at a Kibana instance.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorCode;

    #[test]
    fn routing_errors_map_to_protocol_codes() {
        let unknown = routing_error(
            "weird://x",
            &RoutingError::UnknownScheme {
                scheme: "weird".to_string(),
                uri: "weird://x".to_string(),
            },
        );
        assert_eq!(unknown.code, ErrorCode::INVALID_PARAMS);

        let missing = routing_error("prompt://nope", &RoutingError::UnknownPrompt { name: "nope".to_string() });
        assert_eq!(missing.code, ErrorCode::RESOURCE_NOT_FOUND);
    }

    #[test]
    fn backend_errors_carry_retry_hints() {
        let error = backend_error("alert://a1", &BackendError::Timeout("30s elapsed".to_string()));
        assert_eq!(error.code, ErrorCode::INTERNAL_ERROR);
        let data = error.data.expect("structured data");
        assert_eq!(data["retryable"], true);
        assert_eq!(data["context"]["uri"], "alert://a1");
        assert!(data["correlation_id"].as_str().is_some_and(|id| id.starts_with("kibana-")));
    }
}
