//! Failure taxonomy for calls against the Kibana API.

use thiserror::Error;

/// Upper bound on how much of a rejected response body is retained.
const MAX_BODY_CHARS: usize = 512;

/// Errors returned by backend call functions.
///
/// Every variant is a normal, recoverable outcome for the caller; none of them
/// indicate a broken client.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not reach Kibana: {0}")]
    Connectivity(String),

    #[error("request to Kibana timed out: {0}")]
    Timeout(String),

    #[error("Kibana API returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response payload from Kibana: {0}")]
    MalformedResponse(String),

    #[error("{0} was not found")]
    NotFound(String),
}

impl BackendError {
    /// Build a rejection, truncating the body so diagnostics stay readable.
    pub fn rejected(status: u16, body: &str) -> Self {
        let body = body.trim();
        let body = if body.chars().count() > MAX_BODY_CHARS {
            let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
            format!("{truncated}...")
        } else {
            body.to_string()
        };
        BackendError::Rejected { status, body }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return BackendError::Timeout(error.to_string());
        }
        if error.is_decode() {
            return BackendError::MalformedResponse(error.to_string());
        }
        if let Some(status) = error.status() {
            return BackendError::rejected(status.as_u16(), &error.to_string());
        }
        BackendError::Connectivity(error.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(error: serde_json::Error) -> Self {
        BackendError::MalformedResponse(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_truncates_long_bodies() {
        let body = "x".repeat(MAX_BODY_CHARS + 40);
        let BackendError::Rejected { status, body } = BackendError::rejected(502, &body) else {
            panic!("expected rejection");
        };
        assert_eq!(status, 502);
        assert_eq!(body.chars().count(), MAX_BODY_CHARS + 3);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn json_errors_are_malformed_responses() {
        let error = serde_json::from_str::<serde_json::Value>("{not json").expect_err("invalid json");
        assert!(matches!(BackendError::from(error), BackendError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn refused_connections_are_connectivity_failures() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let address = listener.local_addr().expect("local addr");
        drop(listener);

        let error = reqwest::Client::new()
            .get(format!("http://{address}/"))
            .send()
            .await
            .expect_err("connection should be refused");
        assert!(matches!(BackendError::from(error), BackendError::Connectivity(_)));
    }
}
