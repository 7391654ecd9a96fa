//! Kibana API client utilities.
//!
//! This crate provides a lightweight client for the Kibana Security APIs used by
//! the MCP adapter. It focuses on:
//!
//! - Resolving credentials (API key or basic auth) into a [`ClientConfig`]
//! - Constructing one shared HTTP client with Kibana's required headers
//! - One function per backend operation (see [`alerts`] and [`rules`]), each
//!   performing a single request and returning a human-readable description
//! - Classifying failures into [`BackendError`]
//!
//! The primary entry point is [`KibanaClient`]. Create an instance via
//! [`KibanaClient::from_env`] once at startup and share it by reference.
//!
//! # Example
//!
//! ```ignore
//! use kibana_api::{KibanaClient, alerts::{self, AlertSearch}};
//!
//! async fn recent() -> anyhow::Result<String> {
//!     let client = KibanaClient::from_env()?;
//!     Ok(alerts::get_alerts(&client, AlertSearch::default()).await?)
//! }
//! ```

pub mod alerts;
pub mod config;
pub mod error;
pub mod rules;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

pub use config::{AuthMethod, BasicCredentials, ClientConfig, ConfigError, KibanaSettings};
pub use error::BackendError;

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for Kibana access.
///
/// All fields are fixed at construction; the client is safe to share across
/// concurrent requests.
pub struct KibanaClient {
    config: ClientConfig,
    http: Client,
}

impl KibanaClient {
    /// Build the HTTP client described by `config`.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .default_headers(config.headers.clone())
            .timeout(config.timeout);
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;
        Ok(Self { config, http })
    }

    /// Resolve settings and build the client in one step.
    pub fn from_settings(settings: &KibanaSettings) -> Result<Self, ConfigError> {
        Self::new(ClientConfig::resolve(settings)?)
    }

    /// Construct a [`KibanaClient`] from `KIBANA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_settings(&KibanaSettings::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Build a `reqwest::RequestBuilder` for a method and API-relative path.
    ///
    /// Basic auth is attached here when configured; header-based auth travels
    /// with the client's default headers.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        debug!(%method, %url, "building request");

        let builder = self.http.request(method, url);
        match &self.config.basic_auth {
            Some(credentials) => builder.basic_auth(&credentials.username, Some(&credentials.password)),
            None => builder,
        }
    }

    /// Send a request and decode a successful JSON response.
    ///
    /// Non-2xx statuses become [`BackendError::Rejected`]; bodies that are not
    /// valid JSON for `T` become [`BackendError::MalformedResponse`].
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(status = status.as_u16(), bytes = text.len(), "received response");

        if !status.is_success() {
            return Err(BackendError::rejected(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_client(base_url: &str) -> KibanaClient {
        KibanaClient::from_settings(&KibanaSettings {
            base_url: Some(base_url.to_string()),
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            ..KibanaSettings::default()
        })
        .expect("client")
    }

    #[test]
    fn request_joins_base_url_and_path() {
        let client = basic_client("http://localhost:5601/");
        let request = client.request(Method::GET, "/api/status").build().expect("request");
        assert_eq!(request.url().as_str(), "http://localhost:5601/api/status");
        assert!(request.headers().contains_key(reqwest::header::AUTHORIZATION));
    }

    #[tokio::test]
    async fn send_json_reports_rejections_with_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/status")
            .match_header("kbn-xsrf", "true")
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client = basic_client(&server.url());
        let error = client
            .send_json::<Value>(client.request(Method::GET, "/api/status"))
            .await
            .expect_err("403 should be rejected");

        mock.assert_async().await;
        assert!(matches!(error, BackendError::Rejected { status: 403, ref body } if body == "forbidden"));
    }

    #[tokio::test]
    async fn send_json_flags_non_json_payloads() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/status")
            .with_status(200)
            .with_body("<html>login</html>")
            .create_async()
            .await;

        let client = basic_client(&server.url());
        let error = client
            .send_json::<Value>(client.request(Method::GET, "/api/status"))
            .await
            .expect_err("html is not json");
        assert!(matches!(error, BackendError::MalformedResponse(_)));
    }
}
