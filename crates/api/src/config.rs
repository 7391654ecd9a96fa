//! Kibana connection settings and credential resolution.
//!
//! Resolution happens once per process: raw settings (usually sourced from the
//! environment) are turned into a [`ClientConfig`] that fixes the base URL, the
//! default header set, and the authentication method. No network activity takes
//! place here.

use std::env;
use std::time::Duration;

use reqwest::Url;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tracing::info;

pub const KIBANA_URL_ENV: &str = "KIBANA_URL";
pub const KIBANA_API_KEY_ENV: &str = "KIBANA_API_KEY";
pub const KIBANA_USERNAME_ENV: &str = "KIBANA_USERNAME";
pub const KIBANA_PASSWORD_ENV: &str = "KIBANA_PASSWORD";
pub const KIBANA_TIMEOUT_SECS_ENV: &str = "KIBANA_TIMEOUT_SECS";
pub const KIBANA_VERIFY_TLS_ENV: &str = "KIBANA_VERIFY_TLS";

/// Request timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authorization scheme token Kibana expects in front of an encoded API key.
const API_KEY_SCHEME: &str = "ApiKey";

/// Anti-forgery header required by Kibana on every mutating request.
pub const KBN_XSRF_HEADER: &str = "kbn-xsrf";

/// Errors that prevent a client from being configured.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing base URL: set KIBANA_URL")]
    MissingBaseUrl,

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("no credentials: set KIBANA_API_KEY or both KIBANA_USERNAME and KIBANA_PASSWORD")]
    NoCredentials,

    #[error("invalid value for {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// Raw connection settings before validation.
///
/// Empty or whitespace-only strings are treated the same as unset values.
#[derive(Debug, Clone)]
pub struct KibanaSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl Default for KibanaSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            verify_tls: true,
        }
    }
}

impl KibanaSettings {
    /// Read settings from the process environment.
    ///
    /// Only the optional tuning variables can fail here; missing connection
    /// values are reported later by [`ClientConfig::resolve`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let timeout = match read_env(KIBANA_TIMEOUT_SECS_ENV) {
            Some(raw) => {
                let seconds = raw.parse::<u64>().map_err(|error| ConfigError::InvalidSetting {
                    name: KIBANA_TIMEOUT_SECS_ENV,
                    reason: error.to_string(),
                })?;
                if seconds == 0 {
                    return Err(ConfigError::InvalidSetting {
                        name: KIBANA_TIMEOUT_SECS_ENV,
                        reason: "timeout must be at least one second".to_string(),
                    });
                }
                Duration::from_secs(seconds)
            }
            None => DEFAULT_TIMEOUT,
        };
        let verify_tls = match read_env(KIBANA_VERIFY_TLS_ENV) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidSetting {
                name: KIBANA_VERIFY_TLS_ENV,
                reason: format!("expected true/false, got '{raw}'"),
            })?,
            None => true,
        };

        Ok(Self {
            base_url: read_env(KIBANA_URL_ENV),
            api_key: read_env(KIBANA_API_KEY_ENV),
            username: read_env(KIBANA_USERNAME_ENV),
            password: read_env(KIBANA_PASSWORD_ENV),
            timeout,
            verify_tls,
        })
    }
}

/// How outbound requests authenticate against Kibana.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Basic,
}

impl AuthMethod {
    pub fn label(&self) -> &'static str {
        match self {
            AuthMethod::ApiKey => "API key",
            AuthMethod::Basic => "username/password",
        }
    }
}

/// Username/password pair used for transport-level basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated, immutable description of how to reach Kibana.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub headers: HeaderMap,
    pub basic_auth: Option<BasicCredentials>,
    pub auth_method: AuthMethod,
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl ClientConfig {
    /// Resolve settings into a client configuration.
    ///
    /// Authentication priority:
    /// 1. API key, sent as `Authorization: ApiKey <key>`
    /// 2. username and password, sent as basic auth
    ///
    /// When both are present the API key wins and no basic-auth pair is kept.
    pub fn resolve(settings: &KibanaSettings) -> Result<Self, ConfigError> {
        let raw_base_url = non_empty(settings.base_url.as_deref()).ok_or(ConfigError::MissingBaseUrl)?;
        let base_url = normalize_base_url(raw_base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static(KBN_XSRF_HEADER), HeaderValue::from_static("true"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (auth_method, basic_auth) = if let Some(api_key) = settings.api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            let mut value = HeaderValue::from_str(&authorization_value(api_key))
                .map_err(|_| ConfigError::InvalidHeader { name: "authorization" })?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
            (AuthMethod::ApiKey, None)
        } else if let (Some(username), Some(password)) = (non_empty(settings.username.as_deref()), non_empty(settings.password.as_deref())) {
            let credentials = BasicCredentials {
                username: username.to_string(),
                password: password.to_string(),
            };
            (AuthMethod::Basic, Some(credentials))
        } else {
            return Err(ConfigError::NoCredentials);
        };

        info!(base_url = %base_url, auth = auth_method.label(), "resolved Kibana client configuration");

        Ok(Self {
            base_url,
            headers,
            basic_auth,
            auth_method,
            timeout: settings.timeout,
            verify_tls: settings.verify_tls,
        })
    }
}

/// Build the `Authorization` header value for an API key.
///
/// A value that already carries the `ApiKey ` prefix is kept verbatim; anything
/// else is trimmed and prefixed.
pub fn authorization_value(api_key: &str) -> String {
    if api_key.trim().starts_with(&format!("{API_KEY_SCHEME} ")) {
        api_key.to_string()
    } else {
        format!("{API_KEY_SCHEME} {}", api_key.trim())
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|error| ConfigError::InvalidBaseUrl {
        url: trimmed.to_string(),
        reason: error.to_string(),
    })?;
    if parsed.host_str().is_none() {
        return Err(ConfigError::InvalidBaseUrl {
            url: trimmed.to_string(),
            reason: "URL must include a host".to_string(),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(api_key: Option<&str>, username: Option<&str>, password: Option<&str>) -> KibanaSettings {
        KibanaSettings {
            base_url: Some("http://localhost:5601/".to_string()),
            api_key: api_key.map(ToString::to_string),
            username: username.map(ToString::to_string),
            password: password.map(ToString::to_string),
            ..KibanaSettings::default()
        }
    }

    #[test]
    fn api_key_only_uses_authorization_header() {
        let config = ClientConfig::resolve(&settings(Some("abc123"), None, None)).expect("api key config");
        assert_eq!(config.auth_method, AuthMethod::ApiKey);
        assert!(config.basic_auth.is_none());
        assert_eq!(config.headers.get(header::AUTHORIZATION).unwrap(), "ApiKey abc123");
        assert_eq!(config.headers.get(KBN_XSRF_HEADER).unwrap(), "true");
        assert_eq!(config.headers.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(config.base_url, "http://localhost:5601");
    }

    #[test]
    fn basic_only_uses_credentials_pair() {
        let config = ClientConfig::resolve(&settings(None, Some("elastic"), Some("changeme"))).expect("basic config");
        assert_eq!(config.auth_method, AuthMethod::Basic);
        assert!(config.headers.get(header::AUTHORIZATION).is_none());
        let credentials = config.basic_auth.expect("basic credentials");
        assert_eq!(credentials.username, "elastic");
        assert_eq!(credentials.password, "changeme");
    }

    #[test]
    fn api_key_takes_precedence_over_basic() {
        let config = ClientConfig::resolve(&settings(Some("abc123"), Some("elastic"), Some("changeme"))).expect("combined config");
        assert_eq!(config.auth_method, AuthMethod::ApiKey);
        assert!(config.basic_auth.is_none());
        assert_eq!(config.headers.get(header::AUTHORIZATION).unwrap(), "ApiKey abc123");
    }

    #[test]
    fn missing_credentials_is_fatal() {
        let error = ClientConfig::resolve(&settings(None, None, None)).expect_err("no credentials");
        assert!(matches!(error, ConfigError::NoCredentials));
        assert!(error.to_string().starts_with("no credentials"));
    }

    #[test]
    fn username_without_password_is_not_enough() {
        let error = ClientConfig::resolve(&settings(None, Some("elastic"), Some("  "))).expect_err("incomplete basic auth");
        assert!(matches!(error, ConfigError::NoCredentials));
    }

    #[test]
    fn missing_base_url_is_fatal() {
        let mut missing = settings(Some("abc"), None, None);
        missing.base_url = Some("   ".to_string());
        let error = ClientConfig::resolve(&missing).expect_err("missing base url");
        assert!(matches!(error, ConfigError::MissingBaseUrl));
        assert!(error.to_string().starts_with("missing base URL"));
    }

    #[test]
    fn unparseable_base_url_is_rejected() {
        let mut invalid = settings(Some("abc"), None, None);
        invalid.base_url = Some("not a url".to_string());
        assert!(matches!(ClientConfig::resolve(&invalid), Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn authorization_value_preserves_existing_prefix() {
        assert_eq!(authorization_value("ApiKey abc=="), "ApiKey abc==");
        assert_eq!(authorization_value("  ApiKey abc== "), "  ApiKey abc== ");
        assert_eq!(authorization_value("  abc==  "), "ApiKey abc==");
    }

    #[test]
    fn from_env_reads_connection_and_tuning_values() {
        temp_env::with_vars(
            [
                (KIBANA_URL_ENV, Some("https://kibana.example.com")),
                (KIBANA_API_KEY_ENV, Some("key")),
                (KIBANA_USERNAME_ENV, None),
                (KIBANA_PASSWORD_ENV, Some("")),
                (KIBANA_TIMEOUT_SECS_ENV, Some("5")),
                (KIBANA_VERIFY_TLS_ENV, Some("false")),
            ],
            || {
                let settings = KibanaSettings::from_env().expect("settings from env");
                assert_eq!(settings.base_url.as_deref(), Some("https://kibana.example.com"));
                assert_eq!(settings.api_key.as_deref(), Some("key"));
                assert!(settings.username.is_none());
                assert!(settings.password.is_none());
                assert_eq!(settings.timeout, Duration::from_secs(5));
                assert!(!settings.verify_tls);
            },
        );
    }

    #[test]
    fn from_env_rejects_bad_timeout() {
        temp_env::with_var(KIBANA_TIMEOUT_SECS_ENV, Some("soon"), || {
            let error = KibanaSettings::from_env().expect_err("bad timeout");
            assert!(matches!(error, ConfigError::InvalidSetting { name: KIBANA_TIMEOUT_SECS_ENV, .. }));
        });
    }

    #[test]
    fn from_env_rejects_zero_timeout() {
        temp_env::with_var(KIBANA_TIMEOUT_SECS_ENV, Some("0"), || {
            let error = KibanaSettings::from_env().expect_err("zero timeout");
            assert!(matches!(
                error,
                ConfigError::InvalidSetting { name: KIBANA_TIMEOUT_SECS_ENV, ref reason } if reason.contains("at least one second")
            ));
        });
    }
}
