//! URI routing for resources and prompts.
//!
//! `alert://<id>` resolves to an alert document fetched from Kibana and
//! `prompt://<name>` resolves to a rendered prompt. Prompt URIs may carry
//! arguments as a query string, e.g. `prompt://investigate-alert?alert_id=a1`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use kibana_api::{BackendError, KibanaClient, alerts};
use percent_encoding::percent_decode_str;
use rmcp::model::{GetPromptResult, JsonObject};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::server::prompts::render_prompt;

pub const ALERT_SCHEME: &str = "alert";
pub const PROMPT_SCHEME: &str = "prompt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    Alert(String),
    Prompt { name: String, arguments: JsonObject },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("malformed resource URI '{uri}': expected '<scheme>://<identifier>'")]
    Malformed { uri: String },

    #[error("unknown URI scheme '{scheme}' in '{uri}': expected alert:// or prompt://")]
    UnknownScheme { scheme: String, uri: String },

    #[error("resource URI '{uri}' is missing an identifier")]
    MissingIdentifier { uri: String },

    #[error("prompt '{name}' was not found")]
    UnknownPrompt { name: String },

    #[error("prompt '{prompt}' requires argument '{argument}'")]
    MissingArgument { prompt: String, argument: &'static str },
}

impl FromStr for ResourceUri {
    type Err = RoutingError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let (scheme, identifier) = uri
            .trim()
            .split_once("://")
            .ok_or_else(|| RoutingError::Malformed { uri: uri.to_string() })?;
        let (path, query) = identifier.split_once('?').unwrap_or((identifier, ""));
        let path = path.trim_end_matches('/');

        match scheme {
            ALERT_SCHEME | PROMPT_SCHEME if path.trim().is_empty() => Err(RoutingError::MissingIdentifier { uri: uri.to_string() }),
            ALERT_SCHEME => Ok(ResourceUri::Alert(path.to_string())),
            PROMPT_SCHEME => Ok(ResourceUri::Prompt {
                name: path.to_string(),
                arguments: parse_query(query),
            }),
            "" => Err(RoutingError::Malformed { uri: uri.to_string() }),
            other => Err(RoutingError::UnknownScheme {
                scheme: other.to_string(),
                uri: uri.to_string(),
            }),
        }
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceUri::Alert(id) => write!(f, "{ALERT_SCHEME}://{id}"),
            ResourceUri::Prompt { name, .. } => write!(f, "{PROMPT_SCHEME}://{name}"),
        }
    }
}

fn parse_query(query: &str) -> JsonObject {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key), Value::String(decode(value)))
        })
        .collect()
}

fn decode(component: &str) -> String {
    let component = component.replace('+', " ");
    percent_decode_str(&component).decode_utf8_lossy().into_owned()
}

#[derive(Debug)]
pub enum Resolution {
    Alert { id: String, text: String },
    Prompt(GetPromptResult),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Resolves resource and prompt URIs against the shared client.
#[derive(Debug, Clone)]
pub struct Resolver {
    client: Arc<KibanaClient>,
}

impl Resolver {
    pub fn new(client: Arc<KibanaClient>) -> Self {
        Self { client }
    }

    /// Resolve `uri`. Explicit `arguments` override any carried in a prompt URI.
    pub async fn resolve(&self, uri: &str, arguments: Option<&JsonObject>) -> Result<Resolution, ResolveError> {
        match uri.parse::<ResourceUri>()? {
            ResourceUri::Alert(id) => {
                debug!(alert_id = %id, "resolving alert resource");
                let text = alerts::get_alert(&self.client, &id).await?;
                Ok(Resolution::Alert { id, text })
            }
            ResourceUri::Prompt { name, arguments: mut merged } => {
                if let Some(arguments) = arguments {
                    merged.extend(arguments.iter().map(|(key, value)| (key.clone(), value.clone())));
                }
                Ok(Resolution::Prompt(render_prompt(&name, Some(&merged))?))
            }
        }
    }

    /// Resolve a prompt given either a bare name or a `prompt://` URI.
    pub fn resolve_prompt(&self, name_or_uri: &str, arguments: Option<&JsonObject>) -> Result<GetPromptResult, RoutingError> {
        if !name_or_uri.contains("://") {
            return render_prompt(name_or_uri, arguments);
        }
        match name_or_uri.parse::<ResourceUri>()? {
            ResourceUri::Prompt { name, arguments: mut merged } => {
                if let Some(arguments) = arguments {
                    merged.extend(arguments.iter().map(|(key, value)| (key.clone(), value.clone())));
                }
                render_prompt(&name, Some(&merged))
            }
            ResourceUri::Alert(_) => Err(RoutingError::UnknownScheme {
                scheme: ALERT_SCHEME.to_string(),
                uri: name_or_uri.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_alert_and_prompt_uris() {
        assert_eq!("alert://123".parse::<ResourceUri>(), Ok(ResourceUri::Alert("123".to_string())));
        assert_eq!("alert://123/".parse::<ResourceUri>(), Ok(ResourceUri::Alert("123".to_string())));
        assert_eq!("alert://123?x=1".parse::<ResourceUri>(), Ok(ResourceUri::Alert("123".to_string())));

        let ResourceUri::Prompt { name, arguments } = "prompt://investigate-alert?alert_id=a%201".parse::<ResourceUri>().expect("prompt")
        else {
            panic!("expected prompt uri");
        };
        assert_eq!(name, "investigate-alert");
        assert_eq!(arguments.get("alert_id"), Some(&Value::String("a 1".to_string())));
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert_eq!(
            "weird://x".parse::<ResourceUri>(),
            Err(RoutingError::UnknownScheme {
                scheme: "weird".to_string(),
                uri: "weird://x".to_string(),
            })
        );
    }

    #[test]
    fn rejects_malformed_and_empty_uris() {
        assert!(matches!("alert:123".parse::<ResourceUri>(), Err(RoutingError::Malformed { .. })));
        assert!(matches!("://123".parse::<ResourceUri>(), Err(RoutingError::Malformed { .. })));
        assert!(matches!("alert://".parse::<ResourceUri>(), Err(RoutingError::MissingIdentifier { .. })));
        assert!(matches!("prompt://?x=1".parse::<ResourceUri>(), Err(RoutingError::MissingIdentifier { .. })));
        assert!(matches!("alert:///?x=1".parse::<ResourceUri>(), Err(RoutingError::MissingIdentifier { .. })));
    }

    #[test]
    fn display_round_trips_the_identifier() {
        assert_eq!(ResourceUri::Alert("a1".to_string()).to_string(), "alert://a1");
    }
}
