//! Named prompts for alert triage, investigation, and rule tuning.

use std::str::FromStr;

use rmcp::model::{GetPromptResult, JsonObject, ListPromptsResult, Prompt, PromptArgument, PromptMessage, PromptMessageRole};
use serde_json::Value;

use crate::server::resolver::RoutingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptName {
    TriageAlerts,
    InvestigateAlert,
    TuneRule,
}

impl PromptName {
    pub const ALL: [PromptName; 3] = [PromptName::TriageAlerts, PromptName::InvestigateAlert, PromptName::TuneRule];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptName::TriageAlerts => "triage-alerts",
            PromptName::InvestigateAlert => "investigate-alert",
            PromptName::TuneRule => "tune-rule",
        }
    }
}

impl FromStr for PromptName {
    type Err = RoutingError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        PromptName::ALL
            .into_iter()
            .find(|prompt| prompt.as_str() == name)
            .ok_or_else(|| RoutingError::UnknownPrompt { name: name.to_string() })
    }
}

/// List the prompts exposed by the server.
pub fn list_prompts() -> ListPromptsResult {
    ListPromptsResult::with_all_items(vec![
        prompt_definition(
            PromptName::TriageAlerts,
            "Triage recent security alerts and decide on status and tags.",
            vec![optional_argument("search_text", "Optional query string to narrow the alerts, '*' for all")],
        ),
        prompt_definition(
            PromptName::InvestigateAlert,
            "Investigate a single alert and recommend a disposition.",
            vec![required_argument("alert_id", "Identifier of the alert to investigate")],
        ),
        prompt_definition(
            PromptName::TuneRule,
            "Review a noisy detection rule and propose exception items.",
            vec![required_argument("rule_id", "Internal id (UUID) of the detection rule")],
        ),
    ])
}

/// Render a prompt by name with the caller's arguments.
pub fn render_prompt(name: &str, arguments: Option<&JsonObject>) -> Result<GetPromptResult, RoutingError> {
    match name.parse::<PromptName>()? {
        PromptName::TriageAlerts => Ok(triage_alerts_prompt(arguments)),
        PromptName::InvestigateAlert => investigate_alert_prompt(arguments),
        PromptName::TuneRule => tune_rule_prompt(arguments),
    }
}

fn triage_alerts_prompt(arguments: Option<&JsonObject>) -> GetPromptResult {
    let search_text = optional_string_argument(arguments, "search_text").unwrap_or_else(|| "*".to_string());

    GetPromptResult {
        description: Some("Triage recent security alerts.".to_string()),
        messages: vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Triage the most recent security alerts.\n\n1. Call get_alerts with search_text \"{search_text}\" and limit 20.\n2. Group the alerts by rule name and host, and flag the highest severity and risk score groups first.\n3. For each alert you can explain, call adjust_alert_status with 'acknowledged' or 'closed'.\n4. Call tag_alert to record your reasoning, for example 'false-positive' or 'needs-escalation'.\n\nSummarize what you changed and which alerts still need a human."
            ),
        )],
    }
}

fn investigate_alert_prompt(arguments: Option<&JsonObject>) -> Result<GetPromptResult, RoutingError> {
    let alert_id = require_string_argument(PromptName::InvestigateAlert, arguments, "alert_id")?;

    Ok(GetPromptResult {
        description: Some(format!("Investigate alert {alert_id}.")),
        messages: vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Investigate security alert {alert_id}.\n\n1. Read the resource alert://{alert_id} for the full alert document.\n2. Identify the rule that fired, the affected host and user, and the reason recorded on the alert.\n3. Call get_alerts with a search_text that matches the same host or rule to find related activity.\n4. Recommend a status (open, acknowledged, closed) and tags, and apply them with adjust_alert_status and tag_alert once you are confident."
            ),
        )],
    })
}

fn tune_rule_prompt(arguments: Option<&JsonObject>) -> Result<GetPromptResult, RoutingError> {
    let rule_id = require_string_argument(PromptName::TuneRule, arguments, "rule_id")?;

    Ok(GetPromptResult {
        description: Some(format!("Tune detection rule {rule_id}.")),
        messages: vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Reduce false positives for detection rule {rule_id}.\n\n1. Call find_rules with filter 'alert.attributes.id:\"{rule_id}\"' to review the rule definition.\n2. Call get_rule_exceptions with rule_id {rule_id} to see existing exceptions.\n3. Call get_alerts with a search_text on kibana.alert.rule.uuid:{rule_id} to inspect recent alerts from this rule.\n4. Propose exception items (match, match_any, or exists entries) that remove benign activity without hiding real threats, and add them with add_rule_exception_items only after explaining each one."
            ),
        )],
    })
}

fn prompt_definition(name: PromptName, description: &str, arguments: Vec<PromptArgument>) -> Prompt {
    Prompt {
        name: name.as_str().to_string(),
        title: None,
        description: Some(description.to_string()),
        arguments: Some(arguments),
        icons: None,
        meta: None,
    }
}

fn required_argument(name: &str, description: &str) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        required: Some(true),
    }
}

fn optional_argument(name: &str, description: &str) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        required: Some(false),
    }
}

fn require_string_argument(prompt: PromptName, arguments: Option<&JsonObject>, key: &'static str) -> Result<String, RoutingError> {
    optional_string_argument(arguments, key).ok_or_else(|| RoutingError::MissingArgument {
        prompt: prompt.as_str().to_string(),
        argument: key,
    })
}

fn optional_string_argument(arguments: Option<&JsonObject>, key: &str) -> Option<String> {
    arguments
        .and_then(|args| args.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn arguments(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn first_text(result: &GetPromptResult) -> String {
        serde_json::to_value(&result.messages[0]).expect("message json")["content"]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn list_prompts_exposes_named_prompts() {
        let names = list_prompts().prompts.into_iter().map(|prompt| prompt.name).collect::<Vec<String>>();
        assert_eq!(names, vec!["triage-alerts", "investigate-alert", "tune-rule"]);
    }

    #[test]
    fn triage_defaults_to_all_alerts() {
        let result = render_prompt("triage-alerts", None).expect("prompt");
        assert!(first_text(&result).contains("search_text \"*\""));
    }

    #[test]
    fn investigate_embeds_the_alert_uri() {
        let args = arguments(json!({ "alert_id": "abc-123" }));
        let result = render_prompt("investigate-alert", Some(&args)).expect("prompt");
        assert!(first_text(&result).contains("alert://abc-123"));
    }

    #[test]
    fn required_arguments_are_enforced() {
        let error = render_prompt("tune-rule", Some(&arguments(json!({ "rule_id": "  " })))).expect_err("blank rule id");
        assert_eq!(
            error,
            RoutingError::MissingArgument {
                prompt: "tune-rule".to_string(),
                argument: "rule_id",
            }
        );
    }

    #[test]
    fn unknown_prompts_are_routing_errors() {
        let error = render_prompt("summarize", None).expect_err("unknown prompt");
        assert_eq!(error, RoutingError::UnknownPrompt { name: "summarize".to_string() });
    }
}
