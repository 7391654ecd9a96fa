//! Resource listings and rendering of resolved resources.

use rmcp::model::{
    AnnotateAble, ListResourceTemplatesResult, ListResourcesResult, PromptMessageContent, RawResourceTemplate, ReadResourceResult,
    ResourceContents,
};

use crate::server::resolver::Resolution;

/// Concrete resources are only reachable through templates.
pub fn list_resources() -> ListResourcesResult {
    ListResourcesResult::with_all_items(Vec::new())
}

pub fn list_resource_templates() -> ListResourceTemplatesResult {
    let templates = vec![
        RawResourceTemplate {
            uri_template: "alert://{alert_id}".to_string(),
            name: "alert".to_string(),
            title: Some("Security alert by id".to_string()),
            description: Some("Full alert document fetched from the Kibana detection engine.".to_string()),
            mime_type: Some("application/json".to_string()),
            icons: None,
        }
        .no_annotation(),
        RawResourceTemplate {
            uri_template: "prompt://{prompt_name}".to_string(),
            name: "prompt".to_string(),
            title: Some("Named prompt".to_string()),
            description: Some(
                "Rendered prompt text. Arguments may be passed as a query string, e.g. prompt://investigate-alert?alert_id=...".to_string(),
            ),
            mime_type: Some("text/plain".to_string()),
            icons: None,
        }
        .no_annotation(),
    ];
    ListResourceTemplatesResult::with_all_items(templates)
}

/// Render a resolution as resource contents for `uri`.
pub fn read_result(uri: &str, resolution: Resolution) -> ReadResourceResult {
    match resolution {
        Resolution::Alert { text, .. } => text_resource(uri, "application/json", text),
        Resolution::Prompt(prompt) => {
            let text = prompt
                .messages
                .iter()
                .filter_map(|message| match &message.content {
                    PromptMessageContent::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<&str>>()
                .join("\n\n");
            text_resource(uri, "text/plain", text)
        }
    }
}

fn text_resource(uri: &str, mime_type: &str, text: String) -> ReadResourceResult {
    ReadResourceResult {
        contents: vec![ResourceContents::TextResourceContents {
            uri: uri.to_string(),
            mime_type: Some(mime_type.to_string()),
            text,
            meta: None,
        }],
    }
}
