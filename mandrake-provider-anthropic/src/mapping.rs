//! Conversions between `mandrake-provider`'s vocabulary and the Anthropic
//! Messages API's wire format.

use mandrake_core::{Content, ContentBlock, ImageSource};
use mandrake_provider::{ProviderMessage, ProviderRequest, Role, ToolDefinition};

use crate::types::{AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest, AnthropicTool};

/// Build the Anthropic request body for `request`, targeting `model` with
/// `max_tokens` generated tokens.
pub(crate) fn to_api_request(request: &ProviderRequest, model: &str, max_tokens: u32) -> AnthropicRequest {
    AnthropicRequest {
        model: model.to_string(),
        max_tokens: request.max_tokens.unwrap_or(max_tokens),
        system: request.system.clone(),
        messages: request.messages.iter().map(message_to_api).collect(),
        tools: request.tools.iter().map(tool_to_api).collect(),
        temperature: request.temperature,
        stream: true,
    }
}

fn message_to_api(message: &ProviderMessage) -> AnthropicMessage {
    AnthropicMessage {
        role: match message.role {
            Role::User => "user".to_string(),
            Role::Assistant => "assistant".to_string(),
        },
        content: content_to_api(&message.content),
    }
}

fn content_to_api(content: &Content) -> Vec<AnthropicContentBlock> {
    match content {
        Content::Text(text) => vec![AnthropicContentBlock::Text { text: text.clone() }],
        Content::Blocks(blocks) => blocks.iter().filter_map(block_to_api).collect(),
    }
}

fn block_to_api(block: &ContentBlock) -> Option<AnthropicContentBlock> {
    match block {
        ContentBlock::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
        ContentBlock::Image { source, media_type } => Some(AnthropicContentBlock::Image {
            source: match source {
                ImageSource::Base64 { data } => AnthropicImageSource::Base64 {
                    media_type: media_type.clone(),
                    data: data.clone(),
                },
                ImageSource::Url { url } => AnthropicImageSource::Url { url: url.clone() },
            },
        }),
        ContentBlock::ToolUse { id, name, input } => Some(AnthropicContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(AnthropicContentBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
            is_error: *is_error,
        }),
        // Custom blocks have no native Anthropic representation; dropping
        // them from replayed history is preferable to failing the request.
        ContentBlock::Custom { .. } => None,
    }
}

fn tool_to_api(tool: &ToolDefinition) -> AnthropicTool {
    AnthropicTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.input_schema.clone(),
    }
}

/// Render a completed native tool-use invocation back into the XML-like
/// grammar `mandrake-parser` understands, so a model that used Anthropic's
/// structured tool calling is indistinguishable downstream from one that
/// wrote the tags itself. Top-level JSON object keys become parameter tags;
/// non-string values are JSON-encoded verbatim.
pub(crate) fn tool_use_to_xml(name: &str, input: &serde_json::Value) -> String {
    let mut out = format!("<{name}>");
    if let Some(map) = input.as_object() {
        for (key, value) in map {
            let rendered = match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            };
            out.push_str(&format!("<{key}>{rendered}</{key}>"));
        }
    }
    out.push_str(&format!("</{name}>"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_content_maps_to_single_text_block() {
        let blocks = content_to_api(&Content::text("hi"));
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0], AnthropicContentBlock::Text { text } if text == "hi"));
    }

    #[test]
    fn tool_result_block_round_trips_fields() {
        let content = Content::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "call_1".into(),
            content: "42".into(),
            is_error: false,
        }]);
        let blocks = content_to_api(&content);
        match &blocks[0] {
            AnthropicContentBlock::ToolResult { tool_use_id, content, is_error } => {
                assert_eq!(tool_use_id, "call_1");
                assert_eq!(content, "42");
                assert!(!is_error);
            }
            _ => panic!("expected tool result block"),
        }
    }

    #[test]
    fn custom_blocks_are_dropped_not_failed() {
        let content = Content::Blocks(vec![ContentBlock::Custom {
            content_type: "thinking".into(),
            data: json!({"text": "hmm"}),
        }]);
        assert!(content_to_api(&content).is_empty());
    }

    #[test]
    fn tool_use_renders_to_xml_tags() {
        let xml = tool_use_to_xml("read_file", &json!({"path": "/a.txt"}));
        assert_eq!(xml, "<read_file><path>/a.txt</path></read_file>");
    }

    #[test]
    fn tool_use_non_string_value_is_json_encoded() {
        let xml = tool_use_to_xml("search", &json!({"limit": 5}));
        assert_eq!(xml, "<search><limit>5</limit></search>");
    }
}
