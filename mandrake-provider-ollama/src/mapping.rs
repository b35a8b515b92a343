//! Conversions between `mandrake-provider`'s vocabulary and Ollama's
//! `/api/chat` wire format.
//!
//! Reference: <https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion>

use mandrake_core::{Content, ContentBlock};
use mandrake_provider::{ProviderMessage, ProviderRequest, Role, ToolDefinition};

use crate::types::{OllamaFunctionDef, OllamaMessage, OllamaOptions, OllamaRequest, OllamaTool, OllamaToolCall};

/// Build the Ollama request body for `request`, targeting `model`.
///
/// Ollama has no dedicated `system` field in the way Anthropic does; the
/// system prompt is prepended as a `"system"`-role message instead.
pub(crate) fn to_api_request(request: &ProviderRequest, model: &str) -> OllamaRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.is_empty() {
        messages.push(OllamaMessage {
            role: "system".to_string(),
            content: request.system.clone(),
            tool_calls: Vec::new(),
        });
    }
    messages.extend(request.messages.iter().map(message_to_api));

    OllamaRequest {
        model: model.to_string(),
        messages,
        tools: request.tools.iter().map(tool_to_api).collect(),
        stream: true,
        options: if request.temperature.is_some() || request.max_tokens.is_some() {
            Some(OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            })
        } else {
            None
        },
    }
}

fn message_to_api(message: &ProviderMessage) -> OllamaMessage {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let (content, tool_calls) = match &message.content {
        Content::Text(text) => (text.clone(), Vec::new()),
        Content::Blocks(blocks) => {
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text: t } => {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(t);
                    }
                    ContentBlock::ToolResult {
                        content: result, ..
                    } => {
                        if !text.is_empty() {
                            text.push('\n');
                        }
                        text.push_str(result);
                    }
                    ContentBlock::ToolUse { name, input, .. } => {
                        tool_calls.push(OllamaToolCall {
                            function: crate::types::OllamaFunctionCall {
                                name: name.clone(),
                                arguments: input.clone(),
                            },
                        });
                    }
                    ContentBlock::Image { .. } | ContentBlock::Custom { .. } => {}
                }
            }
            (text, tool_calls)
        }
    };

    OllamaMessage {
        role: role.to_string(),
        content,
        tool_calls,
    }
}

fn tool_to_api(tool: &ToolDefinition) -> OllamaTool {
    OllamaTool {
        kind: "function",
        function: OllamaFunctionDef {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

/// Render a whole Ollama tool call back into the XML-like grammar
/// `mandrake-parser` expects, matching the Anthropic provider's treatment
/// of native tool calling so downstream code is provider-agnostic.
pub(crate) fn tool_call_to_xml(name: &str, arguments: &serde_json::Value) -> String {
    let mut out = format!("<{name}>");
    if let Some(map) = arguments.as_object() {
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
    fn system_prompt_becomes_leading_system_message() {
        let request = ProviderRequest {
            system: "be concise".to_string(),
            messages: vec![ProviderMessage::user("hi")],
            tools: vec![],
            max_tokens: None,
            temperature: None,
        };
        let body = to_api_request(&request, "llama3.2");
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[0].content, "be concise");
        assert_eq!(body.messages[1].role, "user");
    }

    #[test]
    fn tool_use_block_becomes_tool_call() {
        let content = Content::Blocks(vec![ContentBlock::ToolUse {
            id: "t1".into(),
            name: "read_file".into(),
            input: json!({"path": "a.txt"}),
        }]);
        let message = ProviderMessage {
            role: Role::Assistant,
            content,
        };
        let mapped = message_to_api(&message);
        assert_eq!(mapped.tool_calls.len(), 1);
        assert_eq!(mapped.tool_calls[0].function.name, "read_file");
    }

    #[test]
    fn tool_call_renders_to_xml() {
        let xml = tool_call_to_xml("read_file", &json!({"path": "a.txt"}));
        assert_eq!(xml, "<read_file><path>a.txt</path></read_file>");
    }
}
