//! SSE streaming support for the Anthropic Messages API.
//!
//! Parses the Server-Sent Events stream Anthropic returns for
//! `"stream": true` requests and turns it into a [`mandrake_provider::ChunkStream`].
//!
//! Reference: <https://docs.anthropic.com/en/api/messages-streaming>

use std::collections::HashMap;

use futures_core::stream::Stream;
use futures_util::StreamExt;
use mandrake_provider::{Chunk, ProviderError, Usage};
use reqwest::Response;
use serde_json::Value;

use crate::error::map_reqwest_error;
use crate::mapping::tool_use_to_xml;
use crate::types::AnthropicUsage;

/// Wrap a streaming HTTP response into a [`mandrake_provider::ChunkStream`].
pub(crate) fn stream_completion(
    response: Response,
) -> impl Stream<Item = Result<Chunk, ProviderError>> + Send + 'static {
    let byte_stream = response.bytes_stream();
    parse_sse_stream(byte_stream)
}

fn parse_sse_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Chunk, ProviderError>> + Send + 'static {
    async_stream::stream! {
        let mut state = SseParserState::new();
        let mut bytes_stream = std::pin::pin!(byte_stream);
        let mut line_buf = String::new();
        let mut ended = false;

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    yield Err(map_reqwest_error(e));
                    return;
                }
            };
            let chunk_str = match std::str::from_utf8(&chunk) {
                Ok(s) => s,
                Err(e) => {
                    yield Err(ProviderError::Server(format!("invalid UTF-8 in stream: {e}")));
                    return;
                }
            };
            line_buf.push_str(chunk_str);

            while let Some(newline_pos) = line_buf.find('\n') {
                let line = line_buf[..newline_pos].trim_end_matches('\r').to_string();
                line_buf.drain(..=newline_pos);
                match state.process_line(&line) {
                    Ok(items) => {
                        for item in items {
                            if matches!(item, Chunk::End) {
                                ended = true;
                            }
                            yield Ok(item);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if !ended {
            yield Ok(Chunk::Usage(state.usage));
            yield Ok(Chunk::End);
        }
    }
}

/// Tracks in-progress streaming state across SSE events.
struct SseParserState {
    current_event_type: Option<String>,
    current_data: String,
    tool_uses: HashMap<u64, ToolUseInProgress>,
    usage: Usage,
}

struct ToolUseInProgress {
    name: String,
    input_buf: String,
}

impl SseParserState {
    fn new() -> Self {
        Self {
            current_event_type: None,
            current_data: String::new(),
            tool_uses: HashMap::new(),
            usage: Usage::default(),
        }
    }

    fn process_line(&mut self, line: &str) -> Result<Vec<Chunk>, ProviderError> {
        if line.is_empty() {
            return self.dispatch_event();
        }
        if let Some(rest) = line.strip_prefix("event:") {
            self.current_event_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            if !self.current_data.is_empty() {
                self.current_data.push('\n');
            }
            self.current_data.push_str(rest.trim());
        }
        Ok(Vec::new())
    }

    fn dispatch_event(&mut self) -> Result<Vec<Chunk>, ProviderError> {
        let event_type = self.current_event_type.take();
        let data = std::mem::take(&mut self.current_data);
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let value: Value = serde_json::from_str(&data)
            .map_err(|e| ProviderError::Server(format!("malformed SSE payload: {e}")))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .or(event_type.as_deref())
            .unwrap_or_default();

        match kind {
            "message_start" => {
                if let Some(usage) = value
                    .get("message")
                    .and_then(|m| m.get("usage"))
                    .and_then(|u| serde_json::from_value::<AnthropicUsage>(u.clone()).ok())
                {
                    self.usage.input_tokens = usage.input_tokens;
                    self.usage.cache_read_tokens = usage.cache_read_input_tokens;
                    self.usage.cache_write_tokens = usage.cache_creation_input_tokens;
                }
                Ok(Vec::new())
            }
            "content_block_start" => {
                let index = value.get("index").and_then(Value::as_u64).unwrap_or(0);
                if let Some(block) = value.get("content_block") {
                    if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                        let name = block
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        self.tool_uses.insert(
                            index,
                            ToolUseInProgress {
                                name,
                                input_buf: String::new(),
                            },
                        );
                    }
                }
                Ok(Vec::new())
            }
            "content_block_delta" => {
                let index = value.get("index").and_then(Value::as_u64).unwrap_or(0);
                let Some(delta) = value.get("delta") else {
                    return Ok(Vec::new());
                };
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = delta.get("text").and_then(Value::as_str).unwrap_or_default();
                        Ok(vec![Chunk::Text(text.to_string())])
                    }
                    Some("input_json_delta") => {
                        if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                            if let Some(tool_use) = self.tool_uses.get_mut(&index) {
                                tool_use.input_buf.push_str(partial);
                            }
                        }
                        Ok(Vec::new())
                    }
                    _ => Ok(Vec::new()),
                }
            }
            "content_block_stop" => {
                let index = value.get("index").and_then(Value::as_u64).unwrap_or(0);
                if let Some(tool_use) = self.tool_uses.remove(&index) {
                    let input: Value = if tool_use.input_buf.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&tool_use.input_buf).unwrap_or(Value::Null)
                    };
                    let xml = tool_use_to_xml(&tool_use.name, &input);
                    Ok(vec![Chunk::Text(xml)])
                } else {
                    Ok(Vec::new())
                }
            }
            "message_delta" => {
                if let Some(usage) = value
                    .get("usage")
                    .and_then(|u| serde_json::from_value::<AnthropicUsage>(u.clone()).ok())
                {
                    self.usage.output_tokens = usage.output_tokens;
                }
                Ok(Vec::new())
            }
            "message_stop" => Ok(vec![Chunk::Usage(self.usage), Chunk::End]),
            "error" => {
                let message = value
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown streaming error");
                Err(ProviderError::Server(message.to_string()))
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_event(state: &mut SseParserState, event: &str, data: &str) -> Vec<Chunk> {
        state.process_line(&format!("event: {event}")).unwrap();
        state.process_line(&format!("data: {data}")).unwrap();
        state.process_line("").unwrap()
    }

    #[test]
    fn text_delta_becomes_text_chunk() {
        let mut state = SseParserState::new();
        let chunks = feed_event(
            &mut state,
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        );
        assert_eq!(chunks, vec![Chunk::Text("hi".to_string())]);
    }

    #[test]
    fn message_stop_emits_usage_then_end() {
        let mut state = SseParserState::new();
        state.usage.input_tokens = 10;
        state.usage.output_tokens = 5;
        let chunks = feed_event(&mut state, "message_stop", r#"{"type":"message_stop"}"#);
        assert_eq!(chunks, vec![Chunk::Usage(state.usage), Chunk::End]);
    }

    #[test]
    fn tool_use_block_renders_as_xml_text_chunk() {
        let mut state = SseParserState::new();
        feed_event(
            &mut state,
            "content_block_start",
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"read_file","input":{}}}"#,
        );
        feed_event(
            &mut state,
            "content_block_delta",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"path\":\"a.txt\"}"}}"#,
        );
        let chunks = feed_event(
            &mut state,
            "content_block_stop",
            r#"{"type":"content_block_stop","index":0}"#,
        );
        assert_eq!(
            chunks,
            vec![Chunk::Text("<read_file><path>a.txt</path></read_file>".to_string())]
        );
    }

    #[test]
    fn error_event_surfaces_as_error() {
        let mut state = SseParserState::new();
        state.process_line("event: error").unwrap();
        state
            .process_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"overloaded"}}"#)
            .unwrap();
        let err = state.process_line("").unwrap_err();
        assert!(matches!(err, ProviderError::Server(msg) if msg == "overloaded"));
    }
}
