//! NDJSON streaming support for Ollama's `/api/chat` endpoint.
//!
//! Unlike Anthropic's SSE framing, Ollama emits one complete JSON object per
//! line, ending with a line carrying `"done": true` and the final token
//! counts instead of a dedicated terminator event.
//!
//! Reference: <https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion>

use futures_core::stream::Stream;
use futures_util::StreamExt;
use mandrake_provider::{Chunk, ProviderError, Usage};
use reqwest::Response;

use crate::error::map_reqwest_error;
use crate::mapping::tool_call_to_xml;
use crate::types::OllamaChatChunk;

/// Wrap a streaming HTTP response into a [`mandrake_provider::ChunkStream`].
pub(crate) fn stream_completion(
    response: Response,
) -> impl Stream<Item = Result<Chunk, ProviderError>> + Send + 'static {
    let byte_stream = response.bytes_stream();
    parse_ndjson_stream(byte_stream)
}

fn parse_ndjson_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<Chunk, ProviderError>> + Send + 'static {
    async_stream::stream! {
        let mut bytes_stream = std::pin::pin!(byte_stream);
        let mut line_buf = String::new();

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
                let line = line_buf[..newline_pos].trim().to_string();
                line_buf.drain(..=newline_pos);
                if line.is_empty() {
                    continue;
                }
                match process_line(&line) {
                    Ok(items) => {
                        for item in items {
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

        let remainder = line_buf.trim().to_string();
        if !remainder.is_empty() {
            match process_line(&remainder) {
                Ok(items) => {
                    for item in items {
                        yield Ok(item);
                    }
                }
                Err(e) => yield Err(e),
            }
        }
    }
}

fn process_line(line: &str) -> Result<Vec<Chunk>, ProviderError> {
    let parsed: OllamaChatChunk = serde_json::from_str(line)
        .map_err(|e| ProviderError::Server(format!("malformed NDJSON line: {e}")))?;

    let mut items = Vec::new();
    if let Some(message) = &parsed.message {
        if !message.content.is_empty() {
            items.push(Chunk::Text(message.content.clone()));
        }
        for call in &message.tool_calls {
            items.push(Chunk::Text(tool_call_to_xml(
                &call.function.name,
                &call.function.arguments,
            )));
        }
    }

    if parsed.done {
        items.push(Chunk::Usage(Usage {
            input_tokens: parsed.prompt_eval_count.unwrap_or(0),
            output_tokens: parsed.eval_count.unwrap_or(0),
            cache_read_tokens: None,
            cache_write_tokens: None,
        }));
        items.push(Chunk::End);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_only_line_becomes_text_chunk() {
        let items = process_line(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"hi"},"done":false}"#,
        )
        .unwrap();
        assert_eq!(items, vec![Chunk::Text("hi".to_string())]);
    }

    #[test]
    fn final_line_emits_usage_then_end() {
        let items = process_line(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"eval_count":10,"prompt_eval_count":20}"#,
        )
        .unwrap();
        assert_eq!(
            items,
            vec![
                Chunk::Usage(Usage {
                    input_tokens: 20,
                    output_tokens: 10,
                    cache_read_tokens: None,
                    cache_write_tokens: None,
                }),
                Chunk::End,
            ]
        );
    }

    #[test]
    fn tool_call_line_becomes_xml_text_chunk() {
        let items = process_line(
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"read_file","arguments":{"path":"a.txt"}}}]},"done":false}"#,
        )
        .unwrap();
        assert_eq!(
            items,
            vec![Chunk::Text("<read_file><path>a.txt</path></read_file>".to_string())]
        );
    }

    #[test]
    fn malformed_line_surfaces_as_error() {
        let result = process_line("not json");
        assert!(result.is_err());
    }
}
