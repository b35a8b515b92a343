//! Request/response vocabulary shared by every concrete provider.

use mandrake_core::Content;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The speaker of a message in a provider conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user, or tool results fed back to the model as a user turn.
    User,
    /// The model's own prior output.
    Assistant,
}

/// One message in the conversation sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    /// Who said this.
    pub role: Role,
    /// What they said.
    pub content: Content,
}

impl ProviderMessage {
    /// A user message with plain-text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    /// An assistant message with plain-text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

/// A tool advertised to the model as part of its catalog, as assembled by
/// the Prompt Builder / Session Coordinator from `mandrake-mcp`'s
/// `CatalogedTool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool's name, as the model must name it to invoke it.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema for the tool's input arguments.
    pub input_schema: Value,
}

/// One request to a provider's streaming chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The rendered system prompt.
    pub system: String,
    /// Conversation history plus the new user turn, in order.
    pub messages: Vec<ProviderMessage>,
    /// The tool catalog offered to the model this turn.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

/// Token usage reported by a provider. `Usage` chunks may arrive more than
/// once per stream; the last one observed before `End` is authoritative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
    /// Tokens served from a prompt cache read, if reported.
    pub cache_read_tokens: Option<u64>,
    /// Tokens written to a prompt cache, if reported.
    pub cache_write_tokens: Option<u64>,
}

/// One item of a provider's streaming response.
///
/// `Text` chunks appear in generation order and concatenate to the full raw
/// text; `Usage` may appear multiple times, with the final occurrence
/// authoritative; `End` is always last.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// A fragment of generated text, in arrival order.
    Text(String),
    /// A usage snapshot. The last one before `End` wins.
    Usage(Usage),
    /// Marks the end of the stream. No further chunks follow.
    End,
}
