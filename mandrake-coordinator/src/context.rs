//! Transforms session history into the provider's message vocabulary, and
//! renders tool results back into a user message for the next turn.

use mandrake_core::{SessionHistory, ToolCall};
use mandrake_provider::ProviderMessage;

/// Flatten a session's rounds into alternating user/assistant messages.
///
/// Per round: one user message (the request), then per turn an assistant
/// message (its raw text, skipped if empty — a turn that was only tool
/// calls produces none) and, if that turn made any tool calls, a user
/// message carrying their results. Called with a history that already
/// includes the round just opened by `start_round`, so the in-progress
/// round's request naturally becomes the trailing "new" user turn spec
/// §4.8 step 2 calls for — its response has no turns yet to render.
pub fn build_history_messages(history: &SessionHistory) -> Vec<ProviderMessage> {
    let mut messages = Vec::new();
    for (round, response) in history.rounds.iter().zip(history.responses.iter()) {
        messages.push(ProviderMessage::user(round.request.content.clone()));
        for turn in &response.turns {
            if !turn.raw_response.is_empty() {
                messages.push(ProviderMessage::assistant(turn.raw_response.clone()));
            }
            if !turn.tool_calls.is_empty() {
                messages.push(ProviderMessage::user(render_tool_results(&turn.tool_calls)));
            }
        }
    }
    messages
}

/// Render a turn's tool calls as the text fed back to the model as its
/// next user message. The wire format between turns within a round is
/// this coordinator's own concern, not part of the wire protocol to tool
/// servers (§6) or to providers (§4.5) — both of those pass results
/// through verbatim; this is purely how we ask the model to look at them.
pub fn render_tool_results(tool_calls: &[ToolCall]) -> String {
    tool_calls
        .iter()
        .map(render_one_result)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_one_result(tool_call: &ToolCall) -> String {
    let (is_error, content) = match &tool_call.result {
        Some(result) => (result.is_error, result.content.clone()),
        None => (true, serde_json::json!("no result recorded")),
    };
    format!(
        "<tool_result server=\"{}\" tool=\"{}\" is_error=\"{}\">{}</tool_result>",
        tool_call.call.server, tool_call.call.name, is_error, content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandrake_core::{
        Request, Response, Round, Session, ToolCallRecord, ToolResult, Turn,
    };
    use chrono::Utc;

    fn empty_session_history() -> SessionHistory {
        SessionHistory {
            session: Session {
                id: "s1".into(),
                workspace_id: None,
                title: None,
                description: None,
                metadata: Default::default(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            rounds: vec![],
            responses: vec![],
        }
    }

    #[test]
    fn round_with_no_turns_yields_only_the_user_message() {
        let mut history = empty_session_history();
        let now = Utc::now();
        history.rounds.push(Round {
            id: "r1".into(),
            session_id: "s1".into(),
            index: 0,
            request: Request {
                id: "req1".into(),
                content: "hello".into(),
                created_at: now,
            },
            response_id: "resp1".into(),
            created_at: now,
            updated_at: now,
        });
        history.responses.push(Response {
            id: "resp1".into(),
            round_id: "r1".into(),
            turns: vec![],
        });

        let messages = build_history_messages(&history);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content.as_text(), Some("hello"));
    }

    #[test]
    fn turn_with_tool_calls_adds_a_trailing_tool_result_message() {
        let mut history = empty_session_history();
        let now = Utc::now();
        history.rounds.push(Round {
            id: "r1".into(),
            session_id: "s1".into(),
            index: 0,
            request: Request {
                id: "req1".into(),
                content: "read it".into(),
                created_at: now,
            },
            response_id: "resp1".into(),
            created_at: now,
            updated_at: now,
        });
        history.responses.push(Response {
            id: "resp1".into(),
            round_id: "r1".into(),
            turns: vec![Turn {
                id: "t1".into(),
                response_id: "resp1".into(),
                index: 0,
                raw_response: "<use_mcp_tool>...".into(),
                content: vec![],
                tool_calls: vec![ToolCall {
                    call: ToolCallRecord {
                        server: "fs".into(),
                        name: "read_file".into(),
                        args: serde_json::json!({"path": "/a.txt"}),
                    },
                    result: Some(ToolResult {
                        is_error: false,
                        content: serde_json::json!("hello"),
                    }),
                }],
                metrics: Default::default(),
                created_at: now,
                updated_at: now,
            }],
        });

        let messages = build_history_messages(&history);
        assert_eq!(messages.len(), 3);
        assert!(messages[2].content.as_text().unwrap().contains("hello"));
    }
}
