//! The Session Coordinator: the round/turn control loop (spec §4.8).
//!
//! One `handle_request` call assembles context, drives the provider's
//! streaming response through the incremental parser, dispatches any tool
//! calls it emits against the MCP manager, and persists every turn as it
//! goes. The loop shape — a bounded outer iteration with hook-style
//! decision points between turns and a sub-loop over the things one turn
//! produces — is grounded on `neuron-op-react`'s `ReactOperator::execute`;
//! what changed is the unit of work inside each iteration, from a
//! single-shot `provider.complete()` call to an incrementally parsed
//! `provider.stream()` call, since this spec's tool-call grammar is
//! embedded in free-form streamed text rather than carried as structured
//! content blocks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use mandrake_core::{
    ErrorKind, MandrakeError, Round, ServerId, SessionId, TokenMetrics, Turn, ToolCall,
    ToolCallRecord, ToolResult,
};
use mandrake_mcp::Manager;
use mandrake_parser::{Block, ParamValue, StreamParser};
use mandrake_prompt::{self, BuildInput, PromptConfig, SystemInfo, WorkspaceInfo};
use mandrake_provider::{
    Chunk, ModelPrice, Provider, ProviderMessage, ProviderRequest, ToolDefinition, Usage,
};
use mandrake_storage::{Storage, TurnPatch};

use crate::config::{ApprovalHook, CoordinatorConfig};
use crate::context::build_history_messages;
use crate::legacy;
use crate::outcome::{CoordinatorExit, HandleRequestError, RoundAborted, RoundOutcome};

/// Ties one workspace's storage, MCP manager, and a single bound model
/// provider together to drive requests for one session at a time.
///
/// A coordinator does not itself enforce one-session-ownership — the
/// [`mandrake_registry`](../mandrake_registry/index.html) crate is what
/// hands out exactly one coordinator per live session and keeps its
/// borrows of `storage`/`manager` alive only as long as the coordinator
/// is. Cloning a coordinator is cheap: every field is a handle.
#[derive(Clone)]
pub struct SessionCoordinator {
    storage: Storage,
    manager: Arc<Manager>,
    provider: Arc<dyn Provider>,
    price: ModelPrice,
    prompt_config: PromptConfig,
    workspace: WorkspaceInfo,
    config: CoordinatorConfig,
}

impl SessionCoordinator {
    /// Build a coordinator bound to one workspace's resources and one
    /// model provider.
    pub fn new(
        storage: Storage,
        manager: Arc<Manager>,
        provider: Arc<dyn Provider>,
        price: ModelPrice,
        prompt_config: PromptConfig,
        workspace: WorkspaceInfo,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            storage,
            manager,
            provider,
            price,
            prompt_config,
            workspace,
            config,
        }
    }

    /// Run one user request to completion (spec §4.8).
    ///
    /// Starts a round, assembles the system prompt and message history,
    /// then loops calling the provider, parsing its stream, and executing
    /// any tool calls until the assistant stops or `max_turns_per_round`
    /// is hit. `cancel` is cooperative: cancelling it stops the loop at
    /// its next suspension point, finalizes the in-flight turn with
    /// whatever was already persisted, and returns
    /// `Ok(.. exit: Cancelled ..)` rather than an error, per spec §7.
    pub async fn handle_request(
        &self,
        session_id: &SessionId,
        request_text: impl Into<String>,
        approval: Arc<dyn ApprovalHook>,
        cancel: CancellationToken,
    ) -> Result<RoundOutcome, HandleRequestError> {
        let round = self
            .storage
            .start_round(session_id, request_text.into())
            .await
            .map_err(|e| HandleRequestError::BeforeRound(e.into()))?;

        self.run_round(session_id, round, approval, cancel).await
    }

    async fn run_round(
        &self,
        session_id: &SessionId,
        round: Round,
        approval: Arc<dyn ApprovalHook>,
        cancel: CancellationToken,
    ) -> Result<RoundOutcome, HandleRequestError> {
        let mut turns: Vec<Turn> = Vec::new();

        let abort = |error: MandrakeError, round: Round, turns: Vec<Turn>| {
            HandleRequestError::Aborted(RoundAborted { error, round, turns })
        };

        let history = match self.storage.get_session_history(session_id).await {
            Ok(h) => h,
            Err(e) => return Err(abort(e.into(), round, turns)),
        };
        let mut messages = build_history_messages(&history);

        let tools = self.manager.list_all_tools().await;
        let tool_defs: Vec<ToolDefinition> = tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.spec.name.clone(),
                description: t.spec.description.clone().unwrap_or_default(),
                input_schema: t.spec.input_schema.clone(),
            })
            .collect();
        let system_prompt = self.render_system_prompt(&tools);

        let mut exit = CoordinatorExit::Completed;

        loop {
            if turns.len() as u32 >= self.config.max_turns_per_round {
                exit = CoordinatorExit::MaxTurns;
                break;
            }
            if cancel.is_cancelled() {
                exit = CoordinatorExit::Cancelled;
                break;
            }

            let request = ProviderRequest {
                system: system_prompt.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let turn_row = match self
                .storage
                .append_turn(&round.response_id, TurnPatch::default())
                .await
            {
                Ok(t) => t,
                Err(e) => return Err(abort(e.into(), round, turns)),
            };

            match self
                .run_turn(turn_row, request, approval.clone(), cancel.clone())
                .await
            {
                Ok(TurnStreamOutcome {
                    turn,
                    cancelled,
                    continue_round,
                }) => {
                    let assistant_text = turn.raw_response.clone();
                    if !assistant_text.is_empty() {
                        messages.push(ProviderMessage::assistant(assistant_text));
                    }
                    if !turn.tool_calls.is_empty() {
                        messages.push(ProviderMessage::user(
                            crate::context::render_tool_results(&turn.tool_calls),
                        ));
                    }
                    turns.push(turn);

                    if cancelled {
                        exit = CoordinatorExit::Cancelled;
                        break;
                    }
                    if !continue_round {
                        exit = CoordinatorExit::Completed;
                        break;
                    }
                }
                Err(e) => return Err(abort(e, round, turns)),
            }
        }

        Ok(RoundOutcome { round, turns, exit })
    }

    fn render_system_prompt(&self, tools: &[mandrake_mcp::CatalogedTool]) -> String {
        let system = SystemInfo::current();
        mandrake_prompt::build(&BuildInput {
            config: &self.prompt_config,
            tools,
            workspace: &self.workspace,
            system: &system,
            now: Utc::now(),
        })
    }

    /// Drive a single turn: stream the provider's response, feed it to a
    /// fresh parser, dispatch every completed tool block as it appears,
    /// and finalize with authoritative metrics once the stream ends (or
    /// is cancelled).
    async fn run_turn(
        &self,
        turn_row: Turn,
        request: ProviderRequest,
        approval: Arc<dyn ApprovalHook>,
        cancel: CancellationToken,
    ) -> Result<TurnStreamOutcome, MandrakeError> {
        let turn_id = turn_row.id.clone();
        let mut parser = StreamParser::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut blocks: Vec<Block> = Vec::new();
        let mut usage = Usage::default();
        let mut dispatched = 0usize;
        let mut last_flush = Instant::now();

        let stream_result =
            tokio::time::timeout(self.config.provider_timeout, self.provider.stream(request))
                .await;
        let mut stream = match stream_result {
            Err(_) => {
                return Err(MandrakeError::new(
                    ErrorKind::Provider(mandrake_core::ProviderErrorKind::Network),
                    "provider call timed out before streaming began",
                ))
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(s)) => s,
        };

        let deadline = tokio::time::sleep(self.config.provider_timeout);
        tokio::pin!(deadline);

        let mut cancelled = false;
        let mut stream_error: Option<MandrakeError> = None;

        'stream: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break 'stream;
                }
                _ = &mut deadline => {
                    stream_error = Some(MandrakeError::new(
                        ErrorKind::Provider(mandrake_core::ProviderErrorKind::Network),
                        "provider call exceeded its end-to-end timeout",
                    ));
                    break 'stream;
                }
                chunk = stream.next() => {
                    match chunk {
                        None => break 'stream,
                        Some(Err(e)) => {
                            stream_error = Some(e.into());
                            break 'stream;
                        }
                        Some(Ok(Chunk::End)) => break 'stream,
                        Some(Ok(Chunk::Usage(u))) => {
                            usage = u;
                        }
                        Some(Ok(Chunk::Text(text))) => {
                            blocks = parser.feed(&text);

                            dispatched = self
                                .dispatch_new_tool_blocks(
                                    &turn_id,
                                    &blocks,
                                    dispatched,
                                    &mut tool_calls,
                                    &approval,
                                    &mut last_flush,
                                )
                                .await?;

                            if last_flush.elapsed() >= self.config.persist_debounce {
                                self.flush(&turn_id, parser.raw(), &blocks, &tool_calls, None).await?;
                                last_flush = Instant::now();
                            }
                        }
                    }
                }
            }
        }

        // No outstanding tool call may survive finalization (testable
        // property 7): cancellation or a mid-stream error can both leave
        // one behind if the provider stream died between dispatch and
        // result.
        for call in tool_calls.iter_mut().filter(|c| c.result.is_none()) {
            call.result = Some(ToolResult {
                is_error: true,
                content: Value::String("cancelled before the tool call completed".to_string()),
            });
        }

        let metrics = TokenMetrics {
            input: usage.input_tokens,
            output: usage.output_tokens,
            cache_read: usage.cache_read_tokens,
            cache_write: usage.cache_write_tokens,
            cost: self.price.cost(&usage),
        };
        let finalized = self
            .flush(&turn_id, parser.raw(), &blocks, &tool_calls, Some(metrics))
            .await?;

        if let Some(error) = stream_error {
            return Err(error);
        }

        let continue_round = !cancelled && should_continue_round(&tool_calls, &blocks);
        Ok(TurnStreamOutcome {
            turn: finalized,
            cancelled,
            continue_round,
        })
    }

    /// Dispatch every `Block::Tool` at an index `>= already_dispatched`
    /// that has finished streaming (`partial == false`), in order. Each
    /// dispatch is a forced flush at both ends, per spec §4.8's "forced
    /// flush at each tool-call boundary".
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_new_tool_blocks(
        &self,
        turn_id: &mandrake_core::TurnId,
        blocks: &[Block],
        already_dispatched: usize,
        tool_calls: &mut Vec<ToolCall>,
        approval: &Arc<dyn ApprovalHook>,
        last_flush: &mut Instant,
    ) -> Result<usize, MandrakeError> {
        let complete_tool_blocks: Vec<&Block> = blocks
            .iter()
            .filter(|b| matches!(b, Block::Tool { partial: false, .. }))
            .collect();

        let mut dispatched = already_dispatched;
        while dispatched < complete_tool_blocks.len() {
            let Block::Tool {
                tool_name,
                tool_params,
                ..
            } = complete_tool_blocks[dispatched]
            else {
                unreachable!("filtered to Block::Tool above");
            };

            let (server, tool, args) = resolve_tool_call(tool_name, tool_params);
            let record = ToolCallRecord {
                server: server.clone(),
                name: tool.clone(),
                args: args.clone(),
            };
            tool_calls.push(ToolCall { call: record, result: None });

            self.flush(turn_id, "", blocks, tool_calls, None).await?;
            *last_flush = Instant::now();

            let approved = approval.approve(server.as_str(), &tool, &args).await;
            let outcome = self
                .manager
                .invoke_tool(server.as_str(), &tool, args, approved)
                .await;
            let result = match outcome {
                Ok(r) => ToolResult {
                    is_error: r.is_error,
                    content: r.content,
                },
                Err(e) => ToolResult {
                    is_error: true,
                    content: Value::String(e.to_string()),
                },
            };
            tool_calls.last_mut().expect("just pushed").result = Some(result);

            self.flush(turn_id, "", blocks, tool_calls, None).await?;
            *last_flush = Instant::now();

            dispatched += 1;
        }

        Ok(dispatched)
    }

    /// Persist the turn's current state. An empty `raw` means "don't
    /// overwrite `raw_response`" (used by the tool-dispatch flush, which
    /// only needs to update `tool_calls`); `metrics` is `Some` only at
    /// finalization.
    async fn flush(
        &self,
        turn_id: &mandrake_core::TurnId,
        raw: &str,
        blocks: &[Block],
        tool_calls: &[ToolCall],
        metrics: Option<TokenMetrics>,
    ) -> Result<Turn, MandrakeError> {
        let patch = TurnPatch {
            raw_response: if raw.is_empty() { None } else { Some(raw.to_string()) },
            content: Some(extract_text_segments(blocks)),
            tool_calls: Some(tool_calls.to_vec()),
            metrics,
        };
        self.storage
            .update_turn(turn_id, patch)
            .await
            .map_err(|e| e.into())
    }
}

struct TurnStreamOutcome {
    turn: Turn,
    cancelled: bool,
    continue_round: bool,
}

/// Per spec §4.8.f: continue the round only if the finalized turn made at
/// least one tool call and did not end with trailing free text (the
/// heuristic for "the assistant signaled it wasn't done").
fn should_continue_round(tool_calls: &[ToolCall], blocks: &[Block]) -> bool {
    if tool_calls.is_empty() {
        return false;
    }
    !matches!(blocks.last(), Some(Block::Text { .. }))
}

fn extract_text_segments(blocks: &[Block]) -> Vec<String> {
    blocks
        .iter()
        .filter_map(|b| match b {
            Block::Text { content, .. } if !content.is_empty() => Some(content.clone()),
            _ => None,
        })
        .collect()
}

/// Resolve a completed `Block::Tool` into the `{server, tool, args}` the
/// MCP manager dispatches against (spec §4.8.d).
fn resolve_tool_call(
    tool_name: &str,
    tool_params: &BTreeMap<String, ParamValue>,
) -> (ServerId, String, Value) {
    if tool_name == legacy::USE_MCP_TOOL {
        let server = tool_params
            .get("server_name")
            .and_then(param_as_str)
            .unwrap_or_default()
            .to_string();
        let tool = tool_params
            .get("tool_name")
            .and_then(param_as_str)
            .unwrap_or_default()
            .to_string();
        let args = tool_params
            .get("arguments")
            .map(param_to_value)
            .unwrap_or(Value::Null);
        (ServerId::from(server), tool, args)
    } else {
        let server = legacy::resolve_legacy_server(tool_name);
        let args = tool_params
            .iter()
            .map(|(k, v)| (k.clone(), param_to_value(v)))
            .collect::<serde_json::Map<_, _>>();
        (server, tool_name.to_string(), Value::Object(args))
    }
}

fn param_as_str(value: &ParamValue) -> Option<&str> {
    match value {
        ParamValue::Str(s) => Some(s.as_str()),
        ParamValue::Json(v) => v.as_str(),
    }
}

fn param_to_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Str(s) => Value::String(s.clone()),
        ParamValue::Json(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_only_turn_continues_the_round() {
        let tool_calls = vec![ToolCall {
            call: ToolCallRecord {
                server: "fs".into(),
                name: "read_file".into(),
                args: Value::Null,
            },
            result: Some(ToolResult { is_error: false, content: Value::Null }),
        }];
        let blocks = vec![Block::Tool {
            tool_name: "read_file".into(),
            tool_params: BTreeMap::new(),
            partial: false,
        }];
        assert!(should_continue_round(&tool_calls, &blocks));
    }

    #[test]
    fn trailing_text_after_a_tool_call_ends_the_round() {
        let tool_calls = vec![ToolCall {
            call: ToolCallRecord {
                server: "fs".into(),
                name: "read_file".into(),
                args: Value::Null,
            },
            result: Some(ToolResult { is_error: false, content: Value::Null }),
        }];
        let blocks = vec![
            Block::Tool {
                tool_name: "read_file".into(),
                tool_params: BTreeMap::new(),
                partial: false,
            },
            Block::Text { content: "done.".into(), partial: false },
        ];
        assert!(!should_continue_round(&tool_calls, &blocks));
    }

    #[test]
    fn text_only_turn_never_continues_the_round() {
        let blocks = vec![Block::Text { content: "hi".into(), partial: false }];
        assert!(!should_continue_round(&[], &blocks));
    }

    #[test]
    fn use_mcp_tool_resolves_server_and_tool_from_named_params() {
        let mut params = BTreeMap::new();
        params.insert("server_name".to_string(), ParamValue::Str("fs".into()));
        params.insert("tool_name".to_string(), ParamValue::Str("read_file".into()));
        params.insert(
            "arguments".to_string(),
            ParamValue::Json(serde_json::json!({"path": "/a.txt"})),
        );
        let (server, tool, args) = resolve_tool_call("use_mcp_tool", &params);
        assert_eq!(server.as_str(), "fs");
        assert_eq!(tool, "read_file");
        assert_eq!(args, serde_json::json!({"path": "/a.txt"}));
    }

    #[test]
    fn legacy_tool_resolves_through_the_registry_and_args_from_params() {
        let mut params = BTreeMap::new();
        params.insert("path".to_string(), ParamValue::Str("/a.txt".into()));
        let (server, tool, args) = resolve_tool_call("read_file", &params);
        assert_eq!(server.as_str(), "fs");
        assert_eq!(tool, "read_file");
        assert_eq!(args, serde_json::json!({"path": "/a.txt"}));
    }
}
