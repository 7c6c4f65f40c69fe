//! Streaming engine for Anthropic-style messages APIs.
//!
//! Speaks the `/v1/messages` wire shape (SSE with `content_block_*` /
//! `message_*` events) used by Anthropic and the Anthropic-compatible
//! endpoints several hosts expose. Transient HTTP errors retry with backoff;
//! a stream that goes silent past the idle timeout fails the attempt.

use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::error::{AgentError, AgentResult};
use crate::events::{
    AgentEvent, AgentEventKind, FinishReason, RunStatus, ToolCall, ToolResult, Usage,
};
use crate::run::bus::EventSink;
use crate::tools::executor::{truncate_for_conversation, DEFAULT_MAX_RESULT_CHARS};
use crate::tools::ToolSpec;

use super::pending::PendingCallQueue;
use super::retry::{is_retryable_status, with_retry, RetryConfig};
use super::sse::{SseFrame, SseFrameReader};
use super::{EngineDeps, EngineRequest, EngineResult, EngineRun, MessageRole, ProviderEngine};

const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// How to send the API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthHeader {
    /// `x-api-key: <key>`
    #[default]
    XApiKey,
    /// `Authorization: Bearer <key>`
    Bearer,
}

/// Engine configuration for one provider endpoint.
#[derive(Debug, Clone)]
pub struct HttpEngineConfig {
    pub provider_id: String,
    /// Full messages endpoint, e.g. `https://api.anthropic.com/v1/messages`.
    pub base_url: String,
    /// Minimum credential; absent means the provider is unavailable.
    pub api_key: Option<String>,
    pub auth_header: AuthHeader,
    /// Sent as `anthropic-version` when set.
    pub version_header: Option<String>,
    pub default_max_tokens: u32,
    pub retry: RetryConfig,
    pub stream_idle_timeout: Duration,
    /// Ceiling for tool output fed back into the conversation.
    pub max_result_chars: usize,
}

impl HttpEngineConfig {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
            api_key: None,
            auth_header: AuthHeader::default(),
            version_header: Some("2023-06-01".to_string()),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            retry: RetryConfig::default(),
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_auth_header(mut self, auth_header: AuthHeader) -> Self {
        self.auth_header = auth_header;
        self
    }
}

/// One conversation block on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

/// The streaming engine.
pub struct HttpMessagesEngine {
    config: HttpEngineConfig,
    client: reqwest::Client,
}

impl HttpMessagesEngine {
    pub fn new(config: HttpEngineConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ProviderEngine for HttpMessagesEngine {
    fn provider_id(&self) -> &str {
        &self.config.provider_id
    }

    fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn start(&self, request: EngineRequest, deps: EngineDeps) -> AgentResult<EngineRun> {
        if self.config.api_key.is_none() {
            return Err(AgentError::ProviderUnavailable(format!(
                "provider '{}' has no credentials configured",
                self.config.provider_id
            )));
        }
        let config = self.config.clone();
        let client = self.client.clone();
        let (result_tx, result_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let outcome = drive(config, client, request, deps).await;
            let _ = result_tx.send(outcome);
        });
        Ok(EngineRun::new(result_rx, handle))
    }
}

/// Build the JSON request body for one model turn.
fn build_body(
    config: &HttpEngineConfig,
    request: &EngineRequest,
    tools: &[ToolSpec],
    conversation: &[WireMessage],
) -> Value {
    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(config.default_max_tokens),
        "stream": true,
        "messages": conversation,
    });
    if let Some(system) = &request.system {
        body["system"] = Value::String(system.clone());
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(
            tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect(),
        );
    }
    if !request.metadata.is_empty() {
        body["metadata"] = Value::Object(request.metadata.clone());
    }
    body
}

/// Initial conversation from the normalized request messages.
fn initial_conversation(request: &EngineRequest) -> Vec<WireMessage> {
    request
        .messages
        .iter()
        .filter(|message| message.role != MessageRole::System)
        .map(|message| WireMessage {
            role: match message.role {
                MessageRole::Assistant => "assistant",
                _ => "user",
            },
            content: vec![WireBlock::Text {
                text: message.content.clone(),
            }],
        })
        .collect()
}

#[derive(Default)]
struct ToolUseAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// Accumulates one streamed model turn from SSE frames.
#[derive(Default)]
struct StreamAccumulator {
    text: String,
    tool_calls: Vec<ToolCall>,
    stop_reason: Option<String>,
    usage: Usage,
    // index -> in-flight tool_use block
    pending_tools: std::collections::HashMap<usize, ToolUseAccumulator>,
    responding: bool,
    done: bool,
}

impl StreamAccumulator {
    /// Apply one frame, emitting deltas through the sink.
    fn apply(&mut self, frame: &SseFrame, sink: &EventSink) -> AgentResult<()> {
        let payload: Value = match serde_json::from_str(&frame.data) {
            Ok(value) => value,
            Err(_) if frame.data == "[DONE]" => {
                self.done = true;
                return Ok(());
            }
            Err(e) => {
                return Err(AgentError::engine(format!("malformed stream frame: {e}")));
            }
        };
        let event_type = frame
            .event
            .as_deref()
            .or_else(|| payload.get("type").and_then(Value::as_str))
            .unwrap_or("");

        match event_type {
            "message_start" => {
                if let Some(input) = payload
                    .pointer("/message/usage/input_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.input_tokens = Some(input);
                }
            }
            "content_block_start" => {
                let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                if payload.pointer("/content_block/type").and_then(Value::as_str)
                    == Some("tool_use")
                {
                    self.pending_tools.insert(
                        index,
                        ToolUseAccumulator {
                            id: payload
                                .pointer("/content_block/id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            name: payload
                                .pointer("/content_block/name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            input_json: String::new(),
                        },
                    );
                }
            }
            "content_block_delta" => {
                let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                match payload.pointer("/delta/type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        let text = payload
                            .pointer("/delta/text")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        if !self.responding {
                            self.responding = true;
                            sink.emit(AgentEvent::new(AgentEventKind::Status {
                                status: RunStatus::Responding,
                                detail: None,
                            }));
                        }
                        self.text.push_str(text);
                        sink.emit(AgentEvent::new(AgentEventKind::TextDelta {
                            text: text.to_string(),
                        }));
                    }
                    Some("thinking_delta") => {
                        let text = payload
                            .pointer("/delta/thinking")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        sink.emit(AgentEvent::new(AgentEventKind::ThinkingDelta {
                            text: text.to_string(),
                        }));
                    }
                    Some("input_json_delta") => {
                        if let Some(acc) = self.pending_tools.get_mut(&index) {
                            acc.input_json.push_str(
                                payload
                                    .pointer("/delta/partial_json")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default(),
                            );
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                let index = payload.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
                if let Some(acc) = self.pending_tools.remove(&index) {
                    let args: Value = if acc.input_json.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&acc.input_json).map_err(|e| {
                            AgentError::engine(format!(
                                "tool '{}' produced malformed arguments: {e}",
                                acc.name
                            ))
                        })?
                    };
                    self.tool_calls.push(ToolCall {
                        id: acc.id,
                        tool_name: acc.name,
                        args,
                    });
                }
            }
            "message_delta" => {
                if let Some(stop) = payload
                    .pointer("/delta/stop_reason")
                    .and_then(Value::as_str)
                {
                    self.stop_reason = Some(stop.to_string());
                }
                if let Some(output) = payload
                    .pointer("/usage/output_tokens")
                    .and_then(Value::as_u64)
                {
                    self.usage.output_tokens = Some(output);
                }
            }
            "message_stop" => {
                self.done = true;
            }
            "error" => {
                let message = payload
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                return Err(AgentError::engine(format!("backend error: {message}")));
            }
            // ping and unknown event types are ignored.
            _ => {}
        }
        Ok(())
    }

    fn finalize_usage(&mut self) {
        let total = self.usage.input_tokens.unwrap_or(0) + self.usage.output_tokens.unwrap_or(0);
        if total > 0 {
            self.usage.total_tokens = Some(total);
        }
    }
}

async fn drive(
    config: HttpEngineConfig,
    client: reqwest::Client,
    request: EngineRequest,
    deps: EngineDeps,
) -> AgentResult<EngineResult> {
    let sink = deps.events.clone();
    sink.emit(AgentEvent::new(AgentEventKind::RunStart {
        run_id: request.run_id.clone(),
        provider: request.provider.clone(),
        model: request.model.clone(),
        started_at: chrono::Utc::now(),
    }));
    sink.emit(AgentEvent::new(AgentEventKind::Status {
        status: RunStatus::Thinking,
        detail: None,
    }));

    let tools: Vec<ToolSpec> = deps.tools.specs().to_vec();
    let pending = PendingCallQueue::new();
    let mut conversation = initial_conversation(&request);
    let mut all_calls: Vec<ToolCall> = Vec::new();
    let mut all_results: Vec<ToolResult> = Vec::new();
    let mut final_text = String::new();
    let mut usage = Usage::default();
    let mut steps = 0usize;

    let finish = |sink: &EventSink, reason: FinishReason| {
        sink.emit(AgentEvent::new(AgentEventKind::RunFinish {
            run_id: request.run_id.clone(),
            reason,
        }));
    };

    loop {
        if deps.controller.is_cancelled() {
            finish(&sink, FinishReason::Cancelled);
            return Ok(EngineResult {
                text: final_text,
                finish_reason: FinishReason::Cancelled,
                tool_calls: all_calls,
                tool_results: all_results,
                steps,
                usage,
            });
        }
        deps.controller.wait_if_paused().await;
        if steps > 0 && (deps.controller.stop_requested() || deps.controller.is_cancelled()) {
            finish(&sink, FinishReason::Cancelled);
            return Ok(EngineResult {
                text: final_text,
                finish_reason: FinishReason::Cancelled,
                tool_calls: all_calls,
                tool_results: all_results,
                steps,
                usage,
            });
        }
        if steps >= request.max_steps {
            finish(&sink, FinishReason::ToolCalls);
            return Ok(EngineResult {
                text: final_text,
                finish_reason: FinishReason::ToolCalls,
                tool_calls: all_calls,
                tool_results: all_results,
                steps,
                usage,
            });
        }
        steps += 1;

        let body = build_body(&config, &request, &tools, &conversation);
        let turn = match stream_one_turn(&config, &client, &body, &deps, &sink).await {
            Ok(turn) => turn,
            Err(e) => {
                sink.emit(AgentEvent::new(AgentEventKind::Error {
                    error: e.to_string(),
                    raw: None,
                }));
                let reason = if deps.controller.is_cancelled() {
                    FinishReason::Cancelled
                } else {
                    FinishReason::Error
                };
                finish(&sink, reason);
                return Err(e);
            }
        };

        final_text.push_str(&turn.text);
        if let Some(input) = turn.usage.input_tokens {
            usage.input_tokens = Some(usage.input_tokens.unwrap_or(0) + input);
        }
        if let Some(output) = turn.usage.output_tokens {
            usage.output_tokens = Some(usage.output_tokens.unwrap_or(0) + output);
        }
        usage.total_tokens =
            Some(usage.input_tokens.unwrap_or(0) + usage.output_tokens.unwrap_or(0));
        sink.emit(AgentEvent::new(AgentEventKind::Usage {
            usage: turn.usage.clone(),
        }));

        if turn.tool_calls.is_empty() {
            let reason = turn
                .stop_reason
                .as_deref()
                .map(FinishReason::from_backend)
                .unwrap_or(FinishReason::Stop);
            finish(&sink, reason);
            return Ok(EngineResult {
                text: final_text,
                finish_reason: reason,
                tool_calls: all_calls,
                tool_results: all_results,
                steps,
                usage,
            });
        }

        // Tool phase.
        sink.emit(AgentEvent::new(AgentEventKind::Status {
            status: RunStatus::Acting,
            detail: None,
        }));
        let mut assistant_blocks: Vec<WireBlock> = Vec::new();
        if !turn.text.is_empty() {
            assistant_blocks.push(WireBlock::Text {
                text: turn.text.clone(),
            });
        }
        let mut result_blocks: Vec<WireBlock> = Vec::new();
        let mut step_calls: Vec<ToolCall> = Vec::new();
        let mut step_results: Vec<ToolResult> = Vec::new();

        for streamed in &turn.tool_calls {
            let call_id = if streamed.id.is_empty() {
                pending.register(&streamed.tool_name, &streamed.args, None)
            } else {
                streamed.id.clone()
            };
            let call = ToolCall {
                id: call_id.clone(),
                tool_name: streamed.tool_name.clone(),
                args: streamed.args.clone(),
            };
            assistant_blocks.push(WireBlock::ToolUse {
                id: call_id.clone(),
                name: call.tool_name.clone(),
                input: call.args.clone(),
            });

            let result = match deps
                .tools
                .execute_from_provider(&call.tool_name, call.args.clone(), &call_id)
                .await
            {
                Ok(result) => result,
                Err(AgentError::ToolCancelled(_)) => {
                    finish(&sink, FinishReason::Cancelled);
                    return Ok(EngineResult {
                        text: final_text,
                        finish_reason: FinishReason::Cancelled,
                        tool_calls: all_calls,
                        tool_results: all_results,
                        steps,
                        usage,
                    });
                }
                Err(AgentError::ToolDenied { reason, .. }) => ToolResult::err(&call, reason),
                Err(other) => ToolResult::err(&call, other.to_string()),
            };

            let serialized = serde_json::to_string(&result.result)
                .unwrap_or_else(|_| "null".to_string());
            result_blocks.push(WireBlock::ToolResult {
                tool_use_id: call_id,
                content: truncate_for_conversation(&serialized, config.max_result_chars),
                is_error: result.is_error.then_some(true),
            });
            step_calls.push(call);
            step_results.push(result);
        }

        conversation.push(WireMessage {
            role: "assistant",
            content: assistant_blocks,
        });
        conversation.push(WireMessage {
            role: "user",
            content: result_blocks,
        });
        all_calls.extend(step_calls.clone());
        all_results.extend(step_results.clone());
        sink.emit(AgentEvent::new(AgentEventKind::StepFinish {
            index: steps - 1,
            finish_reason: FinishReason::ToolCalls,
            tool_calls: step_calls,
            tool_results: step_results,
        }));
        sink.emit(AgentEvent::new(AgentEventKind::Status {
            status: RunStatus::Thinking,
            detail: None,
        }));
    }
}

/// Issue one streaming request and accumulate the turn.
async fn stream_one_turn(
    config: &HttpEngineConfig,
    client: &reqwest::Client,
    body: &Value,
    deps: &EngineDeps,
    sink: &EventSink,
) -> AgentResult<StreamAccumulator> {
    let api_key = config
        .api_key
        .as_deref()
        .ok_or_else(|| AgentError::ProviderUnavailable("missing credentials".into()))?;

    let response = with_retry(
        &config.retry,
        |e: &AgentError| matches!(e, AgentError::Engine { message, .. } if message.starts_with("retryable")),
        || async {
            let mut builder = client.post(&config.base_url).json(body);
            builder = match config.auth_header {
                AuthHeader::XApiKey => builder.header("x-api-key", api_key),
                AuthHeader::Bearer => builder.bearer_auth(api_key),
            };
            if let Some(version) = &config.version_header {
                builder = builder.header("anthropic-version", version);
            }
            let response = builder.send().await.map_err(|e| {
                AgentError::engine(format!("retryable connection error: {e}"))
            })?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            let detail = response.text().await.unwrap_or_default();
            if is_retryable_status(status.as_u16()) {
                Err(AgentError::engine(format!(
                    "retryable backend status {status}: {detail}"
                )))
            } else {
                Err(AgentError::engine(format!(
                    "backend status {status}: {detail}"
                )))
            }
        },
    )
    .await?;

    let stream = response.bytes_stream();
    tokio::pin!(stream);
    let mut reader = SseFrameReader::new();
    let mut accumulator = StreamAccumulator::default();
    let mut signal = deps.controller.signal();

    while !accumulator.done {
        let chunk = tokio::select! {
            chunk = tokio::time::timeout(config.stream_idle_timeout, stream.next()) => {
                match chunk {
                    Ok(chunk) => chunk,
                    Err(_) => {
                        return Err(AgentError::engine(format!(
                            "stream idle for {}s",
                            config.stream_idle_timeout.as_secs()
                        )))
                    }
                }
            }
            _ = signal.cancelled() => {
                return Err(AgentError::engine("stream aborted by cancellation"));
            }
        };
        let Some(chunk) = chunk else { break };
        let bytes = chunk.map_err(|e| AgentError::engine(format!("stream read error: {e}")))?;
        for frame in reader.push(&bytes) {
            accumulator.apply(&frame, sink)?;
        }
    }
    if let Some(frame) = reader.finish() {
        accumulator.apply(&frame, sink)?;
    }
    accumulator.finalize_usage();
    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sse::SseFrame;

    fn frame(event: &str, data: Value) -> SseFrame {
        SseFrame {
            event: Some(event.to_string()),
            data: data.to_string(),
        }
    }

    #[test]
    fn body_includes_tools_system_and_temperature() {
        let config = HttpEngineConfig::new("anthropic", "https://example.test/v1/messages");
        let mut request = EngineRequest::new("r1", "anthropic", "opus-mini");
        request.system = Some("be brief".into());
        request.temperature = Some(0.2);
        let tools = vec![ToolSpec {
            name: "echo".into(),
            description: "echoes".into(),
            input_schema: json!({"type": "object"}),
        }];
        let conversation = vec![WireMessage {
            role: "user",
            content: vec![WireBlock::Text {
                text: "hello".into(),
            }],
        }];

        let body = build_body(&config, &request, &tools, &conversation);
        assert_eq!(body["model"], "opus-mini");
        assert_eq!(body["stream"], true);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["tools"][0]["name"], "echo");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
    }

    #[test]
    fn accumulator_collects_text_and_tool_calls() {
        let sink = EventSink::null();
        let mut acc = StreamAccumulator::default();

        acc.apply(
            &frame(
                "message_start",
                json!({"type": "message_start", "message": {"usage": {"input_tokens": 12}}}),
            ),
            &sink,
        )
        .unwrap();
        acc.apply(
            &frame(
                "content_block_delta",
                json!({"index": 0, "delta": {"type": "text_delta", "text": "hi "}}),
            ),
            &sink,
        )
        .unwrap();
        acc.apply(
            &frame(
                "content_block_start",
                json!({"index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "echo"}}),
            ),
            &sink,
        )
        .unwrap();
        acc.apply(
            &frame(
                "content_block_delta",
                json!({"index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"x\":"}}),
            ),
            &sink,
        )
        .unwrap();
        acc.apply(
            &frame(
                "content_block_delta",
                json!({"index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"a\"}"}}),
            ),
            &sink,
        )
        .unwrap();
        acc.apply(&frame("content_block_stop", json!({"index": 1})), &sink)
            .unwrap();
        acc.apply(
            &frame(
                "message_delta",
                json!({"delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 7}}),
            ),
            &sink,
        )
        .unwrap();
        acc.apply(&frame("message_stop", json!({})), &sink).unwrap();
        acc.finalize_usage();

        assert!(acc.done);
        assert_eq!(acc.text, "hi ");
        assert_eq!(acc.tool_calls.len(), 1);
        assert_eq!(acc.tool_calls[0].id, "toolu_1");
        assert_eq!(acc.tool_calls[0].tool_name, "echo");
        assert_eq!(acc.tool_calls[0].args, json!({"x": "a"}));
        assert_eq!(acc.stop_reason.as_deref(), Some("tool_use"));
        assert_eq!(acc.usage.total_tokens, Some(19));
    }

    #[test]
    fn accumulator_surfaces_backend_errors() {
        let sink = EventSink::null();
        let mut acc = StreamAccumulator::default();
        let err = acc
            .apply(
                &frame(
                    "error",
                    json!({"error": {"type": "overloaded_error", "message": "overloaded"}}),
                ),
                &sink,
            )
            .unwrap_err();
        assert!(err.to_string().contains("overloaded"));
    }

    #[test]
    fn empty_tool_input_defaults_to_empty_object() {
        let sink = EventSink::null();
        let mut acc = StreamAccumulator::default();
        acc.apply(
            &frame(
                "content_block_start",
                json!({"index": 0, "content_block": {"type": "tool_use", "id": "t1", "name": "ping"}}),
            ),
            &sink,
        )
        .unwrap();
        acc.apply(&frame("content_block_stop", json!({"index": 0})), &sink)
            .unwrap();
        assert_eq!(acc.tool_calls[0].args, json!({}));
    }

    #[tokio::test]
    async fn start_requires_credentials() {
        use crate::run::bus::EventBus;
        use crate::run::controller::RunController;
        use crate::tools::policy::AllowAllPolicy;
        use crate::tools::test_support::context;
        use crate::tools::ToolExecutor;
        use std::sync::Arc;

        let engine = HttpMessagesEngine::new(HttpEngineConfig::new(
            "anthropic",
            "https://example.test/v1/messages",
        ));
        let bus = EventBus::new();
        let sink = EventSink::to_bus(&bus);
        let deps = EngineDeps {
            controller: RunController::new(),
            tools: Arc::new(ToolExecutor::new(
                Vec::new(),
                Arc::new(AllowAllPolicy),
                RunController::new(),
                sink.clone(),
                context(sink.clone()),
                true,
            )),
            events: sink,
        };
        let err = engine
            .start(EngineRequest::new("r", "anthropic", "m"), deps)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
    }
}
