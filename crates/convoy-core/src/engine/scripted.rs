//! Deterministic in-process engine.
//!
//! Replays a scripted sequence of model turns — thinking/text deltas, tool
//! calls, or a mid-run failure — through the full engine contract. The
//! integration suite drives every supervisor scenario with it; SDK consumers
//! can use it to test their own tools and policies offline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{AgentError, AgentResult};
use crate::events::{
    AgentEvent, AgentEventKind, FinishReason, RunStatus, ToolCall, ToolResult, Usage,
};
use crate::run::bus::EventSink;

use super::pending::PendingCallQueue;
use super::{EngineDeps, EngineRequest, EngineResult, EngineRun, ProviderEngine};

/// A tool call the scripted model makes.
#[derive(Debug, Clone)]
pub struct ScriptToolCall {
    pub tool_name: String,
    pub args: Value,
}

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum ScriptTurn {
    /// Stream deltas, then make the listed tool calls (possibly none).
    Respond {
        thinking: Vec<String>,
        text: Vec<String>,
        tool_calls: Vec<ScriptToolCall>,
    },
    /// Simulate a backend failure.
    Fail { message: String },
}

/// Deterministic engine for a given provider id.
pub struct ScriptedEngine {
    provider: String,
    turns: Arc<Vec<ScriptTurn>>,
}

impl ScriptedEngine {
    pub fn new(provider: impl Into<String>, turns: Vec<ScriptTurn>) -> Self {
        Self {
            provider: provider.into(),
            turns: Arc::new(turns),
        }
    }

    /// Engine that streams `text` and finishes.
    pub fn responding(provider: impl Into<String>, text: &str) -> Self {
        Self::new(
            provider,
            vec![ScriptTurn::Respond {
                thinking: Vec::new(),
                text: vec![text.to_string()],
                tool_calls: Vec::new(),
            }],
        )
    }

    /// Engine that fails immediately.
    pub fn failing(provider: impl Into<String>, message: &str) -> Self {
        Self::new(
            provider,
            vec![ScriptTurn::Fail {
                message: message.to_string(),
            }],
        )
    }
}

#[async_trait]
impl ProviderEngine for ScriptedEngine {
    fn provider_id(&self) -> &str {
        &self.provider
    }

    async fn start(&self, request: EngineRequest, deps: EngineDeps) -> AgentResult<EngineRun> {
        let turns = Arc::clone(&self.turns);
        let (result_tx, result_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let outcome = drive(turns, request, deps).await;
            let _ = result_tx.send(outcome);
        });
        Ok(EngineRun::new(result_rx, handle))
    }
}

struct TurnOutput {
    calls: Vec<ToolCall>,
    results: Vec<ToolResult>,
}

async fn drive(
    turns: Arc<Vec<ScriptTurn>>,
    request: EngineRequest,
    deps: EngineDeps,
) -> AgentResult<EngineResult> {
    let sink = deps.events.clone();
    sink.emit(AgentEvent::new(AgentEventKind::RunStart {
        run_id: request.run_id.clone(),
        provider: request.provider.clone(),
        model: request.model.clone(),
        started_at: Utc::now(),
    }));
    sink.emit(status(RunStatus::Thinking, None));

    let pending = PendingCallQueue::new();
    let mut text = String::new();
    let mut all_calls: Vec<ToolCall> = Vec::new();
    let mut all_results: Vec<ToolResult> = Vec::new();
    let mut steps = 0usize;
    let mut responding = false;

    for (step_index, turn) in turns.iter().enumerate() {
        if deps.controller.is_cancelled() {
            return finish(&sink, &request, text, all_calls, all_results, steps, FinishReason::Cancelled);
        }
        deps.controller.wait_if_paused().await;
        if deps.controller.is_cancelled() {
            return finish(&sink, &request, text, all_calls, all_results, steps, FinishReason::Cancelled);
        }
        if step_index > 0 && deps.controller.stop_requested() {
            tracing::info!(run_id = %request.run_id, "stop requested; exiting at step boundary");
            return finish(&sink, &request, text, all_calls, all_results, steps, FinishReason::Cancelled);
        }
        if steps >= request.max_steps {
            return finish(&sink, &request, text, all_calls, all_results, steps, FinishReason::ToolCalls);
        }
        steps += 1;

        let turn = match turn {
            ScriptTurn::Fail { message } => {
                sink.emit(AgentEvent::new(AgentEventKind::Error {
                    error: message.clone(),
                    raw: None,
                }));
                sink.emit(AgentEvent::new(AgentEventKind::RunFinish {
                    run_id: request.run_id.clone(),
                    reason: FinishReason::Error,
                }));
                return Err(AgentError::engine(message.clone()));
            }
            ScriptTurn::Respond {
                thinking,
                text: deltas,
                tool_calls,
            } => (thinking, deltas, tool_calls),
        };
        let (thinking, deltas, tool_calls) = turn;

        for delta in thinking {
            sink.emit(AgentEvent::new(AgentEventKind::ThinkingDelta {
                text: delta.clone(),
            }));
        }
        for delta in deltas {
            if !responding {
                responding = true;
                sink.emit(status(RunStatus::Responding, None));
            }
            text.push_str(delta);
            sink.emit(AgentEvent::new(AgentEventKind::TextDelta {
                text: delta.clone(),
            }));
        }

        if tool_calls.is_empty() {
            continue;
        }

        sink.emit(status(RunStatus::Acting, None));
        let output = match run_tools(&deps, &pending, tool_calls).await {
            Ok(output) => output,
            Err(e) if e.is_cancellation() => {
                return finish(
                    &sink,
                    &request,
                    text,
                    all_calls,
                    all_results,
                    steps,
                    FinishReason::Cancelled,
                );
            }
            Err(e) => return Err(e),
        };
        let step_calls = output.calls;
        let step_results = output.results;
        all_calls.extend(step_calls.clone());
        all_results.extend(step_results.clone());
        sink.emit(AgentEvent::new(AgentEventKind::StepFinish {
            index: step_index,
            finish_reason: FinishReason::ToolCalls,
            tool_calls: step_calls,
            tool_results: step_results,
        }));
    }

    finish(&sink, &request, text, all_calls, all_results, steps, FinishReason::Stop)
}

async fn run_tools(
    deps: &EngineDeps,
    pending: &PendingCallQueue,
    tool_calls: &[ScriptToolCall],
) -> AgentResult<TurnOutput> {
    let mut calls = Vec::with_capacity(tool_calls.len());
    let mut results = Vec::with_capacity(tool_calls.len());

    for scripted in tool_calls {
        let call_id = pending.register(&scripted.tool_name, &scripted.args, None);
        let call = ToolCall {
            id: call_id.clone(),
            tool_name: scripted.tool_name.clone(),
            args: scripted.args.clone(),
        };
        match deps
            .tools
            .execute_from_provider(&scripted.tool_name, scripted.args.clone(), &call_id)
            .await
        {
            Ok(result) => {
                calls.push(call);
                results.push(result);
            }
            Err(AgentError::ToolCancelled(name)) => {
                return Err(AgentError::ToolCancelled(name));
            }
            Err(AgentError::ToolDenied { reason, .. }) => {
                // Denials feed back as error results so the loop stays
                // stable; no call/result events were emitted for them.
                calls.push(call.clone());
                results.push(ToolResult::err(&call, reason));
            }
            Err(other) => {
                calls.push(call.clone());
                results.push(ToolResult::err(&call, other.to_string()));
            }
        }
        let _ = pending.resolve(&scripted.tool_name, &scripted.args);
    }

    Ok(TurnOutput { calls, results })
}

fn status(status: RunStatus, detail: Option<String>) -> AgentEvent {
    AgentEvent::new(AgentEventKind::Status { status, detail })
}

#[allow(clippy::too_many_arguments)]
fn finish(
    sink: &EventSink,
    request: &EngineRequest,
    text: String,
    tool_calls: Vec<ToolCall>,
    tool_results: Vec<ToolResult>,
    steps: usize,
    reason: FinishReason,
) -> AgentResult<EngineResult> {
    sink.emit(AgentEvent::new(AgentEventKind::RunFinish {
        run_id: request.run_id.clone(),
        reason,
    }));
    Ok(EngineResult {
        text,
        finish_reason: reason,
        tool_calls,
        tool_results,
        steps,
        usage: Usage::default(),
    })
}
