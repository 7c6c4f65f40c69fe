//! Tool executor: policy decision, approval gating, dispatch, and error
//! containment.
//!
//! Engines hand every model-requested invocation to
//! [`ToolExecutor::execute_from_provider`]. Execution failures are converted
//! into error results — the provider loop must always see a result to
//! continue stably. Denials and cancellations surface as typed errors so the
//! engine can distinguish "feed back a refusal" from "abort the run".
//!
//! All events emitted here carry provider-facing tool names; the
//! supervisor's egress sink rewrites them to original names.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AgentError, AgentResult};
use crate::events::{AgentEvent, AgentEventKind, ToolCall, ToolResult};
use crate::run::bus::EventSink;
use crate::run::controller::RunController;

use super::policy::{PolicyDecision, ToolPolicy};
use super::{Tool, ToolExecutionContext, ToolSpec};

/// Default ceiling for tool output fed back into the model conversation.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 30_000;

/// Per-run tool dispatcher.
pub struct ToolExecutor {
    /// Tools keyed by provider-facing name.
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Provider-facing specs in registration order.
    specs: Vec<ToolSpec>,
    policy: Arc<dyn ToolPolicy>,
    controller: RunController,
    sink: EventSink,
    ctx: ToolExecutionContext,
    /// When false, an engine that natively emits call/result pairs is
    /// trusted to do so and the executor stays silent (approval requests are
    /// always emitted here — engines cannot).
    emit_tool_events: bool,
}

impl ToolExecutor {
    pub fn new(
        table: Vec<(String, Arc<dyn Tool>)>,
        policy: Arc<dyn ToolPolicy>,
        controller: RunController,
        sink: EventSink,
        ctx: ToolExecutionContext,
        emit_tool_events: bool,
    ) -> Self {
        let mut tools = HashMap::with_capacity(table.len());
        let mut specs = Vec::with_capacity(table.len());
        for (provider_name, tool) in table {
            specs.push(ToolSpec {
                name: provider_name.clone(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            });
            tools.insert(provider_name, tool);
        }
        Self {
            tools,
            specs,
            policy,
            controller,
            sink,
            ctx,
            emit_tool_events,
        }
    }

    /// Provider-facing tool specs for the engine request.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    /// Execute one model-requested tool call.
    ///
    /// `tool_name` is the provider-facing name. Returns the result to feed
    /// back into the conversation, or:
    /// - [`AgentError::ToolDenied`] when policy or the user refused,
    /// - [`AgentError::ToolCancelled`] when the run was cancelled.
    pub async fn execute_from_provider(
        &self,
        tool_name: &str,
        args: Value,
        call_id: &str,
    ) -> AgentResult<ToolResult> {
        let Some(tool) = self.tools.get(tool_name) else {
            return Err(AgentError::denied(format!("Unknown tool '{tool_name}'")));
        };

        self.controller.guard_tool_execution(tool_name).await?;

        let call = ToolCall {
            id: call_id.to_string(),
            tool_name: tool_name.to_string(),
            args: args.clone(),
        };

        match self.policy.decide(tool.as_ref(), &args) {
            PolicyDecision::Allow => {}
            PolicyDecision::Deny { reason } => {
                tracing::info!(tool = tool_name, %reason, "tool denied by policy");
                return Err(AgentError::denied_by(reason, self.policy.name()));
            }
            PolicyDecision::Ask { reason } => {
                tracing::info!(tool = tool_name, %reason, "tool awaiting approval");
                // Register before emitting so a consumer reacting to the
                // event always finds the rendezvous.
                let pending = self.controller.begin_approval(call_id);
                self.sink
                    .emit(AgentEvent::new(AgentEventKind::ToolApprovalRequest {
                        call: call.clone(),
                        reason: Some(reason),
                        policy: Some(self.policy.name().to_string()),
                    }));
                if !pending.wait().await {
                    return Err(AgentError::denied_by(
                        "User denied approval",
                        self.policy.name(),
                    ));
                }
            }
        }

        if self.emit_tool_events {
            self.sink.emit(AgentEvent::new(AgentEventKind::ToolCall {
                call: call.clone(),
            }));
        }

        let result = match tool.execute(args, &self.ctx).await {
            Ok(value) => ToolResult::ok(&call, value),
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "tool execution failed");
                ToolResult::err(&call, e.to_string())
            }
        };

        if self.emit_tool_events {
            self.sink.emit(AgentEvent::new(AgentEventKind::ToolResult {
                result: result.clone(),
            }));
        }

        Ok(result)
    }
}

/// Cap a serialized tool result for conversation feedback. The event stream
/// always carries the full result; only the model-facing copy is elided.
pub fn truncate_for_conversation(serialized: &str, max_chars: usize) -> String {
    if serialized.chars().count() <= max_chars {
        return serialized.to_string();
    }
    let kept: String = serialized.chars().take(max_chars).collect();
    format!("{kept}\n…[output truncated]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AgentEventKind;
    use crate::run::bus::EventBus;
    use crate::tools::policy::{AllowAllPolicy, CapabilityApprovalPolicy, DenyAllPolicy};
    use crate::tools::test_support::context;
    use crate::tools::{caps, FnTool};
    use serde_json::json;

    fn echo_tool() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "echo",
            "echoes input",
            json!({"type": "object", "properties": {"x": {"type": "string"}}}),
            |args, _| async move { Ok(json!({"y": args["x"]})) },
        ))
    }

    fn failing_tool() -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            "explode",
            "always fails",
            json!({"type": "object"}),
            |_, _| async { anyhow::bail!("internal failure") },
        ))
    }

    fn writer_tool() -> Arc<dyn Tool> {
        Arc::new(
            FnTool::new("writer", "writes", json!({"type": "object"}), |_, _| async {
                Ok(json!({"ok": true}))
            })
            .with_capabilities(vec![caps::FS_WRITE]),
        )
    }

    fn executor_with(
        tool: Arc<dyn Tool>,
        policy: Arc<dyn ToolPolicy>,
        bus: &EventBus,
        controller: RunController,
    ) -> ToolExecutor {
        let sink = EventSink::to_bus(bus);
        let name = tool.name().to_string();
        ToolExecutor::new(
            vec![(name, tool)],
            policy,
            controller,
            sink.clone(),
            context(sink),
            true,
        )
    }

    #[tokio::test]
    async fn allow_path_emits_call_then_result() {
        let bus = EventBus::new();
        let stream = bus.events();
        let executor = executor_with(
            echo_tool(),
            Arc::new(AllowAllPolicy),
            &bus,
            RunController::new(),
        );

        let result = executor
            .execute_from_provider("echo", json!({"x": "a"}), "call-1")
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.result, json!({"y": "a"}));
        bus.close(None);

        let events = stream.collect().await;
        assert!(matches!(events[0].kind, AgentEventKind::ToolCall { .. }));
        assert!(matches!(events[1].kind, AgentEventKind::ToolResult { .. }));
    }

    #[tokio::test]
    async fn unknown_tool_is_denied_without_events() {
        let bus = EventBus::new();
        let stream = bus.events();
        let executor = executor_with(
            echo_tool(),
            Arc::new(AllowAllPolicy),
            &bus,
            RunController::new(),
        );

        let err = executor
            .execute_from_provider("missing", json!({}), "call-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolDenied { .. }));
        bus.close(None);
        assert!(stream.collect().await.is_empty());
    }

    #[tokio::test]
    async fn policy_denial_emits_nothing() {
        let bus = EventBus::new();
        let stream = bus.events();
        let executor = executor_with(echo_tool(), Arc::new(DenyAllPolicy), &bus, RunController::new());

        let err = executor
            .execute_from_provider("echo", json!({}), "call-1")
            .await
            .unwrap_err();
        assert!(
            matches!(err, AgentError::ToolDenied { policy: Some(ref p), .. } if p == "deny_all")
        );
        bus.close(None);
        assert!(stream.collect().await.is_empty());
    }

    #[tokio::test]
    async fn execution_failure_becomes_error_result() {
        let bus = EventBus::new();
        let executor = executor_with(
            failing_tool(),
            Arc::new(AllowAllPolicy),
            &bus,
            RunController::new(),
        );

        let result = executor
            .execute_from_provider("explode", json!({}), "call-1")
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.result.as_str().unwrap().contains("internal failure"));
    }

    #[tokio::test]
    async fn approval_request_precedes_tool_call() {
        let bus = EventBus::new();
        let stream = bus.events();
        let controller = RunController::new();
        let executor = executor_with(
            writer_tool(),
            Arc::new(CapabilityApprovalPolicy::new([caps::FS_WRITE])),
            &bus,
            controller.clone(),
        );

        let approve = controller.clone();
        let handle = tokio::spawn(async move {
            executor
                .execute_from_provider("writer", json!({}), "call-9")
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        approve.resolve_approval("call-9", true);

        let result = handle.await.unwrap().unwrap();
        assert!(!result.is_error);
        bus.close(None);

        let kinds: Vec<&'static str> = stream
            .collect()
            .await
            .iter()
            .map(|e| match e.kind {
                AgentEventKind::ToolApprovalRequest { .. } => "approval",
                AgentEventKind::ToolCall { .. } => "call",
                AgentEventKind::ToolResult { .. } => "result",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["approval", "call", "result"]);
    }

    #[tokio::test]
    async fn denied_approval_raises_tool_denied() {
        let bus = EventBus::new();
        let controller = RunController::new();
        let executor = executor_with(
            writer_tool(),
            Arc::new(CapabilityApprovalPolicy::new([caps::FS_WRITE])),
            &bus,
            controller.clone(),
        );

        let deny = controller.clone();
        let handle = tokio::spawn(async move {
            executor
                .execute_from_provider("writer", json!({}), "call-9")
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        deny.resolve_approval("call-9", false);

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::ToolDenied { .. }));
    }

    #[tokio::test]
    async fn cancelled_controller_blocks_execution() {
        let bus = EventBus::new();
        let controller = RunController::new();
        controller.cancel(None);
        let executor = executor_with(echo_tool(), Arc::new(AllowAllPolicy), &bus, controller);

        let err = executor
            .execute_from_provider("echo", json!({}), "call-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolCancelled(_)));
    }

    #[test]
    fn truncation_appends_marker() {
        let long = "a".repeat(100);
        let cut = truncate_for_conversation(&long, 10);
        assert!(cut.starts_with("aaaaaaaaaa"));
        assert!(cut.ends_with("[output truncated]"));
        assert_eq!(truncate_for_conversation("short", 10), "short");
    }
}
