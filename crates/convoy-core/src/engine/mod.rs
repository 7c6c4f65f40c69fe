//! Provider engine contract.
//!
//! An engine adapts one backend to the uniform streaming + multi-step tool
//! loop. Engines emit [`AgentEvent`]s through the sink in `EngineDeps` — the
//! supervisor points that sink at the outer bus (with tool-name remapping),
//! standalone callers can point it anywhere.
//!
//! Required behaviour for any implementation:
//! 1. Emit `run_start`, then `status(thinking)`.
//! 2. Stream `thinking_delta` / `text_delta` as the backend produces them.
//! 3. Drive the tool loop: hand every model tool call to
//!    `deps.tools.execute_from_provider`, feed the serialized result back,
//!    and emit `step_finish` after each step that carried tool calls.
//!    Between steps honour `wait_if_paused`, `stop_requested`, and
//!    cancellation.
//! 4. Finish with `run_finish{reason}`; map backend stop reasons onto the
//!    unified set and override to `cancelled` when the controller aborted.
//! 5. On failure emit `error` then `run_finish` and reject the result.

pub mod http;
pub mod pending;
pub mod retry;
pub mod scripted;
pub mod sse;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{AgentError, AgentResult};
use crate::events::{FinishReason, ToolCall, ToolResult, Usage};
use crate::run::bus::EventSink;
use crate::run::controller::RunController;
use crate::tools::ToolExecutor;

/// Default bound on model turns within one attempt.
pub const DEFAULT_MAX_STEPS: usize = 12;

/// Conversation role at the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One normalized conversation message.
#[derive(Debug, Clone)]
pub struct EngineMessage {
    pub role: MessageRole,
    pub content: String,
}

impl EngineMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Everything an engine needs to run one attempt.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub run_id: String,
    pub provider: String,
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<EngineMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_steps: usize,
    pub metadata: Map<String, Value>,
}

impl EngineRequest {
    pub fn new(
        run_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            provider: provider.into(),
            model: model.into(),
            system: None,
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            max_steps: DEFAULT_MAX_STEPS,
            metadata: Map::new(),
        }
    }
}

/// Collaborators handed to the engine by the supervisor.
#[derive(Clone)]
pub struct EngineDeps {
    pub controller: RunController,
    pub tools: Arc<ToolExecutor>,
    pub events: EventSink,
}

/// Outcome of a successful attempt.
#[derive(Debug, Clone)]
pub struct EngineResult {
    pub text: String,
    pub finish_reason: FinishReason,
    /// Provider-facing names; the supervisor remaps them on egress.
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub steps: usize,
    pub usage: Usage,
}

/// Handle to a running attempt.
pub struct EngineRun {
    result: oneshot::Receiver<AgentResult<EngineResult>>,
    handle: JoinHandle<()>,
}

impl EngineRun {
    pub fn new(result: oneshot::Receiver<AgentResult<EngineResult>>, handle: JoinHandle<()>) -> Self {
        Self { result, handle }
    }

    /// Await the attempt outcome.
    pub async fn result(self) -> AgentResult<EngineResult> {
        match self.result.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentError::engine("engine task ended without a result")),
        }
    }

    /// Abort the driving task. Safe to call at any point.
    pub fn close(&self) {
        self.handle.abort();
    }
}

/// A backend adapter.
#[async_trait]
pub trait ProviderEngine: Send + Sync {
    /// Provider id this engine serves (the router's provider key).
    fn provider_id(&self) -> &str;

    /// Whether the backend's minimum credentials are configured. The
    /// supervisor treats this as provider availability.
    fn is_available(&self) -> bool {
        true
    }

    /// Validate configuration and launch the attempt.
    async fn start(&self, request: EngineRequest, deps: EngineDeps) -> AgentResult<EngineRun>;
}
