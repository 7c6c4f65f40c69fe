//! Convoy — a provider-agnostic agent run supervisor.
//!
//! Given a user request, a set of tools, a workspace, and a pool of
//! candidate model providers, the supervisor drives a streaming multi-step
//! interaction to completion: tool-use policies and approvals are enforced,
//! every state change lands on one ordered event stream, runs can be
//! paused/resumed/stopped/cancelled, and failures fail over to the next
//! candidate with transactional workspace rollback.
//!
//! Module map:
//! - **run**: supervisor, event bus, lifecycle controller
//! - **engine**: backend adapters (streaming HTTP, scripted) and the engine
//!   contract
//! - **routing**: model catalog, circuit breaker, candidate planner
//! - **tools**: tool trait, policies, name mapping, executor, built-ins
//! - **workspace**: file-effect port with journal and preview wrappers
//! - **memory**: shared bounded TTL caches
//! - **config**: injected persistence port

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod routing;
pub mod run;
pub mod tools;
pub mod workspace;

pub use error::{AgentError, AgentResult};
pub use events::{
    AgentEvent, AgentEventKind, EventMeta, FileChange, FinishReason, RunStatus, ToolCall,
    ToolResult, Usage,
};
pub use run::{
    EventBus, EventHook, EventSink, EventStream, Prompt, Run, RunController, RunHooks, RunOptions,
    RunResult, RunSupervisor, SupervisorOptions, ToolCallAggregator, WorkspaceMode,
};
