//! Run supervisor: owns a run end to end.
//!
//! `run` assembles the tool surface (filesystem + memory + retrieval + user
//! tools), applies the provider name policy, plans candidates from
//! availability and breaker-aware scores, then executes attempts in order.
//! Live attempts run against a fresh journal that commits on success and
//! rolls back on failure; preview mode shares one overlay across attempts
//! and leaves it for an explicit commit. Terminal event bracketing
//! (`run_start` first, `run_finish` last) is owned here — engine-emitted
//! brackets are filtered at the egress sink so failover attempts cannot
//! double-emit them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, OnceCell};
use uuid::Uuid;

use crate::config::{ConfigStore, BREAKER_STATE_KEY};
use crate::engine::{
    EngineDeps, EngineMessage, EngineRequest, MessageRole, ProviderEngine, DEFAULT_MAX_STEPS,
};
use crate::error::{AgentError, AgentResult};
use crate::events::{
    AgentEvent, AgentEventKind, EventMeta, FinishReason, RunStatus, ToolCall, ToolResult, Usage,
};
use crate::memory::MemoryPool;
use crate::routing::{
    BreakerSnapshot, CircuitBreaker, ModelCatalog, ModelClass, ModelRouter, RouteCandidate,
    RouteConstraints, RoutePreference,
};
use crate::tools::builtin::{filesystem_tools, memory_tools, retrieval_tools, Retriever};
use crate::tools::names::{apply_name_policy, NameMapping, ToolNamePolicy};
use crate::tools::policy::{AllowAllPolicy, ToolPolicy};
use crate::tools::{Tool, ToolExecutionContext, ToolExecutor};
use crate::workspace::journal::JournalWorkspace;
use crate::workspace::preview::PreviewWorkspace;
use crate::workspace::{MemoryWorkspace, Workspace};

use super::aggregator::ToolCallAggregator;
use super::bus::{EventBus, EventHook, EventSink, EventStream};
use super::controller::RunController;

const DEFAULT_MEMORY_NAMESPACE: &str = "shared";

/// How file effects are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceMode {
    /// Effects hit the base workspace, journalled per attempt.
    #[default]
    Live,
    /// Effects buffer in one overlay until `Run::commit_preview`.
    Preview,
}

/// The user request.
#[derive(Debug, Clone)]
pub enum Prompt {
    Text(String),
    Messages(Vec<EngineMessage>),
}

impl Default for Prompt {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Caller hooks onto the run's event stream.
#[derive(Default, Clone)]
pub struct RunHooks {
    pub on_event: Vec<Arc<dyn EventHook>>,
    pub on_text_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub on_thinking_delta: Option<Arc<dyn Fn(&str) + Send + Sync>>,
    pub session_updates: Option<Arc<ToolCallAggregator>>,
}

/// Everything `run` accepts.
pub struct RunOptions {
    pub prompt: Prompt,
    pub system: Option<String>,
    /// Explicitly requested provider, tried first when available.
    pub provider: Option<String>,
    /// Explicitly requested model, pinned across providers.
    pub model: Option<String>,
    pub model_class: ModelClass,
    pub preferred_providers: Vec<String>,
    pub allow_fallback: bool,
    pub constraints: RouteConstraints,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_steps: usize,
    pub workspace: Option<Arc<dyn Workspace>>,
    pub mode: WorkspaceMode,
    pub policy: Option<Arc<dyn ToolPolicy>>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub retriever: Option<Arc<dyn Retriever>>,
    pub name_policy: ToolNamePolicy,
    pub memory_namespace: Option<String>,
    pub metadata: Map<String, Value>,
    pub meta: Option<EventMeta>,
    pub hooks: RunHooks,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            prompt: Prompt::default(),
            system: None,
            provider: None,
            model: None,
            model_class: ModelClass::Default,
            preferred_providers: Vec::new(),
            allow_fallback: true,
            constraints: RouteConstraints::default(),
            temperature: None,
            max_tokens: None,
            max_steps: DEFAULT_MAX_STEPS,
            workspace: None,
            mode: WorkspaceMode::Live,
            policy: None,
            tools: Vec::new(),
            retriever: None,
            name_policy: ToolNamePolicy::default(),
            memory_namespace: None,
            metadata: Map::new(),
            meta: None,
            hooks: RunHooks::default(),
        }
    }
}

impl RunOptions {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Prompt::Text(prompt.into()),
            ..Default::default()
        }
    }
}

/// Final outcome of a run. Tool names are original (pre-sanitise) names.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub text: String,
    pub finish_reason: FinishReason,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub steps: usize,
    pub usage: Usage,
}

/// Handle to a launched run.
pub struct Run {
    pub run_id: String,
    controller: RunController,
    bus: EventBus,
    primary_events: Mutex<Option<EventStream>>,
    result: Mutex<Option<oneshot::Receiver<AgentResult<RunResult>>>>,
    preview: Option<Arc<PreviewWorkspace>>,
}

impl Run {
    /// The run's ordered event stream. The first call returns a stream
    /// subscribed before launch (no events are missed); later calls
    /// subscribe from the current point.
    pub fn events(&self) -> EventStream {
        self.primary_events
            .lock()
            .expect("run lock")
            .take()
            .unwrap_or_else(|| self.bus.events())
    }

    /// Await the final result. Single use.
    pub async fn result(&self) -> AgentResult<RunResult> {
        let receiver = self
            .result
            .lock()
            .expect("run lock")
            .take()
            .ok_or_else(|| AgentError::Config("run result already consumed".into()))?;
        receiver
            .await
            .map_err(|_| AgentError::engine("run task ended without a result"))?
    }

    pub fn controller(&self) -> &RunController {
        &self.controller
    }

    pub fn pause(&self) {
        self.controller.pause();
    }

    pub fn resume(&self) {
        self.controller.resume();
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    pub fn cancel(&self, reason: Option<String>) {
        self.controller.cancel(reason);
    }

    /// Resolve a pending tool approval.
    pub fn approve_tool_call(&self, call_id: &str, allowed: bool) -> bool {
        self.controller.resolve_approval(call_id, allowed)
    }

    /// Apply the preview overlay to the base workspace (preview mode only).
    pub async fn commit_preview(&self) -> AgentResult<()> {
        match &self.preview {
            Some(preview) => preview
                .commit()
                .await
                .map_err(|e| AgentError::Config(format!("preview commit failed: {e}"))),
            None => Err(AgentError::Config("run is not in preview mode".into())),
        }
    }

    /// Drop the preview overlay (preview mode only).
    pub fn discard_preview(&self) -> AgentResult<()> {
        match &self.preview {
            Some(preview) => {
                preview.discard();
                Ok(())
            }
            None => Err(AgentError::Config("run is not in preview mode".into())),
        }
    }
}

/// Supervisor construction options.
pub struct SupervisorOptions {
    pub engines: Vec<Arc<dyn ProviderEngine>>,
    pub catalog: Arc<ModelCatalog>,
    pub breaker: Arc<CircuitBreaker>,
    pub memory: Arc<MemoryPool>,
    pub config_store: Option<Arc<dyn ConfigStore>>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            engines: Vec::new(),
            catalog: Arc::new(ModelCatalog::new()),
            breaker: Arc::new(CircuitBreaker::new(Default::default())),
            memory: Arc::new(MemoryPool::default()),
            config_store: None,
        }
    }
}

/// Top-level orchestrator. One instance serves many concurrent runs.
pub struct RunSupervisor {
    engines: HashMap<String, Arc<dyn ProviderEngine>>,
    catalog: Arc<ModelCatalog>,
    breaker: Arc<CircuitBreaker>,
    memory: Arc<MemoryPool>,
    config_store: Option<Arc<dyn ConfigStore>>,
    breaker_loaded: OnceCell<()>,
    persist_tx: Mutex<Option<mpsc::UnboundedSender<BreakerSnapshot>>>,
}

impl RunSupervisor {
    pub fn new(options: SupervisorOptions) -> Arc<Self> {
        let engines = options
            .engines
            .into_iter()
            .map(|engine| (engine.provider_id().to_string(), engine))
            .collect();
        Arc::new(Self {
            engines,
            catalog: options.catalog,
            breaker: options.breaker,
            memory: options.memory,
            config_store: options.config_store,
            breaker_loaded: OnceCell::new(),
            persist_tx: Mutex::new(None),
        })
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }

    /// Launch a run. Returns immediately; the attempt loop runs as a task.
    pub fn run(self: &Arc<Self>, options: RunOptions) -> Run {
        let run_id = format!("run_{}", Uuid::new_v4().simple());
        let controller = RunController::new();
        let bus = EventBus::new();

        for hook in &options.hooks.on_event {
            bus.subscribe(Arc::clone(hook));
        }
        if let Some(on_text) = options.hooks.on_text_delta.clone() {
            bus.subscribe(Arc::new(move |event: &AgentEvent| -> anyhow::Result<()> {
                if let AgentEventKind::TextDelta { text } = &event.kind {
                    on_text(text);
                }
                Ok(())
            }));
        }
        if let Some(on_thinking) = options.hooks.on_thinking_delta.clone() {
            bus.subscribe(Arc::new(move |event: &AgentEvent| -> anyhow::Result<()> {
                if let AgentEventKind::ThinkingDelta { text } = &event.kind {
                    on_thinking(text);
                }
                Ok(())
            }));
        }
        if let Some(aggregator) = options.hooks.session_updates.clone() {
            bus.subscribe(aggregator);
        }

        let primary_events = bus.events();

        let base: Arc<dyn Workspace> = options
            .workspace
            .clone()
            .unwrap_or_else(|| Arc::new(MemoryWorkspace::new()));
        let preview = match options.mode {
            WorkspaceMode::Preview => Some(Arc::new(PreviewWorkspace::new(base.clone()))),
            WorkspaceMode::Live => None,
        };

        let (result_tx, result_rx) = oneshot::channel();
        let supervisor = Arc::clone(self);
        let task_controller = controller.clone();
        let task_bus = bus.clone();
        let task_preview = preview.clone();
        let task_run_id = run_id.clone();
        tokio::spawn(async move {
            let attempt = RunAttempt {
                supervisor,
                run_id: task_run_id.clone(),
                controller: task_controller,
                bus: task_bus.clone(),
                base,
                preview: task_preview,
                options,
                run_start_emitted: AtomicBool::new(false),
            };
            let outcome = attempt.run_with_failover().await;

            match &outcome {
                Ok(result) => {
                    attempt.emit(AgentEventKind::RunFinish {
                        run_id: task_run_id.clone(),
                        reason: result.finish_reason,
                    });
                    task_bus.close(None);
                }
                Err(error) => {
                    attempt.ensure_run_start(None);
                    attempt.emit(AgentEventKind::Error {
                        error: error.to_string(),
                        raw: None,
                    });
                    attempt.emit(AgentEventKind::RunFinish {
                        run_id: task_run_id.clone(),
                        reason: FinishReason::Error,
                    });
                    task_bus.close(Some(error.to_string()));
                }
            }
            let _ = result_tx.send(outcome);
        });

        Run {
            run_id,
            controller,
            bus,
            primary_events: Mutex::new(Some(primary_events)),
            result: Mutex::new(Some(result_rx)),
            preview,
        }
    }

    /// Load persisted breaker state once per supervisor instance.
    async fn load_breaker_state(&self) {
        self.breaker_loaded
            .get_or_init(|| async {
                let Some(store) = &self.config_store else {
                    return;
                };
                match store.get(BREAKER_STATE_KEY).await {
                    Ok(Some(value)) => match serde_json::from_value::<BreakerSnapshot>(value) {
                        Ok(snapshot) => self.breaker.restore(snapshot),
                        Err(e) => {
                            tracing::warn!(error = %e, "ignoring malformed breaker snapshot")
                        }
                    },
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "breaker snapshot load failed"),
                }
            })
            .await;
    }

    /// Queue a breaker snapshot write. Writes are serialized by a single
    /// worker so overlapping runs cannot interleave snapshots.
    fn persist_breaker_state(&self) {
        let Some(store) = self.config_store.clone() else {
            return;
        };
        let mut guard = self.persist_tx.lock().expect("persist lock");
        let tx = guard.get_or_insert_with(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<BreakerSnapshot>();
            tokio::spawn(async move {
                while let Some(snapshot) = rx.recv().await {
                    match serde_json::to_value(&snapshot) {
                        Ok(value) => {
                            if let Err(e) = store.set(BREAKER_STATE_KEY, value).await {
                                tracing::warn!(error = %e, "breaker snapshot write failed");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "breaker snapshot serialize failed")
                        }
                    }
                }
            });
            tx
        });
        let _ = tx.send(self.breaker.snapshot());
    }
}

/// State for one launched run's attempt loop.
struct RunAttempt {
    supervisor: Arc<RunSupervisor>,
    run_id: String,
    controller: RunController,
    bus: EventBus,
    base: Arc<dyn Workspace>,
    preview: Option<Arc<PreviewWorkspace>>,
    options: RunOptions,
    run_start_emitted: AtomicBool,
}

impl RunAttempt {
    fn emit(&self, kind: AgentEventKind) {
        self.bus
            .emit(AgentEvent::with_meta(kind, self.options.meta.clone()));
    }

    fn ensure_run_start(&self, candidate: Option<&RouteCandidate>) {
        if self.run_start_emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(AgentEventKind::RunStart {
            run_id: self.run_id.clone(),
            provider: candidate
                .map(|c| c.provider.clone())
                .or_else(|| self.options.provider.clone())
                .unwrap_or_else(|| "auto".to_string()),
            model: candidate
                .map(|c| c.model.clone())
                .or_else(|| self.options.model.clone())
                .unwrap_or_else(|| "auto".to_string()),
            started_at: Utc::now(),
        });
    }

    async fn run_with_failover(&self) -> AgentResult<RunResult> {
        // Tool surface: built-ins first, then user tools.
        let mut raw_tools: Vec<Arc<dyn Tool>> = filesystem_tools();
        raw_tools.extend(memory_tools());
        if let Some(retriever) = &self.options.retriever {
            raw_tools.extend(retrieval_tools(Arc::clone(retriever)));
        }
        raw_tools.extend(self.options.tools.iter().cloned());

        let (tool_table, mapping) = apply_name_policy(&raw_tools, self.options.name_policy)?;

        let messages = normalize_messages(&self.options.prompt);

        let availability: HashMap<String, bool> = self
            .supervisor
            .engines
            .iter()
            .map(|(provider, engine)| (provider.clone(), engine.is_available()))
            .collect();

        self.supervisor.load_breaker_state().await;

        let preference = RoutePreference {
            provider: self.options.provider.clone(),
            model: self.options.model.clone(),
            class: self.options.model_class,
            preferred_providers: self.options.preferred_providers.clone(),
            allow_fallback: self.options.allow_fallback,
        };
        let breaker = Arc::clone(&self.supervisor.breaker);
        let score = move |candidate: &RouteCandidate| -> u64 {
            let (latency, cost) = candidate
                .profile
                .as_ref()
                .map(|p| (p.latency_rank, p.cost_rank))
                .unwrap_or((50, 50));
            u64::from(latency) * 10 + u64::from(cost) + breaker.penalty(&candidate.reference)
        };
        let router = ModelRouter::new(Arc::clone(&self.supervisor.catalog));
        let plan = router.plan(&availability, &preference, &self.options.constraints, Some(&score));

        if plan.is_empty() {
            return Err(AgentError::Config(
                "no provider candidates available".into(),
            ));
        }

        self.ensure_run_start(plan.candidates.first());
        self.emit(AgentEventKind::Status {
            status: RunStatus::Initialising,
            detail: Some(format!("candidates: {}", plan.references().join(", "))),
        });

        let policy: Arc<dyn ToolPolicy> = self
            .options
            .policy
            .clone()
            .unwrap_or_else(|| Arc::new(AllowAllPolicy));
        let memory_scope = self.supervisor.memory.scope(
            self.options
                .memory_namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_MEMORY_NAMESPACE.to_string()),
        );

        let mut last_error: Option<AgentError> = None;

        for candidate in &plan.candidates {
            if self.controller.is_cancelled() {
                break;
            }
            let Some(engine) = self.supervisor.engines.get(&candidate.provider) else {
                tracing::warn!(provider = %candidate.provider, "no engine registered; skipping");
                last_error = Some(AgentError::ProviderUnavailable(format!(
                    "no engine registered for provider '{}'",
                    candidate.provider
                )));
                continue;
            };

            tracing::info!(
                run_id = %self.run_id,
                reference = %candidate.reference,
                "starting attempt"
            );

            // Per-attempt workspace wrapper.
            let journal = match self.options.mode {
                WorkspaceMode::Live => Some(Arc::new(JournalWorkspace::new(self.base.clone()))),
                WorkspaceMode::Preview => None,
            };
            let attempt_workspace: Arc<dyn Workspace> = match (&journal, &self.preview) {
                (Some(journal), _) => journal.clone(),
                (None, Some(preview)) => preview.clone(),
                (None, None) => self.base.clone(),
            };

            let sink = self.egress_sink(mapping.clone());
            let ctx = ToolExecutionContext::new(
                attempt_workspace,
                memory_scope.clone(),
                sink.clone(),
            )
            .with_preview(self.options.mode == WorkspaceMode::Preview)
            .with_metadata(self.options.metadata.clone());
            let executor = Arc::new(ToolExecutor::new(
                tool_table.clone(),
                Arc::clone(&policy),
                self.controller.clone(),
                sink.clone(),
                ctx,
                true,
            ));

            let request = EngineRequest {
                run_id: self.run_id.clone(),
                provider: candidate.provider.clone(),
                model: candidate.model.clone(),
                system: self.options.system.clone(),
                messages: messages.clone(),
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
                max_steps: self.options.max_steps,
                metadata: self.options.metadata.clone(),
            };
            let deps = EngineDeps {
                controller: self.controller.clone(),
                tools: Arc::clone(&executor),
                events: sink.clone(),
            };

            let attempt_outcome = match engine.start(request, deps).await {
                Ok(engine_run) => engine_run.result().await,
                Err(e) => Err(e),
            };

            match attempt_outcome {
                Ok(engine_result) => {
                    if let Some(journal) = &journal {
                        journal.commit();
                    }
                    if engine_result.finish_reason != FinishReason::Cancelled {
                        self.supervisor.breaker.record_success(&candidate.reference);
                        self.supervisor.persist_breaker_state();
                    }
                    tracing::info!(
                        run_id = %self.run_id,
                        reference = %candidate.reference,
                        reason = ?engine_result.finish_reason,
                        "attempt succeeded"
                    );
                    return Ok(RunResult {
                        run_id: self.run_id.clone(),
                        provider: Some(candidate.provider.clone()),
                        model: Some(candidate.model.clone()),
                        text: engine_result.text,
                        finish_reason: engine_result.finish_reason,
                        tool_calls: restore_calls(engine_result.tool_calls, &mapping),
                        tool_results: restore_results(engine_result.tool_results, &mapping),
                        steps: engine_result.steps,
                        usage: engine_result.usage,
                    });
                }
                Err(error) => {
                    let skipped = matches!(error, AgentError::ProviderUnavailable(_));
                    let cancelled =
                        error.is_cancellation() || self.controller.is_cancelled();
                    tracing::warn!(
                        run_id = %self.run_id,
                        reference = %candidate.reference,
                        error = %error,
                        "attempt failed"
                    );

                    if !skipped && !cancelled {
                        self.supervisor.breaker.record_failure(&candidate.reference);
                        self.supervisor.persist_breaker_state();
                        self.emit(AgentEventKind::Error {
                            error: error.to_string(),
                            raw: None,
                        });
                        self.emit(AgentEventKind::Status {
                            status: RunStatus::Error,
                            detail: Some(format!(
                                "{} failed; advancing to next candidate",
                                candidate.reference
                            )),
                        });
                    }

                    // Unwind this attempt's effects.
                    if let Some(journal) = &journal {
                        journal.rollback().await;
                    }
                    if let (WorkspaceMode::Preview, Some(preview)) =
                        (self.options.mode, &self.preview)
                    {
                        preview.discard();
                    }

                    if cancelled {
                        break;
                    }
                    last_error = Some(error);
                }
            }
        }

        if self.controller.is_cancelled()
            || last_error.as_ref().is_some_and(AgentError::is_cancellation)
        {
            return Ok(self.synthetic_cancelled_result());
        }
        Err(AgentError::AllCandidatesFailed {
            last: last_error.map(Box::new),
        })
    }

    fn synthetic_cancelled_result(&self) -> RunResult {
        RunResult {
            run_id: self.run_id.clone(),
            provider: None,
            model: None,
            text: String::new(),
            finish_reason: FinishReason::Cancelled,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            steps: 0,
            usage: Usage::default(),
        }
    }

    /// Sink engines and the executor emit into: filters engine-emitted
    /// terminal brackets, rewrites provider tool names to originals, stamps
    /// run metadata, and forwards onto the outer bus.
    fn egress_sink(&self, mapping: NameMapping) -> EventSink {
        let bus = self.bus.clone();
        let meta = self.options.meta.clone();
        EventSink::new(move |mut event| {
            match &mut event.kind {
                AgentEventKind::RunStart { .. } | AgentEventKind::RunFinish { .. } => {
                    return;
                }
                AgentEventKind::ToolCall { call }
                | AgentEventKind::ToolApprovalRequest { call, .. } => {
                    call.tool_name = mapping.restore(&call.tool_name);
                }
                AgentEventKind::ToolResult { result } => {
                    result.tool_name = mapping.restore(&result.tool_name);
                }
                AgentEventKind::StepFinish {
                    tool_calls,
                    tool_results,
                    ..
                } => {
                    for call in tool_calls.iter_mut() {
                        call.tool_name = mapping.restore(&call.tool_name);
                    }
                    for result in tool_results.iter_mut() {
                        result.tool_name = mapping.restore(&result.tool_name);
                    }
                }
                _ => {}
            }
            if event.meta.is_none() {
                event.meta = meta.clone();
            }
            bus.emit(event);
        })
    }
}

fn normalize_messages(prompt: &Prompt) -> Vec<EngineMessage> {
    match prompt {
        Prompt::Text(text) => vec![EngineMessage::user(text.clone())],
        Prompt::Messages(messages) => messages
            .iter()
            .filter(|message| message.role != MessageRole::System)
            .cloned()
            .collect(),
    }
}

fn restore_calls(calls: Vec<ToolCall>, mapping: &NameMapping) -> Vec<ToolCall> {
    calls
        .into_iter()
        .map(|mut call| {
            call.tool_name = mapping.restore(&call.tool_name);
            call
        })
        .collect()
}

fn restore_results(results: Vec<ToolResult>, mapping: &NameMapping) -> Vec<ToolResult> {
    results
        .into_iter()
        .map(|mut result| {
            result.tool_name = mapping.restore(&result.tool_name);
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_embedded_system_roles() {
        let messages = normalize_messages(&Prompt::Messages(vec![
            EngineMessage::system("ignored"),
            EngineMessage::user("hello"),
            EngineMessage::assistant("hi"),
        ]));
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role != MessageRole::System));
    }

    #[test]
    fn text_prompt_becomes_single_user_message() {
        let messages = normalize_messages(&Prompt::Text("do the thing".into()));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "do the thing");
    }
}
