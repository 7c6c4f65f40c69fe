//! Tool surface: the `Tool` trait, execution context, policies, provider
//! name mapping, and the executor that gates and dispatches calls.

pub mod builtin;
pub mod executor;
pub mod names;
pub mod patch;
pub mod policy;

pub use executor::ToolExecutor;
pub use names::{NameMapping, ToolNamePolicy};
pub use policy::{
    AllowAllPolicy, CapabilityApprovalPolicy, CapabilityDenyPolicy, CompositePolicy, DenyAllPolicy,
    PolicyDecision, ToolAllowListPolicy, ToolDenyListPolicy, ToolPolicy,
};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::memory::MemoryScope;
use crate::run::bus::EventSink;
use crate::workspace::Workspace;

/// Capability tags used by the built-in tools.
pub mod caps {
    pub const FS_READ: &str = "fs:read";
    pub const FS_WRITE: &str = "fs:write";
    pub const FS_DELETE: &str = "fs:delete";
    pub const FS_RENAME: &str = "fs:rename";
    pub const MEMORY_READ: &str = "memory:read";
    pub const MEMORY_WRITE: &str = "memory:write";
    pub const RETRIEVAL_READ: &str = "retrieval:read";
}

/// Per-run context handed to every tool execution.
///
/// Tools receive capabilities as a value — workspace, memory scope, event
/// sink, metadata — rather than back-pointers into the SDK, which keeps the
/// dependency graph acyclic.
#[derive(Clone)]
pub struct ToolExecutionContext {
    pub workspace: Arc<dyn Workspace>,
    pub memory: MemoryScope,
    /// Sink for events a tool emits mid-execution (`file_change`,
    /// `memory_read`, ...).
    pub events: EventSink,
    /// True when the workspace is a preview overlay; file_change events are
    /// flagged accordingly.
    pub preview: bool,
    pub metadata: Map<String, Value>,
}

impl ToolExecutionContext {
    pub fn new(workspace: Arc<dyn Workspace>, memory: MemoryScope, events: EventSink) -> Self {
        Self {
            workspace,
            memory,
            events,
            preview: false,
            metadata: Map::new(),
        }
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Trait for tool implementations.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Original tool name. Provider-facing names may differ after
    /// sanitisation; see [`names`].
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn input_schema(&self) -> Value;

    /// Free-form capability tags (`fs:write`, `memory:read`, ...) consulted
    /// by policies.
    fn capabilities(&self) -> &[&str] {
        &[]
    }

    /// Execute the tool. A returned error is contained by the executor and
    /// becomes an error result; it never crashes the provider loop.
    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value>;
}

/// Parse tool arguments into a typed params struct.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| anyhow::anyhow!("invalid arguments: {e}"))
}

/// Provider-facing tool description handed to engines.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A simple closure-backed tool, convenient for user tools and tests.
pub struct FnTool {
    name: String,
    description: String,
    schema: Value,
    capabilities: Vec<&'static str>,
    #[allow(clippy::type_complexity)]
    handler: Box<
        dyn Fn(Value, ToolExecutionContext) -> futures::future::BoxFuture<'static, Result<Value>>
            + Send
            + Sync,
    >,
}

impl FnTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            capabilities: Vec::new(),
            handler: Box::new(
                move |args, ctx| -> futures::future::BoxFuture<'static, Result<Value>> {
                    Box::pin(handler(args, ctx))
                },
            ),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<&'static str>) -> Self {
        self.capabilities = capabilities;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    fn capabilities(&self) -> &[&str] {
        &self.capabilities
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        (self.handler)(args, ctx.clone()).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::memory::MemoryPool;
    use crate::workspace::MemoryWorkspace;

    /// Context over a fresh in-memory workspace and pool.
    pub fn context(sink: EventSink) -> ToolExecutionContext {
        let pool = Arc::new(MemoryPool::default());
        ToolExecutionContext::new(Arc::new(MemoryWorkspace::new()), pool.scope("test"), sink)
    }
}
