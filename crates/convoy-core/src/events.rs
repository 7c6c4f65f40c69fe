//! Canonical event protocol for a run.
//!
//! `AgentEvent` is the single source of truth for everything a run emits.
//! Consumers (hooks, async iterators, session-update adapters) pattern-match
//! on `AgentEventKind` and map it to their own presentation format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initialising,
    Thinking,
    Responding,
    Acting,
    Paused,
    Stopping,
    Finished,
    Error,
}

/// Why a run (or a single step) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Cancelled,
    Error,
    Other,
}

impl FinishReason {
    /// Map a backend's stop-reason string onto the unified set.
    pub fn from_backend(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "tool_calls" | "tool_use" => Self::ToolCalls,
            "cancelled" | "canceled" | "abort" => Self::Cancelled,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// A tool invocation requested by the model. The id is unique within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub args: Value,
}

/// The outcome of a tool invocation, joined to its call by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub tool_name: String,
    pub result: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, result: Value) -> Self {
        Self {
            id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            result,
            is_error: false,
        }
    }

    pub fn err(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            result: Value::String(message.into()),
            is_error: true,
        }
    }
}

/// A file effect produced by a workspace-mutating tool.
///
/// `preview` marks effects buffered in a preview overlay rather than applied
/// to the base workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Create {
        path: String,
        preview: bool,
    },
    Update {
        path: String,
        preview: bool,
    },
    Delete {
        path: String,
        preview: bool,
    },
    Rename {
        from_path: String,
        to_path: String,
        preview: bool,
    },
    PatchHunk {
        path: String,
        hunk_index: usize,
        hunk_count: usize,
        preview: bool,
    },
}

impl FileChange {
    /// Primary path the change touches (destination for renames).
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. }
            | Self::Update { path, .. }
            | Self::Delete { path, .. }
            | Self::PatchHunk { path, .. } => path,
            Self::Rename { to_path, .. } => to_path,
        }
    }
}

/// Token usage reported by a backend, when available.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

/// Optional correlation metadata attached uniformly to events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Everything a run can emit, as one tagged union.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEventKind {
    RunStart {
        run_id: String,
        provider: String,
        model: String,
        started_at: DateTime<Utc>,
    },
    Status {
        status: RunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    ThinkingDelta {
        text: String,
    },
    TextDelta {
        text: String,
    },
    ToolCall {
        call: ToolCall,
    },
    ToolResult {
        result: ToolResult,
    },
    ToolApprovalRequest {
        call: ToolCall,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        policy: Option<String>,
    },
    FileChange {
        change: FileChange,
    },
    MemoryRead {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    MemoryWrite {
        key: String,
    },
    RetrievalQuery {
        query: String,
        top_k: usize,
    },
    RetrievalResults {
        query: String,
        top_k: usize,
        count: usize,
    },
    StepFinish {
        index: usize,
        finish_reason: FinishReason,
        tool_calls: Vec<ToolCall>,
        tool_results: Vec<ToolResult>,
    },
    Usage {
        usage: Usage,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<Value>,
    },
    RunFinish {
        run_id: String,
        reason: FinishReason,
    },
}

/// A timestamped event. `at` is a process-monotonic millisecond stamp:
/// strictly increasing within a process even when the wall clock steps back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<EventMeta>,
    #[serde(flatten)]
    pub kind: AgentEventKind,
}

impl AgentEvent {
    pub fn new(kind: AgentEventKind) -> Self {
        Self {
            at: monotonic_now_ms(),
            meta: None,
            kind,
        }
    }

    pub fn with_meta(kind: AgentEventKind, meta: Option<EventMeta>) -> Self {
        Self {
            at: monotonic_now_ms(),
            meta,
            kind,
        }
    }

    /// Tool name carried by this event, for egress remapping.
    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            AgentEventKind::ToolCall { call } | AgentEventKind::ToolApprovalRequest { call, .. } => {
                Some(&call.tool_name)
            }
            AgentEventKind::ToolResult { result } => Some(&result.tool_name),
            _ => None,
        }
    }
}

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp that never repeats or decreases within the process.
pub fn monotonic_now_ms() -> u64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    LAST_STAMP
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
            Some(wall.max(prev + 1))
        })
        .map(|prev| wall.max(prev + 1))
        .unwrap_or(wall)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = AgentEvent::new(AgentEventKind::TextDelta {
            text: "hello".into(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "text_delta");
        assert_eq!(value["text"], "hello");
        assert!(value["at"].as_u64().is_some());
        assert!(value.get("meta").is_none());
    }

    #[test]
    fn file_change_serializes_kind() {
        let change = FileChange::Rename {
            from_path: "a.txt".into(),
            to_path: "b.txt".into(),
            preview: true,
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["kind"], "rename");
        assert_eq!(value["preview"], true);
        assert_eq!(change.path(), "b.txt");
    }

    #[test]
    fn finish_reason_maps_backend_strings() {
        assert_eq!(FinishReason::from_backend("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_backend("max_tokens"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_backend("tool_use"),
            FinishReason::ToolCalls
        );
        assert_eq!(FinishReason::from_backend("weird"), FinishReason::Other);
    }

    #[test]
    fn stamps_strictly_increase() {
        let a = monotonic_now_ms();
        let b = monotonic_now_ms();
        let c = monotonic_now_ms();
        assert!(a < b && b < c);
    }

    #[test]
    fn tool_result_err_wraps_message() {
        let call = ToolCall {
            id: "c1".into(),
            tool_name: "echo".into(),
            args: json!({"x": 1}),
        };
        let result = ToolResult::err(&call, "boom");
        assert!(result.is_error);
        assert_eq!(result.id, "c1");
        assert_eq!(result.result, json!("boom"));
    }
}
