//! Shared-memory tools over the run's scoped view of the memory pool.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::events::{AgentEvent, AgentEventKind};
use crate::tools::{caps, parse_args, Tool, ToolExecutionContext};

/// `memory_get` — fetch a value from the run's memory scope.
pub struct MemoryGetTool;

#[derive(Deserialize)]
struct MemoryGetArgs {
    key: String,
}

#[async_trait]
impl Tool for MemoryGetTool {
    fn name(&self) -> &str {
        "memory_get"
    }

    fn description(&self) -> &str {
        "Read a value previously stored in shared memory. Returns null when absent or expired."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"key": {"type": "string"}},
            "required": ["key"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::MEMORY_READ]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: MemoryGetArgs = parse_args(args)?;
        let value = ctx.memory.get(&args.key);
        ctx.events.emit(AgentEvent::new(AgentEventKind::MemoryRead {
            key: args.key,
            value: value.clone(),
        }));
        Ok(value.unwrap_or(Value::Null))
    }
}

/// `memory_set` — store a value in the run's memory scope.
pub struct MemorySetTool;

#[derive(Deserialize)]
struct MemorySetArgs {
    key: String,
    value: Value,
}

#[async_trait]
impl Tool for MemorySetTool {
    fn name(&self) -> &str {
        "memory_set"
    }

    fn description(&self) -> &str {
        "Store a JSON value in shared memory under a key."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string"},
                "value": {}
            },
            "required": ["key", "value"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::MEMORY_WRITE]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: MemorySetArgs = parse_args(args)?;
        ctx.memory.set(&args.key, args.value);
        ctx.events.emit(AgentEvent::new(AgentEventKind::MemoryWrite {
            key: args.key,
        }));
        Ok(json!({"ok": true}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::bus::{EventBus, EventSink};
    use crate::tools::test_support::context;

    #[tokio::test]
    async fn set_then_get_round_trip() {
        let bus = EventBus::new();
        let stream = bus.events();
        let ctx = context(EventSink::to_bus(&bus));

        MemorySetTool
            .execute(json!({"key": "k", "value": {"n": 1}}), &ctx)
            .await
            .unwrap();
        let value = MemoryGetTool
            .execute(json!({"key": "k"}), &ctx)
            .await
            .unwrap();
        assert_eq!(value, json!({"n": 1}));

        let missing = MemoryGetTool
            .execute(json!({"key": "absent"}), &ctx)
            .await
            .unwrap();
        assert_eq!(missing, Value::Null);

        bus.close(None);
        let events = stream.collect().await;
        assert!(matches!(
            events[0].kind,
            AgentEventKind::MemoryWrite { ref key } if key == "k"
        ));
        assert!(matches!(
            events[1].kind,
            AgentEventKind::MemoryRead { ref key, value: Some(_) } if key == "k"
        ));
        assert!(matches!(
            events[2].kind,
            AgentEventKind::MemoryRead { value: None, .. }
        ));
    }
}
