//! Session-update compatibility hook.
//!
//! Joins `tool_call` / `tool_result` events by id and invokes a callback
//! once per completed pair; text and thinking deltas map to message/thought
//! callbacks. Useful for bridging the event stream to editor session-update
//! protocols that want joined pairs rather than raw events.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::events::{AgentEvent, AgentEventKind, ToolCall};

use super::bus::EventHook;

type ToolCallFn = dyn Fn(&str, &Value, &Value, bool) + Send + Sync;
type TextFn = dyn Fn(&str) + Send + Sync;

/// Hook that re-joins the event stream into session updates.
#[derive(Default)]
pub struct ToolCallAggregator {
    pending: Mutex<HashMap<String, ToolCall>>,
    on_tool_call: Option<Box<ToolCallFn>>,
    on_message: Option<Box<TextFn>>,
    on_thought: Option<Box<TextFn>>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per joined pair: `(tool_name, args, result, is_error)`.
    pub fn on_tool_call(
        mut self,
        callback: impl Fn(&str, &Value, &Value, bool) + Send + Sync + 'static,
    ) -> Self {
        self.on_tool_call = Some(Box::new(callback));
        self
    }

    pub fn on_message(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(callback));
        self
    }

    pub fn on_thought(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_thought = Some(Box::new(callback));
        self
    }

    /// Calls whose results never arrived (run aborted first).
    pub fn unjoined(&self) -> usize {
        self.pending.lock().expect("aggregator lock").len()
    }
}

impl EventHook for ToolCallAggregator {
    fn on_event(&self, event: &AgentEvent) -> anyhow::Result<()> {
        match &event.kind {
            AgentEventKind::ToolCall { call } => {
                self.pending
                    .lock()
                    .expect("aggregator lock")
                    .insert(call.id.clone(), call.clone());
            }
            AgentEventKind::ToolResult { result } => {
                let call = self
                    .pending
                    .lock()
                    .expect("aggregator lock")
                    .remove(&result.id);
                if let (Some(call), Some(callback)) = (call, &self.on_tool_call) {
                    callback(&result.tool_name, &call.args, &result.result, result.is_error);
                }
            }
            AgentEventKind::TextDelta { text } => {
                if let Some(callback) = &self.on_message {
                    callback(text);
                }
            }
            AgentEventKind::ThinkingDelta { text } => {
                if let Some(callback) = &self.on_thought {
                    callback(text);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ToolResult;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn joins_call_and_result_once() {
        let joined: Arc<Mutex<Vec<(String, Value, Value)>>> = Arc::default();
        let sink = joined.clone();
        let aggregator = ToolCallAggregator::new().on_tool_call(move |name, args, result, _| {
            sink.lock()
                .unwrap()
                .push((name.to_string(), args.clone(), result.clone()));
        });

        let call = ToolCall {
            id: "c1".into(),
            tool_name: "echo".into(),
            args: json!({"x": 1}),
        };
        aggregator
            .on_event(&AgentEvent::new(AgentEventKind::ToolCall { call: call.clone() }))
            .unwrap();
        assert_eq!(aggregator.unjoined(), 1);

        aggregator
            .on_event(&AgentEvent::new(AgentEventKind::ToolResult {
                result: ToolResult::ok(&call, json!({"y": 1})),
            }))
            .unwrap();

        let seen = joined.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "echo");
        assert_eq!(seen[0].1, json!({"x": 1}));
        assert_eq!(seen[0].2, json!({"y": 1}));
        assert_eq!(aggregator.unjoined(), 0);
    }

    #[test]
    fn deltas_route_to_message_and_thought() {
        let messages: Arc<Mutex<String>> = Arc::default();
        let thoughts: Arc<Mutex<String>> = Arc::default();
        let m = messages.clone();
        let t = thoughts.clone();
        let aggregator = ToolCallAggregator::new()
            .on_message(move |text| m.lock().unwrap().push_str(text))
            .on_thought(move |text| t.lock().unwrap().push_str(text));

        aggregator
            .on_event(&AgentEvent::new(AgentEventKind::ThinkingDelta {
                text: "hmm ".into(),
            }))
            .unwrap();
        aggregator
            .on_event(&AgentEvent::new(AgentEventKind::TextDelta {
                text: "hello".into(),
            }))
            .unwrap();

        assert_eq!(&*messages.lock().unwrap(), "hello");
        assert_eq!(&*thoughts.lock().unwrap(), "hmm ");
    }
}
