//! Call-id recovery for backends without stable per-call ids.
//!
//! Arguments are canonicalized (objects by sorted key, arrays in order) and
//! hashed together with the tool name; ids queue per hash in FIFO order so a
//! backend that returns results out of order, or without the call id, still
//! joins each result to the right call deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Render a value with deterministic key order.
pub fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(key).expect("string serializes"),
                        canonical_json(&map[key])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

/// Hash of `name || canonical(args)`.
pub fn call_hash(tool_name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update(b"||");
    hasher.update(canonical_json(args).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Per-run FIFO of pending call ids keyed by call hash.
#[derive(Default)]
pub struct PendingCallQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl PendingCallQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call, generating an id when the backend supplied none.
    pub fn register(&self, tool_name: &str, args: &Value, id: Option<String>) -> String {
        let id = id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
        let hash = call_hash(tool_name, args);
        self.queues
            .lock()
            .expect("pending lock")
            .entry(hash)
            .or_default()
            .push_back(id.clone());
        id
    }

    /// Recover the oldest pending id for this (name, args) pair.
    pub fn resolve(&self, tool_name: &str, args: &Value) -> Option<String> {
        let hash = call_hash(tool_name, args);
        let mut queues = self.queues.lock().expect("pending lock");
        let queue = queues.get_mut(&hash)?;
        let id = queue.pop_front();
        if queue.is_empty() {
            queues.remove(&hash);
        }
        id
    }

    pub fn outstanding(&self) -> usize {
        self.queues
            .lock()
            .expect("pending lock")
            .values()
            .map(VecDeque::len)
            .sum()
    }
}
