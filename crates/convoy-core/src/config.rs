//! Injected configuration storage.
//!
//! The core keeps no global state; durable bits (currently the circuit
//! breaker snapshot) go through a caller-supplied `ConfigStore`.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Key under which the breaker snapshot is persisted.
pub const BREAKER_STATE_KEY: &str = "routing:circuitBreaker:v1";

/// Keyed JSON storage port.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Process-local store, useful for tests and single-process embedding.
#[derive(Default)]
pub struct InMemoryConfigStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().expect("store lock").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries
            .lock()
            .expect("store lock")
            .insert(key.to_string(), value);
        Ok(())
    }
}
