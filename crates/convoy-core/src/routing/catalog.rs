//! Registry of provider+model profiles.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Capability class a profile belongs to. `Default` matches any profile
/// carrying at least one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    #[default]
    Default,
    Frontier,
    Fast,
    LongContext,
    Cheap,
}

/// Capability flags a profile declares. Absent flags mean "unknown", which
/// hard filters treat as permissive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<bool>,
}

/// One provider+model entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub provider_id: String,
    pub model_id: String,
    pub classes: Vec<ModelClass>,
    /// Lower is faster.
    pub latency_rank: u32,
    /// Lower is cheaper.
    pub cost_rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u64>,
    #[serde(default)]
    pub capabilities: ModelCapabilities,
}

impl ModelProfile {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
            classes: vec![ModelClass::Default],
            latency_rank: 50,
            cost_rank: 50,
            max_context_tokens: None,
            capabilities: ModelCapabilities::default(),
        }
    }

    pub fn with_classes(mut self, classes: Vec<ModelClass>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_latency_rank(mut self, rank: u32) -> Self {
        self.latency_rank = rank;
        self
    }

    pub fn with_cost_rank(mut self, rank: u32) -> Self {
        self.cost_rank = rank;
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: u64) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }

    pub fn with_capabilities(mut self, capabilities: ModelCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Canonical `provider:model` key, also the breaker key.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.provider_id, self.model_id)
    }

    /// Whether this profile serves the requested class.
    pub fn matches_class(&self, class: ModelClass) -> bool {
        match class {
            ModelClass::Default => !self.classes.is_empty(),
            other => self.classes.contains(&other),
        }
    }
}

/// Append-only profile registry. Reads dominate; registration happens at
/// startup or via background discovery enrichment.
#[derive(Default)]
pub struct ModelCatalog {
    profiles: RwLock<Vec<ModelProfile>>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, profile: ModelProfile) {
        self.profiles.write().expect("catalog lock").push(profile);
    }

    /// Bulk registration, e.g. from a provider discovery pass.
    pub fn seed(&self, profiles: impl IntoIterator<Item = ModelProfile>) {
        let mut guard = self.profiles.write().expect("catalog lock");
        guard.extend(profiles);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().expect("catalog lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<ModelProfile> {
        self.profiles.read().expect("catalog lock").clone()
    }

    pub fn by_class(&self, class: ModelClass) -> Vec<ModelProfile> {
        self.profiles
            .read()
            .expect("catalog lock")
            .iter()
            .filter(|profile| profile.matches_class(class))
            .cloned()
            .collect()
    }

    pub fn by_provider(&self, provider_id: &str) -> Vec<ModelProfile> {
        self.profiles
            .read()
            .expect("catalog lock")
            .iter()
            .filter(|profile| profile.provider_id == provider_id)
            .cloned()
            .collect()
    }

    pub fn find(&self, provider_id: &str, model_id: &str) -> Option<ModelProfile> {
        self.profiles
            .read()
            .expect("catalog lock")
            .iter()
            .find(|profile| profile.provider_id == provider_id && profile.model_id == model_id)
            .cloned()
    }
}
