//! Candidate planning.
//!
//! `plan` is deterministic: the same catalog, availability, preferences,
//! constraints, and scores always produce the same ordered candidate list.
//! Provider base order is lexicographic before preferences are applied, and
//! the score sort is stable.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::catalog::{ModelCatalog, ModelClass, ModelProfile};

/// One plannable `(provider, model)` pair.
#[derive(Debug, Clone)]
pub struct RouteCandidate {
    pub provider: String,
    pub model: String,
    /// Canonical `provider:model` key, used by the circuit breaker.
    pub reference: String,
    /// Catalog profile, when the pair is registered.
    pub profile: Option<ModelProfile>,
}

impl RouteCandidate {
    fn new(provider: &str, model: &str, profile: Option<ModelProfile>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            reference: format!("{provider}:{model}"),
            profile,
        }
    }
}

/// Ordered attempt list.
#[derive(Debug, Clone, Default)]
pub struct RoutePlan {
    pub candidates: Vec<RouteCandidate>,
}

impl RoutePlan {
    pub fn references(&self) -> Vec<String> {
        self.candidates
            .iter()
            .map(|candidate| candidate.reference.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// What the caller wants.
#[derive(Debug, Clone, Default)]
pub struct RoutePreference {
    /// Explicitly requested provider; tried first when available.
    pub provider: Option<String>,
    /// Explicitly requested model; pinned across ordered providers.
    pub model: Option<String>,
    pub class: ModelClass,
    /// Providers to try early, in order.
    pub preferred_providers: Vec<String>,
    /// When false the plan is truncated to the single best candidate.
    pub allow_fallback: bool,
}

/// Hard requirements.
#[derive(Debug, Clone, Default)]
pub struct RouteConstraints {
    pub must_stream: bool,
    pub requires_tools: bool,
    pub allowed_providers: Option<HashSet<String>>,
    pub blocked_providers: HashSet<String>,
    pub min_context_tokens: Option<u64>,
}

impl RouteConstraints {
    fn permits(&self, candidate: &RouteCandidate) -> bool {
        let Some(profile) = &candidate.profile else {
            // Unregistered pairs carry no capability evidence; hard filters
            // only drop on explicit contradiction.
            return true;
        };
        if self.must_stream && profile.capabilities.streaming == Some(false) {
            return false;
        }
        if self.requires_tools && profile.capabilities.tools == Some(false) {
            return false;
        }
        if let (Some(min), Some(max)) = (self.min_context_tokens, profile.max_context_tokens) {
            if max < min {
                return false;
            }
        }
        true
    }
}

/// Scoring callback; lower is better.
pub type ScoreFn<'a> = dyn Fn(&RouteCandidate) -> u64 + 'a;

/// Planner over a shared catalog.
pub struct ModelRouter {
    catalog: Arc<ModelCatalog>,
}

impl ModelRouter {
    pub fn new(catalog: Arc<ModelCatalog>) -> Self {
        Self { catalog }
    }

    /// Produce the ordered candidate plan.
    pub fn plan(
        &self,
        availability: &HashMap<String, bool>,
        preference: &RoutePreference,
        constraints: &RouteConstraints,
        score: Option<&ScoreFn<'_>>,
    ) -> RoutePlan {
        let providers = self.ordered_providers(availability, preference, constraints);
        let mut candidates = self.expand(&providers, preference);
        candidates.retain(|candidate| constraints.permits(candidate));

        if candidates.is_empty() && preference.allow_fallback {
            tracing::debug!("plan empty after filters; falling back to full catalog");
            candidates = self
                .catalog
                .all()
                .into_iter()
                .filter(|profile| providers.iter().any(|p| *p == profile.provider_id))
                .map(|profile| {
                    RouteCandidate::new(
                        &profile.provider_id.clone(),
                        &profile.model_id.clone(),
                        Some(profile),
                    )
                })
                .filter(|candidate| constraints.permits(candidate))
                .collect();
        }

        dedupe_by_reference(&mut candidates);

        if let Some(score) = score {
            candidates.sort_by_key(|candidate| score(candidate));
        }

        if !preference.allow_fallback {
            candidates.truncate(1);
        }

        RoutePlan { candidates }
    }

    /// Available providers ordered: explicit preference, preferred list,
    /// then the rest lexicographically.
    fn ordered_providers(
        &self,
        availability: &HashMap<String, bool>,
        preference: &RoutePreference,
        constraints: &RouteConstraints,
    ) -> Vec<String> {
        let mut base: Vec<String> = availability
            .iter()
            .filter(|(_, available)| **available)
            .map(|(provider, _)| provider.clone())
            .filter(|provider| {
                constraints
                    .allowed_providers
                    .as_ref()
                    .is_none_or(|allowed| allowed.contains(provider))
            })
            .filter(|provider| !constraints.blocked_providers.contains(provider))
            .collect();
        base.sort();

        let mut ordered: Vec<String> = Vec::with_capacity(base.len());
        let push = |provider: &str, pool: &mut Vec<String>, out: &mut Vec<String>| {
            if let Some(index) = pool.iter().position(|p| p == provider) {
                out.push(pool.remove(index));
            }
        };

        if let Some(explicit) = &preference.provider {
            push(explicit, &mut base, &mut ordered);
        }
        for preferred in &preference.preferred_providers {
            push(preferred, &mut base, &mut ordered);
        }
        ordered.extend(base);
        ordered
    }

    /// Expand providers into candidates, honouring an explicit model pin.
    fn expand(&self, providers: &[String], preference: &RoutePreference) -> Vec<RouteCandidate> {
        let mut out = Vec::new();
        if let Some(model) = &preference.model {
            for provider in providers {
                let profile = self.catalog.find(provider, model);
                out.push(RouteCandidate::new(provider, model, profile));
            }
            return out;
        }

        for provider in providers {
            let mut profiles: Vec<ModelProfile> = self
                .catalog
                .by_provider(provider)
                .into_iter()
                .filter(|profile| profile.matches_class(preference.class))
                .collect();
            profiles.sort_by(|a, b| {
                a.latency_rank
                    .cmp(&b.latency_rank)
                    .then_with(|| a.model_id.cmp(&b.model_id))
            });
            for profile in profiles {
                out.push(RouteCandidate::new(
                    provider,
                    &profile.model_id.clone(),
                    Some(profile),
                ));
            }
        }
        out
    }
}

fn dedupe_by_reference(candidates: &mut Vec<RouteCandidate>) {
    let mut seen = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.reference.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::catalog::ModelCapabilities;

    fn catalog() -> Arc<ModelCatalog> {
        let catalog = ModelCatalog::new();
        catalog.register(
            ModelProfile::new("ai-sdk", "swift")
                .with_classes(vec![ModelClass::Default, ModelClass::Fast])
                .with_latency_rank(10)
                .with_cost_rank(20),
        );
        catalog.register(
            ModelProfile::new("ai-sdk", "titan")
                .with_classes(vec![ModelClass::Default, ModelClass::Frontier])
                .with_latency_rank(40)
                .with_cost_rank(80)
                .with_capabilities(ModelCapabilities {
                    streaming: Some(true),
                    tools: Some(true),
                }),
        );
        catalog.register(
            ModelProfile::new("hosted", "batch-only")
                .with_classes(vec![ModelClass::Cheap, ModelClass::Default])
                .with_latency_rank(5)
                .with_capabilities(ModelCapabilities {
                    streaming: Some(false),
                    tools: Some(false),
                }),
        );
        catalog.register(
            ModelProfile::new("hosted", "lens")
                .with_classes(vec![ModelClass::LongContext, ModelClass::Default])
                .with_latency_rank(60)
                .with_max_context_tokens(1_000_000),
        );
        Arc::new(catalog)
    }

    fn availability(providers: &[&str]) -> HashMap<String, bool> {
        providers.iter().map(|p| (p.to_string(), true)).collect()
    }

    fn fallback_pref() -> RoutePreference {
        RoutePreference {
            allow_fallback: true,
            ..Default::default()
        }
    }

    #[test]
    fn plans_by_class_sorted_by_latency() {
        let router = ModelRouter::new(catalog());
        let plan = router.plan(
            &availability(&["ai-sdk"]),
            &fallback_pref(),
            &RouteConstraints::default(),
            None,
        );
        assert_eq!(plan.references(), vec!["ai-sdk:swift", "ai-sdk:titan"]);
    }

    #[test]
    fn explicit_model_is_pinned_across_providers() {
        let router = ModelRouter::new(catalog());
        let plan = router.plan(
            &availability(&["ai-sdk", "hosted"]),
            &RoutePreference {
                model: Some("swift".into()),
                preferred_providers: vec!["hosted".into()],
                allow_fallback: true,
                ..Default::default()
            },
            &RouteConstraints::default(),
            None,
        );
        assert_eq!(plan.references(), vec!["hosted:swift", "ai-sdk:swift"]);
        // Only the registered pair carries a profile.
        assert!(plan.candidates[0].profile.is_none());
        assert!(plan.candidates[1].profile.is_some());
    }

    #[test]
    fn hard_filters_drop_contradicting_profiles() {
        let router = ModelRouter::new(catalog());
        let plan = router.plan(
            &availability(&["hosted"]),
            &fallback_pref(),
            &RouteConstraints {
                must_stream: true,
                requires_tools: true,
                ..Default::default()
            },
            None,
        );
        // batch-only declares streaming=false and tools=false.
        assert_eq!(plan.references(), vec!["hosted:lens"]);
    }

    #[test]
    fn min_context_filter_uses_known_bounds_only() {
        let router = ModelRouter::new(catalog());
        let plan = router.plan(
            &availability(&["hosted"]),
            &fallback_pref(),
            &RouteConstraints {
                min_context_tokens: Some(2_000_000),
                ..Default::default()
            },
            None,
        );
        // lens declares 1M (dropped); batch-only declares nothing (kept).
        assert_eq!(plan.references(), vec!["hosted:batch-only"]);
    }

    #[test]
    fn blocked_and_allowed_provider_sets() {
        let router = ModelRouter::new(catalog());
        let plan = router.plan(
            &availability(&["ai-sdk", "hosted"]),
            &fallback_pref(),
            &RouteConstraints {
                blocked_providers: ["hosted".to_string()].into_iter().collect(),
                ..Default::default()
            },
            None,
        );
        assert!(plan.references().iter().all(|r| r.starts_with("ai-sdk:")));

        let plan = router.plan(
            &availability(&["ai-sdk", "hosted"]),
            &fallback_pref(),
            &RouteConstraints {
                allowed_providers: Some(["hosted".to_string()].into_iter().collect()),
                ..Default::default()
            },
            None,
        );
        assert!(plan.references().iter().all(|r| r.starts_with("hosted:")));
    }

    #[test]
    fn score_sort_is_stable_and_ascending() {
        let router = ModelRouter::new(catalog());
        let score = |candidate: &RouteCandidate| -> u64 {
            match candidate.reference.as_str() {
                "ai-sdk:swift" => 100,
                _ => 1,
            }
        };
        let plan = router.plan(
            &availability(&["ai-sdk"]),
            &fallback_pref(),
            &RouteConstraints::default(),
            Some(&score),
        );
        assert_eq!(plan.references(), vec!["ai-sdk:titan", "ai-sdk:swift"]);
    }

    #[test]
    fn no_fallback_truncates_to_first() {
        let router = ModelRouter::new(catalog());
        let plan = router.plan(
            &availability(&["ai-sdk"]),
            &RoutePreference::default(),
            &RouteConstraints::default(),
            None,
        );
        assert_eq!(plan.references(), vec!["ai-sdk:swift"]);
    }

    #[test]
    fn plan_is_deterministic() {
        let router = ModelRouter::new(catalog());
        let avail = availability(&["ai-sdk", "hosted"]);
        let pref = fallback_pref();
        let constraints = RouteConstraints::default();
        let first = router.plan(&avail, &pref, &constraints, None).references();
        for _ in 0..10 {
            assert_eq!(
                router.plan(&avail, &pref, &constraints, None).references(),
                first
            );
        }
    }

    #[test]
    fn unavailable_provider_is_skipped() {
        let router = ModelRouter::new(catalog());
        let mut avail = availability(&["ai-sdk"]);
        avail.insert("hosted".into(), false);
        let plan = router.plan(&avail, &fallback_pref(), &RouteConstraints::default(), None);
        assert!(plan.references().iter().all(|r| r.starts_with("ai-sdk:")));
    }
}
