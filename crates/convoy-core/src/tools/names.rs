//! Provider-facing tool name validation and sanitisation.
//!
//! Providers only accept names matching `^[A-Za-z0-9_-]{1,64}$`. Strict mode
//! refuses the run on any invalid or colliding name; sanitise mode rewrites
//! names and resolves collisions with numeric suffixes. A mapping records
//! `original ↔ provider` so every egress event and the final result can be
//! rewritten back to original names.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, AgentResult};
use crate::tools::Tool;

pub const MAX_TOOL_NAME_BYTES: usize = 64;

/// How to treat tool names at the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolNamePolicy {
    /// Refuse the run when any name is invalid or two names collide.
    Strict,
    /// Rewrite illegal names and dedupe collisions.
    #[default]
    Sanitize,
}

/// Bidirectional record of `original ↔ provider` tool names.
#[derive(Debug, Clone, Default)]
pub struct NameMapping {
    to_provider: HashMap<String, String>,
    to_original: HashMap<String, String>,
}

impl NameMapping {
    pub fn insert(&mut self, original: impl Into<String>, provider: impl Into<String>) {
        let original = original.into();
        let provider = provider.into();
        self.to_provider.insert(original.clone(), provider.clone());
        self.to_original.insert(provider, original);
    }

    pub fn provider_name(&self, original: &str) -> Option<&str> {
        self.to_provider.get(original).map(String::as_str)
    }

    pub fn original_name(&self, provider: &str) -> Option<&str> {
        self.to_original.get(provider).map(String::as_str)
    }

    /// Rewrite a provider-facing name back to its original; unknown names
    /// pass through untouched.
    pub fn restore(&self, provider: &str) -> String {
        self.original_name(provider)
            .unwrap_or(provider)
            .to_string()
    }

    pub fn is_identity(&self) -> bool {
        self.to_provider.iter().all(|(k, v)| k == v)
    }
}

fn is_valid_provider_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_BYTES
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    out.truncate(MAX_TOOL_NAME_BYTES);
    out
}

/// Dedupe `candidate` against already-taken names by appending `_2`, `_3`, …
/// while staying inside the 64-byte budget.
fn dedupe_name(candidate: String, taken: &HashMap<String, String>) -> String {
    if !taken.contains_key(&candidate) {
        return candidate;
    }
    for n in 2u32.. {
        let suffix = format!("_{n}");
        let budget = MAX_TOOL_NAME_BYTES - suffix.len();
        let mut base = candidate.clone();
        base.truncate(budget);
        let attempt = format!("{base}{suffix}");
        if !taken.contains_key(&attempt) {
            return attempt;
        }
    }
    unreachable!("suffix space exhausted")
}

/// Apply the name policy over a tool list.
///
/// Returns the provider-keyed tool table plus the mapping. Strict-mode errors
/// name the offending tool indices and original names.
pub fn apply_name_policy(
    tools: &[Arc<dyn Tool>],
    policy: ToolNamePolicy,
) -> AgentResult<(Vec<(String, Arc<dyn Tool>)>, NameMapping)> {
    let mut mapping = NameMapping::default();
    let mut table: Vec<(String, Arc<dyn Tool>)> = Vec::with_capacity(tools.len());
    let mut taken: HashMap<String, String> = HashMap::new();

    match policy {
        ToolNamePolicy::Strict => {
            let mut problems = Vec::new();
            for (index, tool) in tools.iter().enumerate() {
                let name = tool.name().to_string();
                if !is_valid_provider_name(&name) {
                    problems.push(format!("tool #{index} has invalid name '{name}'"));
                    continue;
                }
                if let Some(previous) = taken.get(&name) {
                    problems.push(format!(
                        "tool #{index} '{name}' collides with '{previous}'"
                    ));
                    continue;
                }
                taken.insert(name.clone(), name.clone());
                mapping.insert(name.clone(), name.clone());
                table.push((name, Arc::clone(tool)));
            }
            if !problems.is_empty() {
                return Err(AgentError::Config(format!(
                    "tool name validation failed: {}",
                    problems.join("; ")
                )));
            }
        }
        ToolNamePolicy::Sanitize => {
            for tool in tools {
                let original = tool.name().to_string();
                let provider = dedupe_name(sanitize_name(&original), &taken);
                taken.insert(provider.clone(), original.clone());
                mapping.insert(original, provider.clone());
                table.push((provider, Arc::clone(tool)));
            }
        }
    }

    Ok((table, mapping))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;
    use serde_json::json;

    fn tool(name: &str) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(name, "t", json!({"type": "object"}), |_, _| async {
            Ok(json!(null))
        }))
    }

    #[test]
    fn strict_accepts_valid_unique_names() {
        let tools = vec![tool("alpha"), tool("beta_2")];
        let (table, mapping) = apply_name_policy(&tools, ToolNamePolicy::Strict).unwrap();
        assert_eq!(table[0].0, "alpha");
        assert_eq!(table[1].0, "beta_2");
        assert!(mapping.is_identity());
    }

    #[test]
    fn strict_reports_offending_index_and_name() {
        let tools = vec![tool("ok"), tool("has space")];
        let err = match apply_name_policy(&tools, ToolNamePolicy::Strict) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        let message = err.to_string();
        assert!(message.contains("#1"));
        assert!(message.contains("has space"));
    }

    #[test]
    fn strict_rejects_collisions() {
        let tools = vec![tool("dup"), tool("dup")];
        let err = match apply_name_policy(&tools, ToolNamePolicy::Strict) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(err.to_string().contains("collides"));
    }

    #[test]
    fn sanitize_rewrites_and_dedupes() {
        let tools = vec![tool("foo bar"), tool("foo_bar")];
        let (table, mapping) = apply_name_policy(&tools, ToolNamePolicy::Sanitize).unwrap();
        assert_eq!(table[0].0, "foo_bar");
        assert_eq!(table[1].0, "foo_bar_2");
        assert_eq!(mapping.restore("foo_bar"), "foo bar");
        assert_eq!(mapping.restore("foo_bar_2"), "foo_bar");
        assert_eq!(mapping.provider_name("foo bar"), Some("foo_bar"));
    }

    #[test]
    fn sanitize_truncates_to_budget() {
        let long = "x".repeat(100);
        let tools = vec![tool(&long), tool(&long)];
        let (table, _) = apply_name_policy(&tools, ToolNamePolicy::Sanitize).unwrap();
        assert_eq!(table[0].0.len(), MAX_TOOL_NAME_BYTES);
        assert_eq!(table[1].0.len(), MAX_TOOL_NAME_BYTES);
        assert!(table[1].0.ends_with("_2"));
        assert_ne!(table[0].0, table[1].0);
    }

    #[test]
    fn restore_passes_unknown_names_through() {
        let mapping = NameMapping::default();
        assert_eq!(mapping.restore("anything"), "anything");
    }
}
