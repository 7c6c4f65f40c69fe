//! Tool-use policies.
//!
//! A policy inspects a tool (by original name and capabilities) plus the
//! call arguments and returns allow, deny, or ask-for-approval. Policies are
//! pure and synchronous so router plans and test runs stay deterministic.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use super::Tool;

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny { reason: String },
    Ask { reason: String },
}

impl PolicyDecision {
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    pub fn ask(reason: impl Into<String>) -> Self {
        Self::Ask {
            reason: reason.into(),
        }
    }
}

/// A named policy over tool invocations.
pub trait ToolPolicy: Send + Sync {
    /// Stable name, used to attribute rejections.
    fn name(&self) -> &str;

    fn decide(&self, tool: &dyn Tool, args: &Value) -> PolicyDecision;
}

/// Permits everything.
pub struct AllowAllPolicy;

impl ToolPolicy for AllowAllPolicy {
    fn name(&self) -> &str {
        "allow_all"
    }

    fn decide(&self, _tool: &dyn Tool, _args: &Value) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// Denies everything.
pub struct DenyAllPolicy;

impl ToolPolicy for DenyAllPolicy {
    fn name(&self) -> &str {
        "deny_all"
    }

    fn decide(&self, tool: &dyn Tool, _args: &Value) -> PolicyDecision {
        PolicyDecision::deny(format!("tool '{}' is not permitted", tool.name()))
    }
}

/// Permits only the listed tool names.
pub struct ToolAllowListPolicy {
    allowed: HashSet<String>,
}

impl ToolAllowListPolicy {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToolPolicy for ToolAllowListPolicy {
    fn name(&self) -> &str {
        "tool_allow_list"
    }

    fn decide(&self, tool: &dyn Tool, _args: &Value) -> PolicyDecision {
        if self.allowed.contains(tool.name()) {
            PolicyDecision::Allow
        } else {
            PolicyDecision::deny(format!("tool '{}' is not on the allow list", tool.name()))
        }
    }
}

/// Denies the listed tool names, permits the rest.
pub struct ToolDenyListPolicy {
    denied: HashSet<String>,
}

impl ToolDenyListPolicy {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            denied: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToolPolicy for ToolDenyListPolicy {
    fn name(&self) -> &str {
        "tool_deny_list"
    }

    fn decide(&self, tool: &dyn Tool, _args: &Value) -> PolicyDecision {
        if self.denied.contains(tool.name()) {
            PolicyDecision::deny(format!("tool '{}' is on the deny list", tool.name()))
        } else {
            PolicyDecision::Allow
        }
    }
}

/// Denies tools declaring any of the listed capabilities.
pub struct CapabilityDenyPolicy {
    denied: HashSet<String>,
}

impl CapabilityDenyPolicy {
    pub fn new(capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            denied: capabilities.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToolPolicy for CapabilityDenyPolicy {
    fn name(&self) -> &str {
        "capability_deny"
    }

    fn decide(&self, tool: &dyn Tool, _args: &Value) -> PolicyDecision {
        match tool
            .capabilities()
            .iter()
            .find(|cap| self.denied.contains(**cap))
        {
            Some(cap) => PolicyDecision::deny(format!(
                "tool '{}' requires denied capability '{cap}'",
                tool.name()
            )),
            None => PolicyDecision::Allow,
        }
    }
}

/// Requires user approval for tools declaring any of the listed capabilities.
pub struct CapabilityApprovalPolicy {
    gated: HashSet<String>,
}

impl CapabilityApprovalPolicy {
    pub fn new(capabilities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            gated: capabilities.into_iter().map(Into::into).collect(),
        }
    }
}

impl ToolPolicy for CapabilityApprovalPolicy {
    fn name(&self) -> &str {
        "capability_approval"
    }

    fn decide(&self, tool: &dyn Tool, _args: &Value) -> PolicyDecision {
        match tool
            .capabilities()
            .iter()
            .find(|cap| self.gated.contains(**cap))
        {
            Some(cap) => PolicyDecision::ask(format!(
                "tool '{}' uses gated capability '{cap}'",
                tool.name()
            )),
            None => PolicyDecision::Allow,
        }
    }
}

/// Evaluates member policies in order and short-circuits on the first
/// non-allow decision. The rejecting member is attributed by name.
pub struct CompositePolicy {
    members: Vec<Arc<dyn ToolPolicy>>,
    /// Name of the member that produced the last non-allow decision.
    last_decider: std::sync::Mutex<Option<String>>,
}

impl CompositePolicy {
    pub fn new(members: Vec<Arc<dyn ToolPolicy>>) -> Self {
        Self {
            members,
            last_decider: std::sync::Mutex::new(None),
        }
    }

    /// The member that rejected most recently, if any.
    pub fn last_decider(&self) -> Option<String> {
        self.last_decider.lock().expect("policy lock").clone()
    }
}

impl ToolPolicy for CompositePolicy {
    fn name(&self) -> &str {
        "composite"
    }

    fn decide(&self, tool: &dyn Tool, args: &Value) -> PolicyDecision {
        for member in &self.members {
            match member.decide(tool, args) {
                PolicyDecision::Allow => continue,
                decision => {
                    *self.last_decider.lock().expect("policy lock") =
                        Some(member.name().to_string());
                    return decision;
                }
            }
        }
        PolicyDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{caps, FnTool};
    use serde_json::json;

    fn writer_tool() -> FnTool {
        FnTool::new(
            "write_thing",
            "writes",
            json!({"type": "object"}),
            |_, _| async { Ok(json!({"ok": true})) },
        )
        .with_capabilities(vec![caps::FS_WRITE])
    }

    fn reader_tool() -> FnTool {
        FnTool::new("read_thing", "reads", json!({"type": "object"}), |_, _| async {
            Ok(json!({"ok": true}))
        })
        .with_capabilities(vec![caps::FS_READ])
    }

    #[test]
    fn allow_and_deny_lists() {
        let tool = writer_tool();
        let allow = ToolAllowListPolicy::new(["write_thing"]);
        assert_eq!(allow.decide(&tool, &json!({})), PolicyDecision::Allow);

        let allow_other = ToolAllowListPolicy::new(["other"]);
        assert!(matches!(
            allow_other.decide(&tool, &json!({})),
            PolicyDecision::Deny { .. }
        ));

        let deny = ToolDenyListPolicy::new(["write_thing"]);
        assert!(matches!(
            deny.decide(&tool, &json!({})),
            PolicyDecision::Deny { .. }
        ));
    }

    #[test]
    fn capability_policies_match_tags() {
        let writer = writer_tool();
        let reader = reader_tool();

        let deny = CapabilityDenyPolicy::new([caps::FS_WRITE]);
        assert!(matches!(
            deny.decide(&writer, &json!({})),
            PolicyDecision::Deny { .. }
        ));
        assert_eq!(deny.decide(&reader, &json!({})), PolicyDecision::Allow);

        let gate = CapabilityApprovalPolicy::new([caps::FS_WRITE]);
        assert!(matches!(
            gate.decide(&writer, &json!({})),
            PolicyDecision::Ask { .. }
        ));
        assert_eq!(gate.decide(&reader, &json!({})), PolicyDecision::Allow);
    }

    #[test]
    fn composite_short_circuits_and_attributes() {
        let composite = CompositePolicy::new(vec![
            Arc::new(ToolDenyListPolicy::new(["never"])),
            Arc::new(CapabilityApprovalPolicy::new([caps::FS_WRITE])),
            Arc::new(DenyAllPolicy),
        ]);

        let writer = writer_tool();
        assert!(matches!(
            composite.decide(&writer, &json!({})),
            PolicyDecision::Ask { .. }
        ));
        assert_eq!(
            composite.last_decider().as_deref(),
            Some("capability_approval")
        );

        let reader = reader_tool();
        assert!(matches!(
            composite.decide(&reader, &json!({})),
            PolicyDecision::Deny { .. }
        ));
        assert_eq!(composite.last_decider().as_deref(), Some("deny_all"));
    }
}
