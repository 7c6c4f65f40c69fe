//! Error taxonomy for the run supervisor.
//!
//! Tool failures are contained (converted to error results) and never cross
//! the engine boundary; everything that does cross a boundary is one of the
//! variants below so the failover loop can match on kind.

use thiserror::Error;

/// Errors surfaced by the supervisor, executor, and engines.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Backend missing or misconfigured; the candidate is skipped and
    /// failover continues.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Policy denied the call or the user declined approval.
    #[error("tool denied: {reason}")]
    ToolDenied {
        reason: String,
        /// Name of the policy that rejected, when known.
        policy: Option<String>,
    },

    /// The controller was cancelled before or during tool execution.
    #[error("tool cancelled: {0}")]
    ToolCancelled(String),

    /// Streaming or backend failure inside a provider engine.
    #[error("engine error: {message}")]
    Engine {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid supervisor or tool configuration (bad tool names, empty
    /// candidate plan, malformed options).
    #[error("configuration error: {0}")]
    Config(String),

    /// Terminal failover outcome: every candidate attempt failed.
    #[error("all provider candidates failed")]
    AllCandidatesFailed {
        #[source]
        last: Option<Box<AgentError>>,
    },
}

impl AgentError {
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::ToolDenied {
            reason: reason.into(),
            policy: None,
        }
    }

    pub fn denied_by(reason: impl Into<String>, policy: impl Into<String>) -> Self {
        Self::ToolDenied {
            reason: reason.into(),
            policy: Some(policy.into()),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
            source: None,
        }
    }

    pub fn engine_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Engine {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error means the run was cancelled rather than broken.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::ToolCancelled(_))
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
