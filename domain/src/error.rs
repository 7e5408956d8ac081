//! Domain error taxonomy.
//!
//! Mirrors the teacher's `DomainError` shape: one `thiserror` variant per
//! case, a `#[source]` cause chain, and predicate helpers for the
//! call sites that need to branch on error kind rather than match on it.

use thiserror::Error;

/// Top-level error taxonomy for the ensemble engine.
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("agent configuration error for '{reference}': {message}")]
    AgentConfig { reference: String, message: String },

    #[error("agent '{agent}' execution failed: {message}")]
    AgentExecution {
        agent: String,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("ensemble '{ensemble}' failed to parse: {report}")]
    EnsembleParse { ensemble: String, report: String },

    #[error("ensemble '{ensemble}' execution failed at agent {agent:?}: {message}")]
    EnsembleExecution {
        ensemble: String,
        agent: Option<String>,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("storage entry not found: {0}")]
    StorageNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ConductorError {
    pub fn agent_execution(
        agent: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ConductorError::AgentExecution {
            agent: agent.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn agent_execution_with_cause(
        agent: impl Into<String>,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConductorError::AgentExecution {
            agent: agent.into(),
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Wrap any error as an `EnsembleExecution` failure, stamping it with
    /// the ensemble and (optionally) agent name it occurred under.
    pub fn ensemble_execution(
        ensemble: impl Into<String>,
        agent: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        ConductorError::EnsembleExecution {
            ensemble: ensemble.into(),
            agent,
            message: message.into(),
            cause: None,
        }
    }

    pub fn ensemble_name(&self) -> Option<&str> {
        match self {
            ConductorError::EnsembleParse { ensemble, .. }
            | ConductorError::EnsembleExecution { ensemble, .. } => Some(ensemble),
            _ => None,
        }
    }

    pub fn agent_name(&self) -> Option<&str> {
        match self {
            ConductorError::AgentExecution { agent, .. } => Some(agent),
            ConductorError::EnsembleExecution { agent, .. } => agent.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConductorError::AgentNotFound(_) | ConductorError::StorageNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_not_found_display() {
        let err = ConductorError::AgentNotFound("ghost".to_string());
        assert!(err.to_string().contains("ghost"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ensemble_execution_carries_names() {
        let err = ConductorError::ensemble_execution(
            "onboard-customer",
            Some("send-welcome".to_string()),
            "boom",
        );
        assert_eq!(err.ensemble_name(), Some("onboard-customer"));
        assert_eq!(err.agent_name(), Some("send-welcome"));
    }

    #[test]
    fn test_agent_execution_not_found_kind() {
        let err = ConductorError::agent_execution("a", "failed");
        assert!(!err.is_not_found());
        assert_eq!(err.agent_name(), Some("a"));
    }
}
