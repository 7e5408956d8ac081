//! Agent Resolver port.
//!
//! Defines how the orchestrator turns an agent reference (or an inline
//! operation-typed config) into a runnable `Agent`. The default
//! implementation (built-in registry + user-registered map) lives in
//! `conductor-infrastructure::resolver`.

use conductor_domain::{Agent, ConductorError, Operation};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Port for resolving agents by reference or inline configuration.
///
/// This port defines how the application layer looks up agents.
/// Implementations (adapters) live in the infrastructure layer.
pub trait AgentResolverPort: Send + Sync {
    /// Resolve `name` or `name@version` per §4.5.
    fn resolve(&self, reference: &str) -> Result<Arc<dyn Agent>, ConductorError>;

    /// Construct an agent from an inline operation-typed config (used
    /// when a flow step names its agent inline rather than by reference).
    fn resolve_inline(&self, operation: Operation, config: Value) -> Result<Arc<dyn Agent>, ConductorError>;

    /// The union of built-in and user-registered agent names, used by
    /// reference validation during parsing.
    fn available_names(&self) -> HashSet<String>;
}
