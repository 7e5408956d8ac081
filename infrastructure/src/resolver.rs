//! Agent Resolver (§4.5): composes the built-in registry with a
//! user-registered map, implementing the versioned/unversioned lookup
//! algorithm.
//!
//! Grounded on the same `ToolRegistry`/`ToolProvider` split the built-in
//! registry borrows from, collapsed to a two-tier lookup: built-in
//! factory first, then the user-supplied map, caching versioned
//! composite keys (`name@version`) the first time they resolve to an
//! unversioned user agent.

use crate::agents::typed;
use crate::registry::BuiltinRegistry;
use conductor_application::AgentResolverPort;
use conductor_domain::{Agent, ConductorError, Operation};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Default implementation of the agent resolver port.
pub struct Resolver {
    builtins: BuiltinRegistry,
    user_agents: std::collections::HashMap<String, Arc<dyn Agent>>,
    /// Cache of `name@version` composite keys resolved against an
    /// unversioned user agent, so repeat lookups don't reconstruct them.
    version_cache: RwLock<std::collections::HashMap<String, Arc<dyn Agent>>>,
}

impl Resolver {
    pub fn new(user_agents: std::collections::HashMap<String, Arc<dyn Agent>>) -> Self {
        Self {
            builtins: BuiltinRegistry::global(),
            user_agents,
            version_cache: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::collections::HashMap::new())
    }
}

impl AgentResolverPort for Resolver {
    fn resolve(&self, reference: &str) -> Result<Arc<dyn Agent>, ConductorError> {
        match reference.split_once('@') {
            None => {
                if let Some(agent) = self.builtins.create(reference, Value::Null) {
                    return Ok(agent);
                }
                self.user_agents
                    .get(reference)
                    .cloned()
                    .ok_or_else(|| ConductorError::AgentNotFound(reference.to_string()))
            }
            Some((name, _version)) => {
                if let Some(agent) = self.user_agents.get(reference) {
                    return Ok(agent.clone());
                }
                if let Some(cached) = self.version_cache.read().unwrap().get(reference) {
                    return Ok(cached.clone());
                }
                let unversioned = self.user_agents.get(name).cloned().ok_or_else(|| {
                    ConductorError::AgentConfig {
                        reference: reference.to_string(),
                        message: format!("no agent registered for version of '{name}'"),
                    }
                })?;
                self.version_cache
                    .write()
                    .unwrap()
                    .insert(reference.to_string(), unversioned.clone());
                Ok(unversioned)
            }
        }
    }

    fn resolve_inline(&self, operation: Operation, config: Value) -> Result<Arc<dyn Agent>, ConductorError> {
        Ok(typed::construct(operation, config))
    }

    fn available_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = self.builtins.list().into_iter().map(|m| m.name).collect();
        names.extend(self.user_agents.keys().cloned());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_domain::{AgentContext, AgentResponse};

    struct StubAgent;
    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            "stub"
        }
        fn operation(&self) -> Operation {
            Operation::Code
        }
        async fn execute(&self, ctx: AgentContext) -> AgentResponse {
            AgentResponse::success("stub", Operation::Code, ctx.input)
        }
    }

    #[test]
    fn test_resolves_builtin_by_bare_name() {
        let resolver = Resolver::empty();
        assert!(resolver.resolve("fetch").is_ok());
    }

    #[test]
    fn test_unknown_bare_name_is_agent_not_found() {
        let resolver = Resolver::empty();
        let err = resolver.resolve("ghost").unwrap_err();
        assert!(matches!(err, ConductorError::AgentNotFound(_)));
    }

    #[test]
    fn test_versioned_reference_falls_back_to_unversioned_user_agent() {
        let mut user_agents: std::collections::HashMap<String, Arc<dyn Agent>> = Default::default();
        user_agents.insert("custom".to_string(), Arc::new(StubAgent));
        let resolver = Resolver::new(user_agents);

        assert!(resolver.resolve("custom@2").is_ok());
    }

    #[test]
    fn test_versioned_reference_without_any_user_agent_is_agent_config_error() {
        let resolver = Resolver::empty();
        let err = resolver.resolve("ghost@3").unwrap_err();
        assert!(matches!(err, ConductorError::AgentConfig { .. }));
    }

    #[test]
    fn test_available_names_includes_builtins_and_user_agents() {
        let mut user_agents: std::collections::HashMap<String, Arc<dyn Agent>> = Default::default();
        user_agents.insert("custom".to_string(), Arc::new(StubAgent));
        let resolver = Resolver::new(user_agents);
        let names = resolver.available_names();
        assert!(names.contains("fetch"));
        assert!(names.contains("custom"));
    }
}
