//! Built-in Member Registry (§4.4): a process-wide table of the seven
//! built-in agent factories, seeded once at first use.
//!
//! Grounded on `infrastructure::tools::registry::ToolRegistry`'s
//! provider-aggregation shape, simplified to the spec's flat name→factory
//! table — the registry here has one authoritative built-in set rather
//! than competing priority-ordered providers.

use crate::agents;
use conductor_domain::{Agent, Operation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Metadata describing a built-in agent, independent of any one
/// invocation's config/env.
#[derive(Debug, Clone)]
pub struct AgentMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub operation: Operation,
    pub tags: Vec<String>,
}

type Factory = fn(name: &str, config: Value) -> Arc<dyn Agent>;

struct Entry {
    metadata: AgentMetadata,
    factory: Factory,
}

/// The process-wide built-in registry. Cheap to clone (an `Arc` over the
/// static table); `BuiltinRegistry::global()` is the usual entry point.
#[derive(Clone, Copy)]
pub struct BuiltinRegistry {
    entries: &'static HashMap<&'static str, Entry>,
}

fn table() -> &'static HashMap<&'static str, Entry> {
    static TABLE: OnceLock<HashMap<&'static str, Entry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert(
            "scrape",
            Entry {
                metadata: AgentMetadata {
                    name: "scrape".to_string(),
                    version: "1.0.0".to_string(),
                    description: "Extracts structured data from a page.".to_string(),
                    operation: Operation::Scrape,
                    tags: vec!["builtin".to_string(), "web".to_string()],
                },
                factory: |name, config| Arc::new(agents::ScrapeAgent::new(name, config)),
            },
        );
        map.insert(
            "validate",
            Entry {
                metadata: AgentMetadata {
                    name: "validate".to_string(),
                    version: "1.0.0".to_string(),
                    description: "Validates a step's input or output against rules.".to_string(),
                    operation: Operation::Validate,
                    tags: vec!["builtin".to_string()],
                },
                factory: |name, config| Arc::new(agents::ValidateAgent::new(name, config)),
            },
        );
        map.insert(
            "rag",
            Entry {
                metadata: AgentMetadata {
                    name: "rag".to_string(),
                    version: "1.0.0".to_string(),
                    description: "Retrieves context from a knowledge store.".to_string(),
                    operation: Operation::Rag,
                    tags: vec!["builtin".to_string(), "retrieval".to_string()],
                },
                factory: |name, config| Arc::new(agents::RagAgent::new(name, config)),
            },
        );
        map.insert(
            "hitl",
            Entry {
                metadata: AgentMetadata {
                    name: "hitl".to_string(),
                    version: "1.0.0".to_string(),
                    description: "Suspends for human review and approval.".to_string(),
                    operation: Operation::Hitl,
                    tags: vec!["builtin".to_string()],
                },
                factory: |name, config| Arc::new(agents::HitlAgent::new(name, config)),
            },
        );
        map.insert(
            "fetch",
            Entry {
                metadata: AgentMetadata {
                    name: "fetch".to_string(),
                    version: "1.0.0".to_string(),
                    description: "Issues an outbound HTTP request.".to_string(),
                    operation: Operation::Fetch,
                    tags: vec!["builtin".to_string(), "web".to_string()],
                },
                factory: |name, config| Arc::new(agents::FetchAgent::new(name, config)),
            },
        );
        map.insert(
            "tools",
            Entry {
                metadata: AgentMetadata {
                    name: "tools".to_string(),
                    version: "1.0.0".to_string(),
                    description: "Dispatches to a named host-provided tool.".to_string(),
                    operation: Operation::Tools,
                    tags: vec!["builtin".to_string()],
                },
                factory: |name, config| Arc::new(agents::ToolsAgent::new(name, config)),
            },
        );
        map.insert(
            "queries",
            Entry {
                metadata: AgentMetadata {
                    name: "queries".to_string(),
                    version: "1.0.0".to_string(),
                    description: "Runs a parameterized query against a data source.".to_string(),
                    operation: Operation::Queries,
                    tags: vec!["builtin".to_string(), "data".to_string()],
                },
                factory: |name, config| Arc::new(agents::QueriesAgent::new(name, config)),
            },
        );
        map
    })
}

impl BuiltinRegistry {
    pub fn global() -> Self {
        Self { entries: table() }
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Construct a fresh instance of the named built-in, or `None` if
    /// `name` isn't a built-in (the resolver falls through to the
    /// user-registered map in that case).
    pub fn create(&self, name: &str, config: Value) -> Option<Arc<dyn Agent>> {
        self.entries.get(name).map(|entry| (entry.factory)(name, config))
    }

    pub fn list(&self) -> Vec<AgentMetadata> {
        self.entries.values().map(|e| e.metadata.clone()).collect()
    }

    pub fn list_by_operation(&self, operation: Operation) -> Vec<AgentMetadata> {
        self.entries
            .values()
            .filter(|e| e.metadata.operation == operation)
            .map(|e| e.metadata.clone())
            .collect()
    }

    pub fn list_by_tag(&self, tag: &str) -> Vec<AgentMetadata> {
        self.entries
            .values()
            .filter(|e| e.metadata.tags.iter().any(|t| t == tag))
            .map(|e| e.metadata.clone())
            .collect()
    }

    pub fn metadata(&self, name: &str) -> Option<AgentMetadata> {
        self.entries.get(name).map(|e| e.metadata.clone())
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_with_seven_builtins() {
        let registry = BuiltinRegistry::global();
        assert_eq!(registry.list().len(), 7);
        for name in ["scrape", "validate", "rag", "hitl", "fetch", "tools", "queries"] {
            assert!(registry.is_builtin(name), "missing builtin '{name}'");
        }
    }

    #[test]
    fn test_create_unknown_name_returns_none() {
        let registry = BuiltinRegistry::global();
        assert!(registry.create("not-a-builtin", Value::Null).is_none());
    }

    #[tokio::test]
    async fn test_created_agent_runs() {
        let registry = BuiltinRegistry::global();
        let agent = registry.create("fetch", Value::Null).unwrap();
        let response = agent
            .execute(conductor_domain::AgentContext::new(serde_json::json!({"url": "https://x"})))
            .await;
        assert!(response.success);
    }

    #[test]
    fn test_list_by_operation_and_tag() {
        let registry = BuiltinRegistry::global();
        assert_eq!(registry.list_by_operation(Operation::Rag).len(), 1);
        assert_eq!(registry.list_by_tag("web").len(), 2);
    }
}
