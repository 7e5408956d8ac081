//! Minimal stand-ins for the seven agents seeded into the built-in
//! registry at init (§4.4). Real scrape/validate/rag/hitl/fetch/tools/
//! queries implementations (HTTP clients, vector stores, human-in-the-
//! loop transports) are deliberately out of scope — these exist so the
//! registry and resolver have something real to construct and run.

use async_trait::async_trait;
use conductor_domain::{Agent, AgentContext, AgentResponse, Operation};
use serde_json::Value;

macro_rules! builtin_agent {
    ($ty:ident, $op:expr, $tag:literal) => {
        pub struct $ty {
            name: String,
            config: Value,
        }

        impl $ty {
            pub fn new(name: impl Into<String>, config: Value) -> Self {
                Self { name: name.into(), config }
            }
        }

        #[async_trait]
        impl Agent for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn operation(&self) -> Operation {
                $op
            }

            async fn execute(&self, ctx: AgentContext) -> AgentResponse {
                AgentResponse::success(
                    self.name.clone(),
                    $op,
                    serde_json::json!({
                        "agent": $tag,
                        "input": ctx.input,
                        "config": self.config,
                    }),
                )
            }
        }
    };
}

builtin_agent!(ScrapeAgent, Operation::Scrape, "scrape");
builtin_agent!(ValidateAgent, Operation::Validate, "validate");
builtin_agent!(RagAgent, Operation::Rag, "rag");
builtin_agent!(HitlAgent, Operation::Hitl, "hitl");
builtin_agent!(FetchAgent, Operation::Fetch, "fetch");
builtin_agent!(ToolsAgent, Operation::Tools, "tools");
builtin_agent!(QueriesAgent, Operation::Queries, "queries");

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scrape_agent_echoes_input_under_its_tag() {
        let agent = ScrapeAgent::new("scrape", serde_json::json!({"selector": "h1"}));
        let response = agent.execute(AgentContext::new(serde_json::json!({"url": "https://x"}))).await;

        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["agent"], "scrape");
        assert_eq!(data["input"]["url"], "https://x");
        assert_eq!(agent.operation(), Operation::Scrape);
    }

    #[tokio::test]
    async fn test_validate_agent_name_and_operation() {
        let agent = ValidateAgent::new("validate-input", Value::Null);
        assert_eq!(agent.name(), "validate-input");
        assert_eq!(agent.operation(), Operation::Validate);
    }
}
