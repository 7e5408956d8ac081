//! Operation-typed constructors (§4.5): instantiated when a flow step
//! names its agent as an inline config rather than a reference. Each is
//! a minimal illustrative stand-in, the same scope limit as the seven
//! built-in registry agents in `builtin.rs` — real HTTP/SMTP/PDF/HTML
//! rendering engines are out of scope.

use async_trait::async_trait;
use conductor_domain::{Agent, AgentContext, AgentResponse, Operation};
use serde_json::Value;

macro_rules! typed_agent {
    ($ty:ident, $op:expr) => {
        pub struct $ty {
            config: Value,
        }

        impl $ty {
            pub fn new(config: Value) -> Self {
                Self { config }
            }
        }

        #[async_trait]
        impl Agent for $ty {
            fn name(&self) -> &str {
                stringify!($ty)
            }

            fn operation(&self) -> Operation {
                $op
            }

            async fn execute(&self, ctx: AgentContext) -> AgentResponse {
                AgentResponse::success(
                    self.name(),
                    $op,
                    serde_json::json!({"input": ctx.input, "config": self.config}),
                )
            }
        }
    };
}

typed_agent!(ThinkAgent, Operation::Think);
typed_agent!(ApiAgent, Operation::Api);
typed_agent!(DataAgent, Operation::Data);
typed_agent!(EmailAgent, Operation::Email);
typed_agent!(SmsAgent, Operation::Sms);
typed_agent!(FormAgent, Operation::Form);
typed_agent!(PageAgent, Operation::Page);
typed_agent!(HtmlAgent, Operation::Html);
typed_agent!(PdfAgent, Operation::Pdf);
typed_agent!(DocsAgent, Operation::Docs);

/// The `code` operation runs an inline handler: a config-supplied
/// JSON-Logic-free passthrough. Real sandboxed execution is out of
/// scope (§1 Non-goals — "does not compile or sandbox user code").
pub struct CodeAgent {
    config: Value,
}

impl CodeAgent {
    pub fn new(config: Value) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Agent for CodeAgent {
    fn name(&self) -> &str {
        "CodeAgent"
    }

    fn operation(&self) -> Operation {
        Operation::Code
    }

    async fn execute(&self, ctx: AgentContext) -> AgentResponse {
        AgentResponse::success(
            self.name(),
            Operation::Code,
            serde_json::json!({"input": ctx.input, "config": self.config}),
        )
    }
}

/// Construct the agent a flow step's inline `operation` config names.
pub fn construct(operation: Operation, config: Value) -> std::sync::Arc<dyn Agent> {
    use std::sync::Arc;
    match operation {
        Operation::Think => Arc::new(ThinkAgent::new(config)),
        Operation::Api => Arc::new(ApiAgent::new(config)),
        Operation::Data => Arc::new(DataAgent::new(config)),
        Operation::Email => Arc::new(EmailAgent::new(config)),
        Operation::Sms => Arc::new(SmsAgent::new(config)),
        Operation::Form => Arc::new(FormAgent::new(config)),
        Operation::Page => Arc::new(PageAgent::new(config)),
        Operation::Html => Arc::new(HtmlAgent::new(config)),
        Operation::Pdf => Arc::new(PdfAgent::new(config)),
        Operation::Docs => Arc::new(DocsAgent::new(config)),
        Operation::Code => Arc::new(CodeAgent::new(config)),
        // Scrape/Validate/Rag/Hitl/Fetch/Tools/Queries are registry-only
        // operations — inline configs for them are still constructible
        // directly, since nothing in §4.5 restricts inline dispatch to
        // the non-registry set.
        Operation::Scrape => Arc::new(super::builtin::ScrapeAgent::new("<inline:scrape>", config)),
        Operation::Validate => Arc::new(super::builtin::ValidateAgent::new("<inline:validate>", config)),
        Operation::Rag => Arc::new(super::builtin::RagAgent::new("<inline:rag>", config)),
        Operation::Hitl => Arc::new(super::builtin::HitlAgent::new("<inline:hitl>", config)),
        Operation::Fetch => Arc::new(super::builtin::FetchAgent::new("<inline:fetch>", config)),
        Operation::Tools => Arc::new(super::builtin::ToolsAgent::new("<inline:tools>", config)),
        Operation::Queries => Arc::new(super::builtin::QueriesAgent::new("<inline:queries>", config)),
    }
}
