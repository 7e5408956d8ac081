//! Concrete `Agent` implementations: the seven built-in registry
//! members plus the operation-typed inline constructors.

pub mod builtin;
pub mod typed;

pub use builtin::{
    FetchAgent, HitlAgent, QueriesAgent, RagAgent, ScrapeAgent, ToolsAgent, ValidateAgent,
};
pub use typed::{
    construct, ApiAgent, CodeAgent, DataAgent, DocsAgent, EmailAgent, FormAgent, HtmlAgent,
    PageAgent, PdfAgent, SmsAgent, ThinkAgent,
};
