//! The `Agent` contract: the uniform interface every built-in or
//! user-registered member implements. Mirrors the teacher's
//! `ToolProvider`/`ToolResult` split (`quorum_domain::tool`), generalized
//! from "tool call" to "agent execution" per spec §3/§6.

use crate::error::ConductorError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Error type surfaced by agent resolution/execution. An alias over the
/// shared taxonomy rather than a separate type — agents fail into the
/// same `ConductorError::AgentExecution`/`AgentConfig`/`AgentNotFound`
/// variants the rest of the engine uses.
pub type AgentError = ConductorError;

/// The operation (type) tag a built-in or inline-configured agent carries.
/// Drives the dispatch table in spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Scrape,
    Validate,
    Rag,
    Hitl,
    Fetch,
    Tools,
    Queries,
    Think,
    /// `http` config keyword, i.e. the API agent type.
    Api,
    /// `storage` config keyword, i.e. the Data agent type.
    Data,
    Email,
    Sms,
    Form,
    Page,
    Html,
    Pdf,
    Docs,
    Code,
}

impl Operation {
    /// Parse the `operation` field of an inline agent config, as used by
    /// §4.5's operation-typed constructor dispatch.
    pub fn from_config_str(s: &str) -> Result<Self, AgentError> {
        match s {
            "scrape" => Ok(Operation::Scrape),
            "validate" => Ok(Operation::Validate),
            "rag" => Ok(Operation::Rag),
            "hitl" => Ok(Operation::Hitl),
            "fetch" => Ok(Operation::Fetch),
            "tools" => Ok(Operation::Tools),
            "queries" => Ok(Operation::Queries),
            "think" => Ok(Operation::Think),
            "http" => Ok(Operation::Api),
            "storage" => Ok(Operation::Data),
            "email" => Ok(Operation::Email),
            "sms" => Ok(Operation::Sms),
            "form" => Ok(Operation::Form),
            "page" => Ok(Operation::Page),
            "html" => Ok(Operation::Html),
            "pdf" => Ok(Operation::Pdf),
            "docs" => Ok(Operation::Docs),
            "code" => Ok(Operation::Code),
            other => Err(ConductorError::AgentConfig {
                reference: other.to_string(),
                message: format!("unsupported operation '{other}'"),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Scrape => "scrape",
            Operation::Validate => "validate",
            Operation::Rag => "rag",
            Operation::Hitl => "hitl",
            Operation::Fetch => "fetch",
            Operation::Tools => "tools",
            Operation::Queries => "queries",
            Operation::Think => "think",
            Operation::Api => "http",
            Operation::Data => "storage",
            Operation::Email => "email",
            Operation::Sms => "sms",
            Operation::Form => "form",
            Operation::Page => "page",
            Operation::Html => "html",
            Operation::Pdf => "pdf",
            Operation::Docs => "docs",
            Operation::Code => "code",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only/write-limited state access handed to an agent whose flow
/// step declared a `state` block. Constructed by
/// [`crate::state::StateManager::get_state_for_agent`].
#[derive(Clone)]
pub struct StateHandle {
    /// Frozen view containing only the keys the step declared in `use`.
    pub view: Value,
    /// Sink for writes; only keys declared in `set` are retained.
    pub writer: crate::state::StateWriter,
}

/// Everything an agent needs to do its job for a single invocation.
#[derive(Clone)]
pub struct AgentContext {
    /// The resolved step input (after interpolation).
    pub input: Value,
    /// Host-provided environment bindings (secrets, base URLs, ...).
    pub env: Value,
    /// Opaque host runtime context (cancellation, request id, ...).
    pub runtime_ctx: Value,
    /// The execution context accumulated so far this run.
    pub previous_outputs: Value,
    /// Present only when the step declared a `state` block.
    pub state: Option<StateHandle>,
    /// Structured logger, if the host wired one in.
    pub logger: Option<Arc<dyn AgentLogger>>,
}

impl AgentContext {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            env: Value::Object(Default::default()),
            runtime_ctx: Value::Null,
            previous_outputs: Value::Object(Default::default()),
            state: None,
            logger: None,
        }
    }

    pub fn with_env(mut self, env: Value) -> Self {
        self.env = env;
        self
    }

    pub fn with_previous_outputs(mut self, previous_outputs: Value) -> Self {
        self.previous_outputs = previous_outputs;
        self
    }

    pub fn with_runtime_ctx(mut self, runtime_ctx: Value) -> Self {
        self.runtime_ctx = runtime_ctx;
        self
    }

    pub fn with_state(mut self, state: StateHandle) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn AgentLogger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

/// Minimal structured-logging sink an `AgentContext` can carry, so agents
/// don't need a hard dependency on `tracing` to emit diagnostics through
/// the host's chosen backend.
pub trait AgentLogger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// A logger that discards everything — the default when the host wires
/// nothing in.
pub struct NoopLogger;

impl AgentLogger for NoopLogger {
    fn debug(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Metadata stamped onto every `AgentResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponseMetadata {
    pub agent: String,
    #[serde(rename = "type")]
    pub operation: Operation,
}

/// The uniform response envelope every agent returns.
///
/// `success = false` is a business failure signaled in-band, distinct
/// from the agent's `Execute` throwing — the engine treats the latter as
/// an infrastructure error wrapped in `ConductorError::AgentExecution`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cached: bool,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub metadata: AgentResponseMetadata,
}

impl AgentResponse {
    pub fn success(agent: impl Into<String>, operation: Operation, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            cached: false,
            execution_time_ms: 0,
            timestamp: Utc::now(),
            metadata: AgentResponseMetadata {
                agent: agent.into(),
                operation,
            },
        }
    }

    pub fn failure(
        agent: impl Into<String>,
        operation: Operation,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            cached: false,
            execution_time_ms: 0,
            timestamp: Utc::now(),
            metadata: AgentResponseMetadata {
                agent: agent.into(),
                operation,
            },
        }
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}

/// The agent contract. `Name`/`Type` are cheap metadata accessors;
/// `execute` does the work.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn operation(&self) -> Operation;
    async fn execute(&self, ctx: AgentContext) -> AgentResponse;
}
