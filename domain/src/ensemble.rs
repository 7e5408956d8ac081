//! Ensemble entities: the parsed, validated shape of a YAML ensemble
//! definition. Grounded on the teacher's `orchestration::entities`
//! module — `Ensemble` plays the role of `QuorumConfig`, `FlowStep` the
//! role of `Phase`, built as plain structs with a small `validate`
//! method rather than deriving validation from the type system alone.

use crate::agent::Operation;
use crate::error::ConductorError;
use crate::scoring::{AggregationStrategy, BackoffStrategy, OnFailure};
use serde_json::Value;
use std::collections::HashMap;

/// Score thresholds an evaluator's output is judged against.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub minimum: f64,
    pub target: Option<f64>,
    pub excellent: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            minimum: 0.7,
            target: None,
            excellent: None,
        }
    }
}

/// How a flow step names the agent that runs it: either a lookup by
/// name against the registry, or a fully inline agent configuration.
#[derive(Debug, Clone)]
pub enum AgentReference {
    Named(String),
    Inline {
        operation: Operation,
        config: Value,
    },
}

impl AgentReference {
    pub fn display_name(&self) -> String {
        match self {
            AgentReference::Named(name) => name.clone(),
            AgentReference::Inline { operation, .. } => format!("<inline:{operation}>"),
        }
    }
}

/// A step's declared cross-step state usage.
#[derive(Debug, Clone, Default)]
pub struct StateAccess {
    pub use_keys: Vec<String>,
    pub set_keys: Vec<String>,
}

/// Per-step quality gate: an evaluator agent scores the step's output,
/// and the outcome decides whether to retry, continue, or abort.
#[derive(Debug, Clone)]
pub struct StepScoring {
    pub evaluator: AgentReference,
    pub criteria_weights: HashMap<String, f64>,
    pub criteria_minimums: HashMap<String, f64>,
    pub thresholds: Thresholds,
    pub on_failure: OnFailure,
    pub retry_limit: u32,
    pub require_improvement: bool,
    pub min_improvement: f64,
    pub backoff: BackoffStrategy,
    pub initial_backoff_ms: u64,
}

impl Default for StepScoring {
    fn default() -> Self {
        Self {
            evaluator: AgentReference::Named(String::new()),
            criteria_weights: HashMap::new(),
            criteria_minimums: HashMap::new(),
            thresholds: Thresholds::default(),
            on_failure: OnFailure::default(),
            retry_limit: 3,
            require_improvement: false,
            min_improvement: 0.05,
            backoff: BackoffStrategy::default(),
            initial_backoff_ms: 1_000,
        }
    }
}

impl StepScoring {
    pub fn validate(&self) -> Result<(), ConductorError> {
        if !(0.0..=1.0).contains(&self.thresholds.minimum) {
            return Err(ConductorError::AgentConfig {
                reference: self.evaluator.display_name(),
                message: format!(
                    "scoring threshold must be within [0,1], got {}",
                    self.thresholds.minimum
                ),
            });
        }
        if self.on_failure == OnFailure::Retry && self.retry_limit == 0 {
            return Err(ConductorError::AgentConfig {
                reference: self.evaluator.display_name(),
                message: "onFailure: retry requires retryLimit > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Advisory caching hint; the core never reads or writes a cache itself
/// — the agent is free to consult it.
#[derive(Debug, Clone, Default)]
pub struct CacheHint {
    pub ttl_seconds: Option<u64>,
    pub bypass: bool,
}

/// One step of an ensemble's flow: run `agent` with `input`, optionally
/// gated by `scoring`, optionally reading/writing cross-step `state`.
/// `name` is the step's identifying key within `executionContext` — for a
/// named agent reference this is the reference itself (the shape every
/// example in §6/§8 uses); inline agents get an explicit name.
#[derive(Debug, Clone)]
pub struct FlowStep {
    pub name: String,
    pub agent: AgentReference,
    pub input: Value,
    pub state: Option<StateAccess>,
    pub cache: Option<CacheHint>,
    pub scoring: Option<StepScoring>,
    /// Reserved; not evaluated by the core.
    pub condition: Option<Value>,
}

impl FlowStep {
    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.name.trim().is_empty() {
            return Err(ConductorError::EnsembleParse {
                ensemble: String::new(),
                report: "flow step name must not be empty".to_string(),
            });
        }
        if let Some(scoring) = &self.scoring {
            scoring.validate()?;
        }
        Ok(())
    }
}

/// An ensemble-level invocation trigger. `Webhook`'s `public`/`auth` pair
/// enforces one rule: a non-public webhook must name an auth scheme.
#[derive(Debug, Clone)]
pub enum Trigger {
    Webhook {
        path: String,
        public: bool,
        auth: Option<String>,
    },
    Mcp {
        tool_name: String,
    },
    Email {
        address: String,
    },
    Queue {
        topic: String,
    },
    Cron {
        schedule: String,
    },
}

impl Trigger {
    pub fn validate(&self) -> Result<(), ConductorError> {
        if let Trigger::Webhook { path, public, auth } = self {
            if !*public && auth.is_none() {
                return Err(ConductorError::AgentConfig {
                    reference: path.clone(),
                    message: "non-public webhook trigger requires an auth scheme".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A configured notification target, subscribed to a subset of lifecycle
/// events.
#[derive(Debug, Clone)]
pub enum Notification {
    Webhook {
        url: String,
        events: Vec<NotificationEventKind>,
        secret: Option<String>,
        retries: Option<u32>,
        timeout_ms: Option<u64>,
    },
    Email {
        to: String,
        events: Vec<NotificationEventKind>,
        subject: Option<String>,
        from: Option<String>,
    },
}

impl Notification {
    pub fn events(&self) -> &[NotificationEventKind] {
        match self {
            Notification::Webhook { events, .. } => events,
            Notification::Email { events, .. } => events,
        }
    }

    pub fn subscribes_to(&self, event: NotificationEventKind) -> bool {
        self.events().contains(&event)
    }
}

/// Lifecycle events an ensemble run can notify on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationEventKind {
    ExecutionStarted,
    ExecutionCompleted,
    ExecutionFailed,
    ExecutionTimeout,
    AgentCompleted,
    StateUpdated,
}

impl NotificationEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEventKind::ExecutionStarted => "execution.started",
            NotificationEventKind::ExecutionCompleted => "execution.completed",
            NotificationEventKind::ExecutionFailed => "execution.failed",
            NotificationEventKind::ExecutionTimeout => "execution.timeout",
            NotificationEventKind::AgentCompleted => "agent.completed",
            NotificationEventKind::StateUpdated => "state.updated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "execution.started" => Some(NotificationEventKind::ExecutionStarted),
            "execution.completed" => Some(NotificationEventKind::ExecutionCompleted),
            "execution.failed" => Some(NotificationEventKind::ExecutionFailed),
            "execution.timeout" => Some(NotificationEventKind::ExecutionTimeout),
            "agent.completed" => Some(NotificationEventKind::AgentCompleted),
            "state.updated" => Some(NotificationEventKind::StateUpdated),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ensemble-wide scoring defaults, applied to any step whose own
/// `scoring` block doesn't override them.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub enabled: bool,
    pub default_thresholds: Thresholds,
    pub max_retries: u32,
    pub backoff_strategy: BackoffStrategy,
    pub initial_backoff_ms: u64,
    pub track_in_state: bool,
    pub criteria_weights: HashMap<String, f64>,
    pub aggregation: AggregationStrategy,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_thresholds: Thresholds::default(),
            max_retries: 3,
            backoff_strategy: BackoffStrategy::default(),
            initial_backoff_ms: 1_000,
            track_in_state: false,
            criteria_weights: HashMap::new(),
            aggregation: AggregationStrategy::default(),
        }
    }
}

/// Ensemble-level state seed: initial values visible to the first step
/// that declares a matching `use` key.
#[derive(Debug, Clone, Default)]
pub struct StateConfig {
    pub initial: Value,
}

/// A fully parsed and validated ensemble definition.
#[derive(Debug, Clone)]
pub struct Ensemble {
    pub name: String,
    pub description: Option<String>,
    pub trigger: Vec<Trigger>,
    pub flow: Vec<FlowStep>,
    pub state: Option<StateConfig>,
    pub scoring: Option<ScoringConfig>,
    pub notifications: Vec<Notification>,
    /// Interpolation template producing the final result; absent means
    /// "use the last step's output."
    pub output: Option<Value>,
}

impl Ensemble {
    /// Every configured target subscribed to `event`.
    pub fn notifications_for(&self, event: NotificationEventKind) -> Vec<&Notification> {
        self.notifications
            .iter()
            .filter(|n| n.subscribes_to(event))
            .collect()
    }
}

impl Ensemble {
    pub fn validate(&self) -> Result<(), ConductorError> {
        if self.name.trim().is_empty() {
            return Err(ConductorError::EnsembleParse {
                ensemble: self.name.clone(),
                report: "ensemble name must not be empty".to_string(),
            });
        }
        if self.flow.is_empty() {
            return Err(ConductorError::EnsembleParse {
                ensemble: self.name.clone(),
                report: "ensemble must declare at least one flow step".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.flow {
            step.validate().map_err(|e| self.with_ensemble_name(e))?;
            if !seen.insert(step.name.clone()) {
                return Err(ConductorError::EnsembleParse {
                    ensemble: self.name.clone(),
                    report: format!("duplicate flow step name '{}'", step.name),
                });
            }
        }
        for trigger in &self.trigger {
            trigger.validate().map_err(|e| self.with_ensemble_name(e))?;
        }
        Ok(())
    }

    fn with_ensemble_name(&self, err: ConductorError) -> ConductorError {
        match err {
            ConductorError::EnsembleParse { report, .. } => ConductorError::EnsembleParse {
                ensemble: self.name.clone(),
                report,
            },
            ConductorError::AgentConfig { reference, message } => ConductorError::EnsembleParse {
                ensemble: self.name.clone(),
                report: format!("agent '{reference}': {message}"),
            },
            other => other,
        }
    }

    pub fn step(&self, name: &str) -> Option<&FlowStep> {
        self.flow.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(name: &str) -> FlowStep {
        FlowStep {
            name: name.to_string(),
            agent: AgentReference::Named("noop".to_string()),
            input: json!({}),
            state: None,
            cache: None,
            scoring: None,
            condition: None,
        }
    }

    #[test]
    fn test_ensemble_requires_at_least_one_step() {
        let ensemble = Ensemble {
            name: "empty".to_string(),
            description: None,
            trigger: vec![],
            flow: vec![],
            state: None,
            scoring: None,
            notifications: Vec::new(),
            output: None,
        };
        assert!(ensemble.validate().is_err());
    }

    #[test]
    fn test_ensemble_rejects_duplicate_step_names() {
        let ensemble = Ensemble {
            name: "dup".to_string(),
            description: None,
            trigger: vec![],
            flow: vec![step("a"), step("a")],
            state: None,
            scoring: None,
            notifications: Vec::new(),
            output: None,
        };
        let err = ensemble.validate().unwrap_err();
        assert!(matches!(err, ConductorError::EnsembleParse { .. }));
    }

    #[test]
    fn test_non_public_webhook_requires_auth() {
        let trigger = Trigger::Webhook {
            path: "/hook".to_string(),
            public: false,
            auth: None,
        };
        assert!(trigger.validate().is_err());

        let trigger_ok = Trigger::Webhook {
            path: "/hook".to_string(),
            public: false,
            auth: Some("bearer".to_string()),
        };
        assert!(trigger_ok.validate().is_ok());
    }

    #[test]
    fn test_public_webhook_does_not_require_auth() {
        let trigger = Trigger::Webhook {
            path: "/hook".to_string(),
            public: true,
            auth: None,
        };
        assert!(trigger.validate().is_ok());
    }

    #[test]
    fn test_retry_on_failure_requires_nonzero_retry_limit() {
        let scoring = StepScoring {
            evaluator: AgentReference::Named("judge".to_string()),
            thresholds: Thresholds { minimum: 0.8, ..Default::default() },
            on_failure: OnFailure::Retry,
            retry_limit: 0,
            ..Default::default()
        };
        assert!(scoring.validate().is_err());
    }

    #[test]
    fn test_notifications_for_filters_by_subscribed_event() {
        let webhook = Notification::Webhook {
            url: "https://hooks.example.com/a".to_string(),
            events: vec![NotificationEventKind::ExecutionFailed],
            secret: None,
            retries: None,
            timeout_ms: None,
        };
        let email = Notification::Email {
            to: "ops@example.com".to_string(),
            events: vec![
                NotificationEventKind::ExecutionCompleted,
                NotificationEventKind::ExecutionFailed,
            ],
            subject: None,
            from: None,
        };
        let ensemble = Ensemble {
            name: "notified".to_string(),
            description: None,
            trigger: vec![],
            flow: vec![step("only")],
            state: None,
            scoring: None,
            notifications: vec![webhook, email],
            output: None,
        };

        assert_eq!(
            ensemble
                .notifications_for(NotificationEventKind::ExecutionCompleted)
                .len(),
            1
        );
        assert_eq!(
            ensemble
                .notifications_for(NotificationEventKind::ExecutionFailed)
                .len(),
            2
        );
        assert_eq!(
            ensemble
                .notifications_for(NotificationEventKind::AgentCompleted)
                .len(),
            0
        );
    }

    #[test]
    fn test_step_lookup_by_name() {
        let ensemble = Ensemble {
            name: "lookup".to_string(),
            description: None,
            trigger: vec![],
            flow: vec![step("first"), step("second")],
            state: None,
            scoring: None,
            notifications: Vec::new(),
            output: None,
        };
        assert!(ensemble.step("second").is_some());
        assert!(ensemble.step("missing").is_none());
    }
}
