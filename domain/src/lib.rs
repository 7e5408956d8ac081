//! Domain layer for the Conductor ensemble execution engine.
//!
//! This crate contains the core business logic, entities, and value
//! objects for resolving and walking an ensemble flow. It has no
//! dependencies on infrastructure (YAML parsing, HTTP, registries) or
//! presentation concerns — everything here is pure data and pure
//! functions over `serde_json::Value`.

pub mod agent;
pub mod ensemble;
pub mod error;
pub mod interpolation;
pub mod scoring;
pub mod state;

pub use agent::{Agent, AgentContext, AgentError, AgentResponse, Operation, StateHandle};
pub use ensemble::{
    AgentReference, CacheHint, Ensemble, FlowStep, Notification, NotificationEventKind,
    ScoringConfig, StateAccess, StateConfig, StepScoring, Thresholds, Trigger,
};
pub use error::ConductorError;
pub use scoring::{
    AggregationStrategy, BackoffStrategy, EnsembleScorer, OnFailure, QualityMetrics, Score,
    ScoringState, Trend,
};
pub use state::{AccessLogEntry, AccessOperation, AccessReport, StateManager, StateWriter};
