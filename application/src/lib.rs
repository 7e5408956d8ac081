//! Application layer for the Conductor ensemble execution engine.
//!
//! This crate contains use cases and port definitions. It depends only on
//! the domain layer — parsing, registries, HTTP, and other adapters live
//! in `conductor-infrastructure`.

pub mod ports;
pub mod use_cases;

pub use ports::{
    agent_resolver::AgentResolverPort,
    ensemble_parser::EnsembleParserPort,
    notification_sender::{NotificationResult, NotificationSenderPort},
};
pub use use_cases::execute_ensemble::{
    ExecuteEnsembleUseCase, ExecutionMetrics, ExecutionOutput, StepMetric, SuspendedState,
};
pub use use_cases::scoring_executor::{ScoredOutcome, ScoringExecutor, StepStatus};
