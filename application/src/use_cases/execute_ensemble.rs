//! Execute Ensemble use case: the orchestrator that walks a validated
//! `Ensemble`'s flow step by step.
//!
//! Grounded on the teacher's `RunQuorumUseCase` (a use case struct holding
//! port handles, a public `execute`, and private phase helpers) and on
//! `shared::check_cancelled` for the cancellation-check shape threaded
//! through every suspension point.

use crate::ports::agent_resolver::AgentResolverPort;
use crate::ports::ensemble_parser::EnsembleParserPort;
use crate::ports::notification_sender::NotificationSenderPort;
use crate::use_cases::scoring_executor::{ScoredOutcome, ScoringExecutor, StepStatus};
use conductor_domain::interpolation::interpolate;
use conductor_domain::{
    AccessReport, Agent, AgentContext, AgentReference, ConductorError, Ensemble,
    EnsembleScorer, FlowStep, Notification, NotificationEventKind, Score, ScoringState,
    StateManager, StepScoring,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-step timing/outcome entry accumulated into `ExecutionMetrics`.
#[derive(Debug, Clone)]
pub struct StepMetric {
    pub name: String,
    pub duration_ms: u64,
    pub cached: bool,
    pub success: bool,
}

/// Run-level metrics returned alongside a flow's output.
#[derive(Debug, Clone)]
pub struct ExecutionMetrics {
    pub ensemble: String,
    pub total_duration_ms: u64,
    pub agents: Vec<StepMetric>,
    pub cache_hits: u32,
}

impl ExecutionMetrics {
    fn new(ensemble: impl Into<String>) -> Self {
        Self {
            ensemble: ensemble.into(),
            total_duration_ms: 0,
            agents: Vec::new(),
            cache_hits: 0,
        }
    }
}

/// The result of a completed (or resumed-to-completion) ensemble run.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub output: Value,
    pub metrics: ExecutionMetrics,
    pub state_report: Option<AccessReport>,
    pub scoring: Option<ScoringState>,
}

/// A durable snapshot of an in-flight run, handed back to the host when a
/// run is suspended mid-flow. The engine has no storage of its own — the
/// host persists this and replays it via [`ExecuteEnsembleUseCase::resume_execution`].
#[derive(Debug, Clone)]
pub struct SuspendedState {
    pub resume_from_step: usize,
    pub execution_context: Value,
    pub state_snapshot: Option<Value>,
    pub scoring_state: Option<ScoringState>,
    pub metrics: ExecutionMetrics,
}

fn check_cancelled(token: &CancellationToken) -> Result<(), ConductorError> {
    if token.is_cancelled() {
        return Err(ConductorError::Internal("execution cancelled".to_string()));
    }
    Ok(())
}

/// Extract a numeric score from an evaluator's response data: a raw
/// number, an object carrying `score`, an object carrying `value`, or
/// (absent all three) 0.0 — per §4.6 step 2.c.
fn extract_score(data: &Value) -> f64 {
    match data {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Object(map) => map
            .get("score")
            .or_else(|| map.get("value"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        _ => 0.0,
    }
}

fn extract_feedback(data: &Value) -> Option<String> {
    data.get("feedback").and_then(Value::as_str).map(str::to_string)
}

fn extract_breakdown(data: &Value) -> Option<std::collections::HashMap<String, f64>> {
    let breakdown = data.get("breakdown")?.as_object()?;
    Some(
        breakdown
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
            .collect(),
    )
}

/// Orchestrates a single ensemble run: resolves agents, applies
/// interpolation, drives the scoring retry loop where configured, and
/// fans out lifecycle notifications.
pub struct ExecuteEnsembleUseCase<R, N>
where
    R: AgentResolverPort + 'static,
    N: NotificationSenderPort + 'static,
{
    resolver: Arc<R>,
    notifier: Arc<N>,
}

impl<R, N> ExecuteEnsembleUseCase<R, N>
where
    R: AgentResolverPort + 'static,
    N: NotificationSenderPort + 'static,
{
    pub fn new(resolver: Arc<R>, notifier: Arc<N>) -> Self {
        Self { resolver, notifier }
    }

    /// Parse `yaml`, validate its agent references against the resolver's
    /// available names, then run it. Parse/validation failures surface as
    /// `ConductorError::EnsembleParse`.
    pub async fn execute_from_yaml(
        &self,
        parser: &dyn EnsembleParserPort,
        yaml: &str,
        input: Value,
        env: Value,
        runtime_ctx: Value,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionOutput, ConductorError> {
        let ensemble = parser.parse(yaml)?;
        parser.validate_agent_references(&ensemble, &self.resolver.available_names())?;
        self.execute_ensemble(&ensemble, input, env, runtime_ctx, cancellation)
            .await
    }

    /// Run `ensemble` from the top. §4.8 steps 1-8.
    pub async fn execute_ensemble(
        &self,
        ensemble: &Ensemble,
        input: Value,
        env: Value,
        runtime_ctx: Value,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionOutput, ConductorError> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let start = Instant::now();
        info!(ensemble = %ensemble.name, execution_id, "starting ensemble run");

        self.emit(
            NotificationEventKind::ExecutionStarted,
            ensemble,
            serde_json::json!({"executionId": execution_id}),
        );

        let state_manager = ensemble
            .state
            .as_ref()
            .map(|cfg| StateManager::new(cfg.initial.clone()));
        let scoring_state = ensemble
            .scoring
            .as_ref()
            .filter(|cfg| cfg.enabled)
            .map(|_| ScoringState::default());
        let metrics = ExecutionMetrics::new(ensemble.name.clone());

        let mut ctx = FlowContext {
            ensemble,
            execution_context: initial_execution_context(&input, &state_manager, &scoring_state),
            state_manager,
            scoring_state,
            metrics,
            env,
            runtime_ctx,
        };

        let result = self.execute_flow(&mut ctx, 0, cancellation).await;

        ctx.metrics.total_duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(output) => {
                self.emit(
                    NotificationEventKind::ExecutionCompleted,
                    ensemble,
                    serde_json::json!({
                        "executionId": execution_id,
                        "output": output,
                        "durationMs": ctx.metrics.total_duration_ms,
                    }),
                );
            }
            Err(err) => {
                self.emit(
                    NotificationEventKind::ExecutionFailed,
                    ensemble,
                    serde_json::json!({
                        "executionId": execution_id,
                        "message": err.to_string(),
                        "durationMs": ctx.metrics.total_duration_ms,
                    }),
                );
            }
        }

        result.map(|output| ExecutionOutput {
            output,
            state_report: ctx.state_manager.as_ref().map(StateManager::get_access_report),
            scoring: ctx.scoring_state,
            metrics: ctx.metrics,
        })
    }

    /// Reconstitute a suspended run from a host-persisted snapshot and
    /// continue from `suspended.resume_from_step`.
    pub async fn resume_execution(
        &self,
        ensemble: &Ensemble,
        suspended: SuspendedState,
        resume_input: Value,
        env: Value,
        runtime_ctx: Value,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionOutput, ConductorError> {
        let start = Instant::now();
        let state_manager = suspended.state_snapshot.map(StateManager::new);

        let mut execution_context = suspended.execution_context;
        if let Value::Object(map) = &mut execution_context {
            map.insert("resumeInput".to_string(), resume_input);
        }

        let mut ctx = FlowContext {
            ensemble,
            execution_context,
            state_manager,
            scoring_state: suspended.scoring_state,
            metrics: suspended.metrics,
            env,
            runtime_ctx,
        };

        let result = self
            .execute_flow(&mut ctx, suspended.resume_from_step, cancellation)
            .await;

        ctx.metrics.total_duration_ms += start.elapsed().as_millis() as u64;
        match &result {
            Ok(output) => self.emit(
                NotificationEventKind::ExecutionCompleted,
                ensemble,
                serde_json::json!({"output": output, "durationMs": ctx.metrics.total_duration_ms}),
            ),
            Err(err) => self.emit(
                NotificationEventKind::ExecutionFailed,
                ensemble,
                serde_json::json!({"message": err.to_string(), "durationMs": ctx.metrics.total_duration_ms}),
            ),
        }

        result.map(|output| ExecutionOutput {
            output,
            state_report: ctx.state_manager.as_ref().map(StateManager::get_access_report),
            scoring: ctx.scoring_state,
            metrics: ctx.metrics,
        })
    }

    /// Walk `ensemble.flow[start_step..]`, per §4.8's `executeFlow`.
    async fn execute_flow(
        &self,
        ctx: &mut FlowContext<'_>,
        start_step: usize,
        cancellation: &CancellationToken,
    ) -> Result<Value, ConductorError> {
        for (step_index, step) in ctx.ensemble.flow.iter().enumerate().skip(start_step) {
            check_cancelled(cancellation)?;

            let resolved_input = resolve_step_input(step, step_index, ctx);

            let agent = self.resolve_agent(&step.agent).map_err(|cause| {
                ConductorError::ensemble_execution(
                    ctx.ensemble.name.clone(),
                    Some(step.agent.display_name()),
                    format!("failed to resolve agent: {cause}"),
                )
            })?;

            let state_handle = match (&ctx.state_manager, &step.state) {
                (Some(manager), Some(access)) => {
                    Some(manager.get_state_for_agent(&step.name, &access.use_keys, &access.set_keys))
                }
                _ => None,
            };

            let mut base_ctx = AgentContext::new(resolved_input)
                .with_env(ctx.env.clone())
                .with_runtime_ctx(ctx.runtime_ctx.clone())
                .with_previous_outputs(ctx.execution_context.clone());
            if let Some(handle) = state_handle {
                base_ctx = base_ctx.with_state(handle);
            }

            let attempt_start = Instant::now();
            let (step_result, cached) = if let Some(scoring) = &step.scoring {
                let outcome = self
                    .run_scored_step(step, scoring, agent, base_ctx, ctx, cancellation)
                    .await?;
                let success = matches!(outcome.status, StepStatus::Passed | StepStatus::BelowThreshold);
                if !success {
                    warn!(step = %step.name, attempts = outcome.attempts, "step exhausted retries below threshold");
                }
                (Ok(outcome.output), false)
            } else {
                let response = agent.execute(base_ctx).await;
                if response.success {
                    if let Some(manager) = &ctx.state_manager {
                        if step.state.is_some() {
                            manager.apply_pending_updates();
                        }
                    }
                }
                let cached = response.cached;
                let result = if response.success {
                    Ok(response.data.unwrap_or(Value::Null))
                } else {
                    Err(ConductorError::ensemble_execution(
                        ctx.ensemble.name.clone(),
                        Some(step.agent.display_name()),
                        response.error.unwrap_or_else(|| "agent reported failure".to_string()),
                    ))
                };
                (result, cached)
            };

            ctx.metrics.agents.push(StepMetric {
                name: step.name.clone(),
                duration_ms: attempt_start.elapsed().as_millis() as u64,
                cached,
                success: step_result.is_ok(),
            });
            if cached {
                ctx.metrics.cache_hits += 1;
            }

            let output = step_result?;
            set_step_output(&mut ctx.execution_context, &step.name, &output);
            self.emit(
                NotificationEventKind::AgentCompleted,
                ctx.ensemble,
                serde_json::json!({"step": step.name, "success": true}),
            );

            if let Some(manager) = &ctx.state_manager {
                let snapshot = manager.snapshot();
                set_field(&mut ctx.execution_context, "state", snapshot.clone());
                self.emit(
                    NotificationEventKind::StateUpdated,
                    ctx.ensemble,
                    serde_json::json!({"step": step.name, "state": snapshot}),
                );
            }
            if let Some(scoring_state) = &ctx.scoring_state {
                set_field(
                    &mut ctx.execution_context,
                    "scoring",
                    scoring_state_to_value(scoring_state),
                );
            }
        }

        if let Some(scoring_state) = &ctx.scoring_state {
            set_field(
                &mut ctx.execution_context,
                "scoring",
                scoring_state_to_value(scoring_state),
            );
        }

        Ok(resolve_final_output(ctx))
    }

    async fn run_scored_step(
        &self,
        step: &FlowStep,
        scoring: &StepScoring,
        agent: Arc<dyn Agent>,
        base_ctx: AgentContext,
        ctx: &mut FlowContext<'_>,
        cancellation: &CancellationToken,
    ) -> Result<ScoredOutcome, ConductorError> {
        let evaluator = self.resolve_agent(&scoring.evaluator).map_err(|cause| {
            ConductorError::ensemble_execution(
                ctx.ensemble.name.clone(),
                Some(scoring.evaluator.display_name()),
                format!("failed to resolve evaluator: {cause}"),
            )
        })?;
        let step_name = step.name.clone();
        let criteria_minimums = scoring.criteria_minimums.clone();

        let state_manager = ctx.state_manager.clone();
        let step_state_declared = step.state.is_some();

        let outcome = ScoringExecutor::run(
            scoring,
            cancellation,
            {
                let agent = Arc::clone(&agent);
                let base_ctx = base_ctx.clone();
                let state_manager = state_manager.clone();
                move |_attempt| {
                    let agent = Arc::clone(&agent);
                    let ctx = base_ctx.clone();
                    let state_manager = state_manager.clone();
                    async move {
                        let response = agent.execute(ctx).await;
                        if response.success {
                            if let Some(manager) = &state_manager {
                                if step_state_declared {
                                    manager.apply_pending_updates();
                                }
                            }
                            Ok(response.data.unwrap_or(Value::Null))
                        } else {
                            Err(ConductorError::agent_execution(
                                agent.name().to_string(),
                                response.error.unwrap_or_else(|| "agent reported failure".to_string()),
                            ))
                        }
                    }
                }
            },
            {
                let evaluator = Arc::clone(&evaluator);
                let step_name = step_name.clone();
                let minimums = criteria_minimums.clone();
                move |output, attempt, last_score: Option<&Score>| {
                    let evaluator = Arc::clone(&evaluator);
                    let minimums = minimums.clone();
                    let step_name = step_name.clone();
                    let minimum = scoring.thresholds.minimum;
                    let last_score = last_score.cloned();
                    async move {
                        let eval_input = serde_json::json!({
                            "output": output,
                            "attempt": attempt,
                            "previousScore": last_score.as_ref().map(|s| s.score),
                            "criteria": minimums,
                        });
                        let eval_ctx = AgentContext::new(eval_input);
                        let response = evaluator.execute(eval_ctx).await;
                        if !response.success {
                            return Err(ConductorError::agent_execution(
                                evaluator.name().to_string(),
                                response.error.unwrap_or_else(|| "evaluator reported failure".to_string()),
                            ));
                        }
                        let data = response.data.unwrap_or(Value::Null);
                        let value = extract_score(&data);
                        let mut score = Score::new(step_name.clone(), value, minimum, attempt);
                        if let Some(feedback) = extract_feedback(&data) {
                            score = score.with_feedback(feedback);
                        }
                        if let Some(breakdown) = extract_breakdown(&data) {
                            score = score.with_breakdown(breakdown);
                        }
                        Ok(score)
                    }
                }
            },
        )
        .await?;

        for entry in &outcome.history {
            ctx.scoring_state = ctx
                .scoring_state
                .as_ref()
                .map(|prev| EnsembleScorer::update_scoring_state(prev, entry.clone()));
        }

        if outcome.status == StepStatus::MaxRetriesExceeded {
            warn!(step = %step.name, "max_retries_exceeded");
        }

        Ok(outcome)
    }

    fn resolve_agent(
        &self,
        reference: &AgentReference,
    ) -> Result<Arc<dyn Agent>, ConductorError> {
        match reference {
            AgentReference::Named(name) => self.resolver.resolve(name),
            AgentReference::Inline { operation, config } => {
                self.resolver.resolve_inline(*operation, config.clone())
            }
        }
    }

    /// Dispatch fire-and-forget: spawn the notification fan-out rather
    /// than blocking the flow on network I/O, per §4.8 step 2/7.
    fn emit(&self, event: NotificationEventKind, ensemble: &Ensemble, data: Value) {
        let targets: Vec<Notification> = ensemble
            .notifications_for(event)
            .into_iter()
            .cloned()
            .collect();
        if targets.is_empty() {
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        let ensemble_name = ensemble.name.clone();
        tokio::spawn(async move {
            let _ = notifier.dispatch(event, &ensemble_name, data, &targets).await;
        });
    }
}

struct FlowContext<'a> {
    ensemble: &'a Ensemble,
    execution_context: Value,
    state_manager: Option<StateManager>,
    scoring_state: Option<ScoringState>,
    metrics: ExecutionMetrics,
    env: Value,
    runtime_ctx: Value,
}

fn initial_execution_context(
    input: &Value,
    state_manager: &Option<StateManager>,
    scoring_state: &Option<ScoringState>,
) -> Value {
    let mut map = Map::new();
    map.insert("input".to_string(), input.clone());
    map.insert(
        "state".to_string(),
        state_manager.as_ref().map(StateManager::snapshot).unwrap_or(Value::Object(Map::new())),
    );
    map.insert(
        "scoring".to_string(),
        scoring_state
            .as_ref()
            .map(scoring_state_to_value)
            .unwrap_or(Value::Object(Map::new())),
    );
    Value::Object(map)
}

fn scoring_state_to_value(state: &ScoringState) -> Value {
    serde_json::json!({
        "finalScore": state.final_score,
        "totalEvaluations": state.quality_metrics.total_evaluations,
        "passRate": state.quality_metrics.pass_rate,
    })
}

fn set_field(execution_context: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = execution_context {
        map.insert(key.to_string(), value);
    }
}

fn set_step_output(execution_context: &mut Value, step_name: &str, output: &Value) {
    if let Value::Object(map) = execution_context {
        map.insert(step_name.to_string(), serde_json::json!({"output": output}));
    }
}

/// §4.8 step (a): interpolate `step.input` if declared, else fall back to
/// the previous step's output, else the run's initial input.
fn resolve_step_input(step: &FlowStep, step_index: usize, ctx: &FlowContext<'_>) -> Value {
    if !step.input.is_null() {
        return interpolate(&step.input, &ctx.execution_context);
    }
    if step_index > 0 {
        let prev_name = &ctx.ensemble.flow[step_index - 1].name;
        if let Some(prev) = ctx.execution_context.get(prev_name).and_then(|v| v.get("output")) {
            return prev.clone();
        }
    }
    ctx.execution_context
        .get("input")
        .cloned()
        .unwrap_or(Value::Null)
}

/// §4.8 post-loop: the ensemble's declared `output` template, else the
/// last step's output, else an empty object.
fn resolve_final_output(ctx: &FlowContext<'_>) -> Value {
    if let Some(template) = &ctx.ensemble.output {
        return interpolate(template, &ctx.execution_context);
    }
    if let Some(last_step) = ctx.ensemble.flow.last() {
        if let Some(output) = ctx.execution_context.get(&last_step.name).and_then(|v| v.get("output")) {
            return output.clone();
        }
    }
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::notification_sender::NotificationResult;
    use async_trait::async_trait;
    use conductor_domain::{
        AggregationStrategy, BackoffStrategy, Operation, OnFailure, ScoringConfig, StateConfig,
        Thresholds,
    };
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct EchoAgent {
        name: String,
    }

    #[async_trait]
    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            &self.name
        }
        fn operation(&self) -> Operation {
            Operation::Code
        }
        async fn execute(&self, ctx: AgentContext) -> AgentResponse {
            AgentResponse::success(self.name.clone(), Operation::Code, ctx.input)
        }
    }

    struct FailingAgent {
        name: String,
    }

    #[async_trait]
    impl Agent for FailingAgent {
        fn name(&self) -> &str {
            &self.name
        }
        fn operation(&self) -> Operation {
            Operation::Code
        }
        async fn execute(&self, _ctx: AgentContext) -> AgentResponse {
            AgentResponse::failure(self.name.clone(), Operation::Code, "boom")
        }
    }

    /// Evaluator that returns a fixed score drawn from a shared counter's
    /// position in `scores`, so a step can be scripted to pass on a
    /// specific attempt.
    struct ScriptedEvaluator {
        scores: Vec<f64>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Agent for ScriptedEvaluator {
        fn name(&self) -> &str {
            "judge"
        }
        fn operation(&self) -> Operation {
            Operation::Code
        }
        async fn execute(&self, _ctx: AgentContext) -> AgentResponse {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let score = self.scores.get(idx).copied().unwrap_or(0.0);
            AgentResponse::success("judge", Operation::Code, serde_json::json!({"score": score}))
        }
    }

    struct FakeResolver {
        agents: std::collections::HashMap<String, Arc<dyn Agent>>,
    }

    impl FakeResolver {
        fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
            let map = agents.into_iter().map(|a| (a.name().to_string(), a)).collect();
            Self { agents: map }
        }
    }

    impl AgentResolverPort for FakeResolver {
        fn resolve(&self, reference: &str) -> Result<Arc<dyn Agent>, ConductorError> {
            self.agents
                .get(reference)
                .cloned()
                .ok_or_else(|| ConductorError::AgentNotFound(reference.to_string()))
        }

        fn resolve_inline(&self, _operation: Operation, _config: Value) -> Result<Arc<dyn Agent>, ConductorError> {
            Err(ConductorError::AgentConfig {
                reference: "<inline>".to_string(),
                message: "not supported in this fake".to_string(),
            })
        }

        fn available_names(&self) -> HashSet<String> {
            self.agents.keys().cloned().collect()
        }
    }

    /// Records every dispatched event so tests can assert emission without
    /// blocking the flow on it.
    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<NotificationEventKind>>,
    }

    #[async_trait]
    impl NotificationSenderPort for RecordingNotifier {
        async fn dispatch(
            &self,
            event: NotificationEventKind,
            _ensemble_name: &str,
            _data: Value,
            _targets: &[Notification],
        ) -> Vec<NotificationResult> {
            self.events.lock().unwrap().push(event);
            Vec::new()
        }
    }

    fn flow_step(name: &str, agent: &str, input: Value) -> FlowStep {
        FlowStep {
            name: name.to_string(),
            agent: AgentReference::Named(agent.to_string()),
            input,
            state: None,
            cache: None,
            scoring: None,
            condition: None,
        }
    }

    fn ensemble(flow: Vec<FlowStep>) -> Ensemble {
        Ensemble {
            name: "test-ensemble".to_string(),
            description: None,
            trigger: vec![],
            flow,
            state: None,
            scoring: None,
            notifications: Vec::new(),
            output: None,
        }
    }

    fn use_case() -> ExecuteEnsembleUseCase<FakeResolver, RecordingNotifier> {
        let resolver = FakeResolver::new(vec![
            Arc::new(EchoAgent { name: "first".to_string() }),
            Arc::new(EchoAgent { name: "second".to_string() }),
            Arc::new(FailingAgent { name: "broken".to_string() }),
        ]);
        ExecuteEnsembleUseCase::new(Arc::new(resolver), Arc::new(RecordingNotifier::default()))
    }

    /// A step with no declared `input` falls back to the previous step's
    /// output; the first step falls back to the run's initial input.
    #[tokio::test]
    async fn test_input_resolution_fallback_chain() {
        let uc = use_case();
        let flow = vec![
            flow_step("first", "first", Value::Null),
            flow_step("second", "second", Value::Null),
        ];
        let token = CancellationToken::new();
        let result = uc
            .execute_ensemble(&ensemble(flow), serde_json::json!({"seed": 1}), Value::Null, Value::Null, &token)
            .await
            .unwrap();

        assert_eq!(result.output, serde_json::json!({"seed": 1}));
        assert_eq!(result.metrics.agents.len(), 2);
        assert!(result.metrics.agents.iter().all(|m| m.success));
    }

    /// An explicit `input` template is interpolated against the
    /// accumulated execution context rather than falling back.
    #[tokio::test]
    async fn test_input_resolution_honors_explicit_template() {
        let uc = use_case();
        let flow = vec![
            flow_step("first", "first", Value::Null),
            flow_step("second", "second", serde_json::json!({"value": "${first.output.seed}"})),
        ];
        let token = CancellationToken::new();
        let result = uc
            .execute_ensemble(&ensemble(flow), serde_json::json!({"seed": 7}), Value::Null, Value::Null, &token)
            .await
            .unwrap();

        assert_eq!(result.output, serde_json::json!({"value": 7}));
    }

    /// A failing agent's error still gets a `StepMetric` recorded before
    /// the error propagates — accounting happens before failure response.
    #[tokio::test]
    async fn test_unscored_failure_records_metric_before_propagating() {
        let uc = use_case();
        let flow = vec![flow_step("broken-step", "broken", serde_json::json!({}))];
        let token = CancellationToken::new();
        let err = uc
            .execute_ensemble(&ensemble(flow), Value::Null, Value::Null, Value::Null, &token)
            .await
            .unwrap_err();

        assert!(matches!(err, ConductorError::EnsembleExecution { .. }));
    }

    /// A scored step accumulates its evaluator's attempts into the run's
    /// `ScoringState` via `EnsembleScorer::update_scoring_state`.
    #[tokio::test]
    async fn test_scored_step_accumulates_scoring_state() {
        let resolver = FakeResolver::new(vec![
            Arc::new(EchoAgent { name: "writer".to_string() }),
            Arc::new(ScriptedEvaluator { scores: vec![0.5, 0.9], calls: AtomicU32::new(0) }),
        ]);
        let uc = ExecuteEnsembleUseCase::new(Arc::new(resolver), Arc::new(RecordingNotifier::default()));

        let mut step = flow_step("writer", "writer", serde_json::json!({"text": "draft"}));
        step.scoring = Some(StepScoring {
            evaluator: AgentReference::Named("judge".to_string()),
            thresholds: Thresholds { minimum: 0.8, ..Default::default() },
            on_failure: OnFailure::Retry,
            retry_limit: 3,
            backoff: BackoffStrategy::Fixed,
            initial_backoff_ms: 1,
            ..Default::default()
        });

        let mut ens = ensemble(vec![step]);
        ens.scoring = Some(ScoringConfig {
            enabled: true,
            default_thresholds: Thresholds::default(),
            max_retries: 3,
            backoff_strategy: BackoffStrategy::Fixed,
            initial_backoff_ms: 1,
            track_in_state: true,
            criteria_weights: Default::default(),
            aggregation: AggregationStrategy::WeightedAverage,
        });

        let token = CancellationToken::new();
        let result = uc
            .execute_ensemble(&ens, Value::Null, Value::Null, Value::Null, &token)
            .await
            .unwrap();

        let scoring = result.scoring.expect("scoring state tracked");
        assert_eq!(scoring.score_history.len(), 2);
        assert!(scoring.score_history.last().unwrap().passed);
    }

    /// State declared on a step flows through `StateManager` and is
    /// visible in the run's final snapshot.
    #[tokio::test]
    async fn test_step_state_access_reaches_final_snapshot() {
        let uc = use_case();
        let mut step = flow_step("first", "first", serde_json::json!({"ok": true}));
        step.state = Some(StateAccess {
            use_keys: vec!["counter".to_string()],
            set_keys: vec!["counter".to_string()],
        });
        let mut ens = ensemble(vec![step]);
        ens.state = Some(StateConfig { initial: serde_json::json!({"counter": 0}) });

        let token = CancellationToken::new();
        let result = uc
            .execute_ensemble(&ens, Value::Null, Value::Null, Value::Null, &token)
            .await
            .unwrap();

        let report = result.state_report.expect("state report present");
        assert!(!report.entries.is_empty());
    }

    /// With no declared `output` template, the final value is the last
    /// step's output; an empty flow falls back to an empty object.
    #[tokio::test]
    async fn test_final_output_falls_back_to_last_step() {
        let uc = use_case();
        let flow = vec![flow_step("second", "second", serde_json::json!({"done": true}))];
        let token = CancellationToken::new();
        let result = uc
            .execute_ensemble(&ensemble(flow), Value::Null, Value::Null, Value::Null, &token)
            .await
            .unwrap();

        assert_eq!(result.output, serde_json::json!({"done": true}));
    }

    /// Lifecycle notifications fire without the fire-and-forget dispatch
    /// blocking `execute_ensemble`'s return.
    #[tokio::test]
    async fn test_lifecycle_notifications_are_fire_and_forget() {
        let resolver = FakeResolver::new(vec![Arc::new(EchoAgent { name: "first".to_string() })]);
        let notifier = Arc::new(RecordingNotifier::default());
        let uc = ExecuteEnsembleUseCase::new(Arc::new(resolver), Arc::clone(&notifier));

        let mut ens = ensemble(vec![flow_step("first", "first", serde_json::json!({}))]);
        ens.notifications = vec![Notification::Webhook {
            url: "https://hooks.example.com/a".to_string(),
            events: vec![
                NotificationEventKind::ExecutionStarted,
                NotificationEventKind::ExecutionCompleted,
            ],
            secret: None,
            retries: None,
            timeout_ms: None,
        }];

        let token = CancellationToken::new();
        uc.execute_ensemble(&ens, Value::Null, Value::Null, Value::Null, &token)
            .await
            .unwrap();

        // Dispatch is spawned onto a background task; yield so it runs.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let events = notifier.events.lock().unwrap();
        assert!(events.contains(&NotificationEventKind::ExecutionStarted));
        assert!(events.contains(&NotificationEventKind::ExecutionCompleted));
    }

    /// Cancellation observed before a step starts surfaces as an internal
    /// error rather than running the step.
    #[tokio::test]
    async fn test_cancellation_aborts_before_next_step() {
        let uc = use_case();
        let flow = vec![flow_step("first", "first", serde_json::json!({}))];
        let token = CancellationToken::new();
        token.cancel();

        let err = uc
            .execute_ensemble(&ensemble(flow), Value::Null, Value::Null, Value::Null, &token)
            .await
            .unwrap_err();

        assert!(matches!(err, ConductorError::Internal(_)));
    }
}
