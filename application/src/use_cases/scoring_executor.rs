//! Scoring Executor: wraps a single step's agent call with a retry loop
//! driven by an evaluator agent's score.
//!
//! Grounded on the retry/backoff shape of the teacher's
//! `run_agent/planning.rs` (sequential retry after backoff, cancellation
//! checked at each attempt via `check_cancelled`) and the vote/score
//! pattern of `quorum_domain::quorum::vote::Vote`.

use conductor_domain::{ConductorError, Score, StepScoring};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Outcome of a scoring retry loop, per §4.6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    BelowThreshold,
    MaxRetriesExceeded,
}

#[derive(Debug, Clone)]
pub struct ScoredOutcome {
    pub output: serde_json::Value,
    pub score: Option<Score>,
    pub attempts: u32,
    pub status: StepStatus,
    /// Every scoring attempt made this step, in order — appended to the
    /// run's `scoringState.scoreHistory` regardless of final status.
    pub history: Vec<Score>,
}

fn check_cancelled(token: &CancellationToken) -> Result<(), ConductorError> {
    if token.is_cancelled() {
        return Err(ConductorError::Internal("execution cancelled".to_string()));
    }
    Ok(())
}

pub struct ScoringExecutor;

impl ScoringExecutor {
    /// Run `execute` (the step's primary agent) in a loop gated by
    /// `evaluate` (the evaluator agent), per §4.6's algorithm.
    ///
    /// `execute(attempt)` performs one invocation and returns its output.
    /// `evaluate(output, attempt, last_score)` resolves the evaluator and
    /// returns a `Score` (with `passed` already computed against
    /// `scoring.thresholds.minimum`).
    pub async fn run<ExecFut, EvalFut>(
        scoring: &StepScoring,
        cancellation: &CancellationToken,
        mut execute: impl FnMut(u32) -> ExecFut,
        mut evaluate: impl FnMut(serde_json::Value, u32, Option<&Score>) -> EvalFut,
    ) -> Result<ScoredOutcome, ConductorError>
    where
        ExecFut: Future<Output = Result<serde_json::Value, ConductorError>>,
        EvalFut: Future<Output = Result<Score, ConductorError>>,
    {
        let max_attempts = scoring.retry_limit.max(1);
        let mut attempts = 0u32;
        let mut backoff_ms = scoring.initial_backoff_ms;
        let mut last_score: Option<Score> = None;
        let mut last_output = serde_json::Value::Null;
        let mut history = Vec::new();

        loop {
            check_cancelled(cancellation)?;
            attempts += 1;

            let output = match execute(attempts).await {
                Ok(output) => output,
                Err(err) => {
                    if attempts >= max_attempts {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms = scoring.backoff.next_ms(backoff_ms);
                    continue;
                }
            };
            last_output = output.clone();

            let score = evaluate(output.clone(), attempts, last_score.as_ref()).await?;
            history.push(score.clone());

            if score.passed {
                let result_score = score.clone();
                last_score = Some(score);
                return Ok(ScoredOutcome {
                    output,
                    score: Some(result_score),
                    attempts,
                    status: StepStatus::Passed,
                    history,
                });
            }

            if scoring.require_improvement
                && attempts > 1
                && let Some(prev) = &last_score
                && score.score - prev.score < scoring.min_improvement
            {
                return Ok(ScoredOutcome {
                    output,
                    score: Some(score),
                    attempts,
                    status: StepStatus::MaxRetriesExceeded,
                    history,
                });
            }

            match scoring.on_failure {
                conductor_domain::OnFailure::Abort => {
                    return Err(ConductorError::Internal(format!(
                        "score {} below minimum {}",
                        score.score, scoring.thresholds.minimum
                    )));
                }
                conductor_domain::OnFailure::Continue => {
                    return Ok(ScoredOutcome {
                        output,
                        score: Some(score),
                        attempts,
                        status: StepStatus::BelowThreshold,
                        history,
                    });
                }
                conductor_domain::OnFailure::Retry => {
                    last_score = Some(score);
                    if attempts >= max_attempts {
                        return Ok(ScoredOutcome {
                            output: last_output,
                            score: last_score,
                            attempts,
                            status: StepStatus::MaxRetriesExceeded,
                            history,
                        });
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                    backoff_ms = scoring.backoff.next_ms(backoff_ms);
                }
            }
        }
    }
}
