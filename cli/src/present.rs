//! Converts use-case result types that don't carry `serde` derives (they
//! live in the application layer, which has no serialization dependency
//! of its own) into `serde_json::Value` for CLI display and snapshot
//! persistence, and back for snapshot loading. Mirrors the hand-rolled
//! value-tree walk `conductor_infrastructure::parser` uses for the same
//! reason.

use conductor_application::{ExecutionMetrics, ExecutionOutput, StepMetric, SuspendedState};
use conductor_domain::{AccessOperation, AccessReport, ConductorError, Score, ScoringState};
use serde_json::{json, Map, Value};

pub fn execution_output_to_json(output: &ExecutionOutput) -> Value {
    json!({
        "output": output.output,
        "metrics": metrics_to_json(&output.metrics),
        "stateReport": output.state_report.as_ref().map(access_report_to_json),
        "scoring": output.scoring.as_ref().map(scoring_state_to_json),
    })
}

fn metrics_to_json(metrics: &ExecutionMetrics) -> Value {
    json!({
        "ensemble": metrics.ensemble,
        "totalDurationMs": metrics.total_duration_ms,
        "cacheHits": metrics.cache_hits,
        "agents": metrics.agents.iter().map(step_metric_to_json).collect::<Vec<_>>(),
    })
}

fn step_metric_to_json(metric: &StepMetric) -> Value {
    json!({
        "name": metric.name,
        "durationMs": metric.duration_ms,
        "cached": metric.cached,
        "success": metric.success,
    })
}

fn access_report_to_json(report: &AccessReport) -> Value {
    json!({
        "entries": report.entries.iter().map(|entry| json!({
            "step": entry.step,
            "key": entry.key,
            "operation": match entry.operation {
                AccessOperation::Read => "read",
                AccessOperation::Write => "write",
            },
            "timestamp": entry.timestamp.to_rfc3339(),
        })).collect::<Vec<_>>(),
    })
}

fn scoring_state_to_json(state: &ScoringState) -> Value {
    json!({
        "finalScore": state.final_score,
        "retryCount": state.retry_count,
        "scoreHistory": state.score_history.iter().map(|s| json!({
            "agent": s.agent,
            "score": s.score,
            "passed": s.passed,
            "feedback": s.feedback,
            "breakdown": s.breakdown,
            "attempt": s.attempt,
            "timestamp": s.timestamp.to_rfc3339(),
        })).collect::<Vec<_>>(),
        "qualityMetrics": {
            "ensembleScore": state.quality_metrics.ensemble_score,
            "averageScore": state.quality_metrics.average_score,
            "passRate": state.quality_metrics.pass_rate,
            "totalEvaluations": state.quality_metrics.total_evaluations,
            "totalRetries": state.quality_metrics.total_retries,
        },
    })
}

/// Decode a host-persisted snapshot JSON document into a `SuspendedState`.
/// Required fields missing from the document fail with `EnsembleParse` —
/// reusing the parser's error variant since a malformed snapshot is the
/// same class of problem (the document doesn't describe a runnable state).
pub fn suspended_state_from_json(value: &Value) -> Result<SuspendedState, ConductorError> {
    let resume_from_step = value
        .get("resumeFromStep")
        .and_then(Value::as_u64)
        .ok_or_else(|| ConductorError::EnsembleParse {
            ensemble: String::new(),
            report: "snapshot.resumeFromStep: required".to_string(),
        })? as usize;

    let execution_context = value.get("executionContext").cloned().unwrap_or(Value::Null);
    let state_snapshot = value.get("stateSnapshot").cloned();
    let scoring_state = value.get("scoringState").map(scoring_state_from_json);
    let metrics = value.get("metrics").map(metrics_from_json).unwrap_or(ExecutionMetrics {
        ensemble: String::new(),
        total_duration_ms: 0,
        agents: Vec::new(),
        cache_hits: 0,
    });

    Ok(SuspendedState {
        resume_from_step,
        execution_context,
        state_snapshot,
        scoring_state,
        metrics,
    })
}

fn metrics_from_json(value: &Value) -> ExecutionMetrics {
    let ensemble = value
        .get("ensemble")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let agents = value
        .get("agents")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(step_metric_from_json).collect())
        .unwrap_or_default();
    ExecutionMetrics {
        ensemble,
        total_duration_ms: value.get("totalDurationMs").and_then(Value::as_u64).unwrap_or(0),
        agents,
        cache_hits: value.get("cacheHits").and_then(Value::as_u64).unwrap_or(0) as u32,
    }
}

fn step_metric_from_json(value: &Value) -> StepMetric {
    StepMetric {
        name: value.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
        duration_ms: value.get("durationMs").and_then(Value::as_u64).unwrap_or(0),
        cached: value.get("cached").and_then(Value::as_bool).unwrap_or(false),
        success: value.get("success").and_then(Value::as_bool).unwrap_or(false),
    }
}

fn scoring_state_from_json(value: &Value) -> ScoringState {
    let score_history = value
        .get("scoreHistory")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(score_from_json).collect())
        .unwrap_or_default();
    let retry_count = value
        .get("retryCount")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n as u32)))
                .collect()
        })
        .unwrap_or_default();
    let final_score = value.get("finalScore").and_then(Value::as_f64).unwrap_or(0.0);
    ScoringState {
        score_history,
        retry_count,
        final_score,
        quality_metrics: Default::default(),
    }
}

fn score_from_json(value: &Value) -> Score {
    let agent = value.get("agent").and_then(Value::as_str).unwrap_or_default();
    let score = value.get("score").and_then(Value::as_f64).unwrap_or(0.0);
    let attempt = value.get("attempt").and_then(Value::as_u64).unwrap_or(1) as u32;
    let mut built = Score {
        agent: agent.to_string(),
        score,
        passed: value.get("passed").and_then(Value::as_bool).unwrap_or(false),
        feedback: value.get("feedback").and_then(Value::as_str).map(str::to_string),
        breakdown: value.get("breakdown").and_then(Value::as_object).map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect()
        }),
        attempt,
        timestamp: chrono::Utc::now(),
    };
    if let Some(ts) = value.get("timestamp").and_then(Value::as_str) {
        if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(ts) {
            built.timestamp = parsed.with_timezone(&chrono::Utc);
        }
    }
    built
}

pub fn error_to_json(err: &ConductorError) -> Value {
    let mut map = Map::new();
    map.insert("message".to_string(), Value::String(err.to_string()));
    if let Some(ensemble) = err.ensemble_name() {
        map.insert("ensemble".to_string(), Value::String(ensemble.to_string()));
    }
    if let Some(agent) = err.agent_name() {
        map.insert("agent".to_string(), Value::String(agent.to_string()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_output_round_trips_through_json_shape() {
        let output = ExecutionOutput {
            output: json!({"status": "ok"}),
            metrics: ExecutionMetrics {
                ensemble: "demo".to_string(),
                total_duration_ms: 0,
                agents: Vec::new(),
                cache_hits: 0,
            },
            state_report: None,
            scoring: None,
        };
        let value = execution_output_to_json(&output);
        assert_eq!(value["output"]["status"], "ok");
        assert_eq!(value["metrics"]["ensemble"], "demo");
    }

    #[test]
    fn test_suspended_state_from_json_requires_resume_from_step() {
        let err = suspended_state_from_json(&json!({})).unwrap_err();
        assert!(matches!(err, ConductorError::EnsembleParse { .. }));
    }

    #[test]
    fn test_suspended_state_from_json_round_trips_scoring() {
        let snapshot = json!({
            "resumeFromStep": 2,
            "executionContext": {"a": 1},
            "scoringState": {
                "finalScore": 0.9,
                "retryCount": {"judge": 1},
                "scoreHistory": [
                    {"agent": "judge", "score": 0.9, "passed": true, "attempt": 2}
                ],
            },
        });
        let suspended = suspended_state_from_json(&snapshot).unwrap();
        assert_eq!(suspended.resume_from_step, 2);
        let scoring = suspended.scoring_state.unwrap();
        assert_eq!(scoring.score_history.len(), 1);
        assert_eq!(scoring.retry_count.get("judge"), Some(&1));
    }
}
