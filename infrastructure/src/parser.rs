//! YAML ensemble parser and validator (§4.2).
//!
//! Decodes into a generic `serde_yaml::Value` tree and hand-walks it into
//! `conductor_domain` entities, mirroring the teacher's
//! `domain::agent::plan_parser::parse_plan_json` style: none of
//! `Ensemble`/`FlowStep`/`Trigger`/`Notification` derive `Deserialize`
//! (several variants carry no uniform shape across their branches), so a
//! typed decode-then-hand-validate split isn't available here — the value
//! tree walk does both at once, accumulating path-annotated errors as it
//! goes rather than bailing on the first one.

use conductor_application::ports::ensemble_parser::EnsembleParserPort;
use conductor_domain::{
    AgentReference, BackoffStrategy, CacheHint, ConductorError, Ensemble, FlowStep, Notification,
    NotificationEventKind, Operation, OnFailure, ScoringConfig, StateAccess, StateConfig,
    StepScoring, Thresholds, Trigger,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// An agent reference is a bare name, or a name and a version separated
/// by a single `@` — `^[A-Za-z0-9._-]+(@[A-Za-z0-9._-]+)?$` (§6).
fn parse_agent_reference(reference: &str) -> Result<(), String> {
    let is_token = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    };
    match reference.split_once('@') {
        None => {
            if is_token(reference) {
                Ok(())
            } else {
                Err(format!("'{reference}' is not a valid agent reference"))
            }
        }
        Some((name, version)) => {
            if is_token(name) && is_token(version) {
                Ok(())
            } else {
                Err(format!("'{reference}' is not a valid agent reference"))
            }
        }
    }
}

/// Default implementation of the ensemble parser/validator port.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlEnsembleParser;

impl YamlEnsembleParser {
    pub fn new() -> Self {
        Self
    }
}

impl EnsembleParserPort for YamlEnsembleParser {
    fn parse(&self, yaml: &str) -> Result<Ensemble, ConductorError> {
        let value: Value = serde_yaml::from_str(yaml).map_err(|e| ConductorError::EnsembleParse {
            ensemble: String::new(),
            report: format!("invalid YAML: {e}"),
        })?;

        let mut errors = Vec::new();
        let ensemble = build_ensemble(&value, &mut errors);

        if !errors.is_empty() {
            return Err(ConductorError::EnsembleParse {
                ensemble: ensemble
                    .as_ref()
                    .map(|e| e.name.clone())
                    .unwrap_or_default(),
                report: errors.join("; "),
            });
        }

        let ensemble = ensemble.ok_or_else(|| ConductorError::EnsembleParse {
            ensemble: String::new(),
            report: "document is not a valid ensemble".to_string(),
        })?;

        ensemble.validate()?;
        Ok(ensemble)
    }

    fn validate_agent_references(
        &self,
        ensemble: &Ensemble,
        available_names: &HashSet<String>,
    ) -> Result<(), ConductorError> {
        let mut missing = Vec::new();
        for step in &ensemble.flow {
            if let AgentReference::Named(reference) = &step.agent {
                let (name, _version) = reference
                    .split_once('@')
                    .map(|(n, v)| (n, Some(v)))
                    .unwrap_or((reference.as_str(), None));
                if !available_names.contains(name) {
                    missing.push(reference.clone());
                }
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConductorError::EnsembleParse {
                ensemble: ensemble.name.clone(),
                report: format!("unknown agent reference(s): {}", missing.join(", ")),
            })
        }
    }
}

fn build_ensemble(value: &Value, errors: &mut Vec<String>) -> Option<Ensemble> {
    let Some(obj) = value.as_object() else {
        errors.push("root: expected a mapping".to_string());
        return None;
    };

    let name = match obj.get("name").and_then(|v| v.as_str()) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            errors.push("name: required, non-empty string".to_string());
            String::new()
        }
    };

    let description = obj
        .get("description")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let trigger = obj
        .get("trigger")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(i, t)| build_trigger(t, i, errors))
                .collect()
        })
        .unwrap_or_default();

    let flow = match obj.get("flow").and_then(|v| v.as_array()) {
        Some(arr) if !arr.is_empty() => arr
            .iter()
            .enumerate()
            .filter_map(|(i, s)| build_flow_step(s, i, errors))
            .collect(),
        _ => {
            errors.push("flow: required, at least one step".to_string());
            Vec::new()
        }
    };

    let state = obj.get("state").map(|v| StateConfig {
        initial: v.get("initial").cloned().unwrap_or(Value::Null),
    });

    let scoring = obj.get("scoring").map(|v| build_scoring_config(v, errors));

    let notifications = obj
        .get("notifications")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .enumerate()
                .filter_map(|(i, n)| build_notification(n, i, errors))
                .collect()
        })
        .unwrap_or_default();

    let output = obj.get("output").cloned();

    Some(Ensemble {
        name,
        description,
        trigger,
        flow,
        state,
        scoring,
        notifications,
        output,
    })
}

fn build_trigger(value: &Value, index: usize, errors: &mut Vec<String>) -> Option<Trigger> {
    let kind = value.get("type").and_then(|v| v.as_str());
    let path = format!("trigger[{index}]");
    let trigger = match kind {
        Some("webhook") => Trigger::Webhook {
            path: value
                .get("path")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            public: value
                .get("public")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            auth: value
                .get("auth")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        },
        Some("mcp") => Trigger::Mcp {
            tool_name: value
                .get("toolName")
                .or_else(|| value.get("tool_name"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        Some("email") => Trigger::Email {
            address: value
                .get("address")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        Some("queue") => Trigger::Queue {
            topic: value
                .get("topic")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        Some("cron") => Trigger::Cron {
            schedule: value
                .get("schedule")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        },
        Some(other) => {
            errors.push(format!("{path}.type: unknown trigger type '{other}'"));
            return None;
        }
        None => {
            errors.push(format!("{path}.type: required"));
            return None;
        }
    };
    if let Err(message) = trigger.validate() {
        errors.push(format!("{path}: {message}"));
    }
    Some(trigger)
}

fn build_flow_step(value: &Value, index: usize, errors: &mut Vec<String>) -> Option<FlowStep> {
    let path = format!("flow[{index}]");
    let agent = match value.get("agent") {
        Some(Value::String(reference)) => {
            if let Err(message) = parse_agent_reference(reference) {
                errors.push(format!("{path}.agent: {message}"));
            }
            AgentReference::Named(reference.clone())
        }
        Some(inline) if inline.is_object() => {
            let operation_str = inline.get("operation").and_then(|v| v.as_str());
            match operation_str.map(Operation::from_config_str) {
                Some(Ok(operation)) => AgentReference::Inline {
                    operation,
                    config: inline.get("config").cloned().unwrap_or(Value::Null),
                },
                Some(Err(e)) => {
                    errors.push(format!("{path}.agent.operation: {e}"));
                    return None;
                }
                None => {
                    errors.push(format!("{path}.agent.operation: required"));
                    return None;
                }
            }
        }
        _ => {
            errors.push(format!("{path}.agent: required"));
            return None;
        }
    };

    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| agent.display_name());

    let input = value.get("input").cloned().unwrap_or(Value::Null);

    let state = value.get("state").map(|v| StateAccess {
        use_keys: string_array(v.get("use")),
        set_keys: string_array(v.get("set")),
    });

    let cache = value.get("cache").map(|v| CacheHint {
        ttl_seconds: v.get("ttlSeconds").and_then(|v| v.as_u64()),
        bypass: v.get("bypass").and_then(|v| v.as_bool()).unwrap_or(false),
    });

    let scoring = value
        .get("scoring")
        .map(|v| build_step_scoring(v, &path, errors));

    let condition = value.get("condition").cloned();

    let step = FlowStep {
        name,
        agent,
        input,
        state,
        cache,
        scoring,
        condition,
    };
    if let Err(e) = step.validate() {
        errors.push(format!("{path}: {e}"));
    }
    Some(step)
}

fn build_step_scoring(value: &Value, path: &str, errors: &mut Vec<String>) -> StepScoring {
    let evaluator = match value.get("evaluator") {
        Some(Value::String(reference)) => AgentReference::Named(reference.clone()),
        _ => {
            errors.push(format!("{path}.scoring.evaluator: required"));
            AgentReference::Named(String::new())
        }
    };

    let criteria_weights = f64_map(value.get("criteriaWeights"));
    let criteria_minimums = f64_map(value.get("criteriaMinimums"));

    let thresholds = value
        .get("thresholds")
        .map(|v| Thresholds {
            minimum: v.get("minimum").and_then(|v| v.as_f64()).unwrap_or(0.7),
            target: v.get("target").and_then(|v| v.as_f64()),
            excellent: v.get("excellent").and_then(|v| v.as_f64()),
        })
        .unwrap_or_default();

    let on_failure = match value.get("onFailure").and_then(|v| v.as_str()) {
        Some("continue") => OnFailure::Continue,
        Some("abort") => OnFailure::Abort,
        Some("retry") | None => OnFailure::Retry,
        Some(other) => {
            errors.push(format!("{path}.scoring.onFailure: unknown '{other}'"));
            OnFailure::Retry
        }
    };

    let backoff = match value.get("backoff").and_then(|v| v.as_str()) {
        Some("fixed") => BackoffStrategy::Fixed,
        Some("linear") => BackoffStrategy::Linear,
        Some("exponential") | None => BackoffStrategy::Exponential,
        Some(other) => {
            errors.push(format!("{path}.scoring.backoff: unknown '{other}'"));
            BackoffStrategy::Exponential
        }
    };

    let scoring = StepScoring {
        evaluator,
        criteria_weights,
        criteria_minimums,
        thresholds,
        on_failure,
        retry_limit: value
            .get("retryLimit")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(3),
        require_improvement: value
            .get("requireImprovement")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        min_improvement: value
            .get("minImprovement")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.05),
        backoff,
        initial_backoff_ms: value
            .get("initialBackoffMs")
            .and_then(|v| v.as_u64())
            .unwrap_or(1_000),
    };
    if let Err(e) = scoring.validate() {
        errors.push(format!("{path}.scoring: {e}"));
    }
    scoring
}

fn build_scoring_config(value: &Value, errors: &mut Vec<String>) -> ScoringConfig {
    let aggregation = match value.get("aggregation").and_then(|v| v.as_str()) {
        Some("minimum") => conductor_domain::AggregationStrategy::Minimum,
        Some("geometricMean") => conductor_domain::AggregationStrategy::GeometricMean,
        Some("weightedAverage") | None => conductor_domain::AggregationStrategy::WeightedAverage,
        Some(other) => {
            errors.push(format!("scoring.aggregation: unknown '{other}'"));
            conductor_domain::AggregationStrategy::WeightedAverage
        }
    };
    let backoff_strategy = match value.get("backoffStrategy").and_then(|v| v.as_str()) {
        Some("fixed") => BackoffStrategy::Fixed,
        Some("linear") => BackoffStrategy::Linear,
        Some("exponential") | None => BackoffStrategy::Exponential,
        Some(other) => {
            errors.push(format!("scoring.backoffStrategy: unknown '{other}'"));
            BackoffStrategy::Exponential
        }
    };
    ScoringConfig {
        enabled: value
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        default_thresholds: value
            .get("defaultThresholds")
            .map(|v| Thresholds {
                minimum: v.get("minimum").and_then(|v| v.as_f64()).unwrap_or(0.7),
                target: v.get("target").and_then(|v| v.as_f64()),
                excellent: v.get("excellent").and_then(|v| v.as_f64()),
            })
            .unwrap_or_default(),
        max_retries: value
            .get("maxRetries")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(3),
        backoff_strategy,
        initial_backoff_ms: value
            .get("initialBackoffMs")
            .and_then(|v| v.as_u64())
            .unwrap_or(1_000),
        track_in_state: value
            .get("trackInState")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        criteria_weights: f64_map(value.get("criteriaWeights")),
        aggregation,
    }
}

fn build_notification(value: &Value, index: usize, errors: &mut Vec<String>) -> Option<Notification> {
    let path = format!("notifications[{index}]");
    let events = value
        .get("events")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| {
                    NotificationEventKind::from_str(s).or_else(|| {
                        errors.push(format!("{path}.events: unknown event '{s}'"));
                        None
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    match value.get("type").and_then(|v| v.as_str()) {
        Some("webhook") => Some(Notification::Webhook {
            url: value
                .get("url")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            events,
            secret: value
                .get("secret")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            retries: value
                .get("retries")
                .and_then(|v| v.as_u64())
                .map(|v| v as u32),
            timeout_ms: value.get("timeoutMs").and_then(|v| v.as_u64()),
        }),
        Some("email") => Some(Notification::Email {
            to: value
                .get("to")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            events,
            subject: value
                .get("subject")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            from: value
                .get("from")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        }),
        Some(other) => {
            errors.push(format!("{path}.type: unknown notification type '{other}'"));
            None
        }
        None => {
            errors.push(format!("{path}.type: required"));
            None
        }
    }
}

fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(String::from).collect())
        .unwrap_or_default()
}

fn f64_map(value: Option<&Value>) -> HashMap<String, f64> {
    value
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name: onboard-customer
flow:
  - agent: welcome-writer
    input:
      customer: "${trigger.customer}"
"#;

    #[test]
    fn test_parses_minimal_ensemble() {
        let parser = YamlEnsembleParser::new();
        let ensemble = parser.parse(MINIMAL).unwrap();
        assert_eq!(ensemble.name, "onboard-customer");
        assert_eq!(ensemble.flow.len(), 1);
        assert_eq!(ensemble.flow[0].name, "welcome-writer");
    }

    #[test]
    fn test_missing_flow_is_a_parse_error() {
        let parser = YamlEnsembleParser::new();
        let err = parser.parse("name: empty\n").unwrap_err();
        assert!(matches!(err, ConductorError::EnsembleParse { .. }));
    }

    #[test]
    fn test_invalid_agent_reference_syntax_is_rejected() {
        let yaml = r#"
name: bad-ref
flow:
  - agent: "not a valid ref!"
    input: {}
"#;
        let parser = YamlEnsembleParser::new();
        let err = parser.parse(yaml).unwrap_err();
        assert!(matches!(err, ConductorError::EnsembleParse { .. }));
    }

    #[test]
    fn test_webhook_trigger_without_auth_or_public_is_rejected() {
        let yaml = r#"
name: triggered
trigger:
  - type: webhook
    path: /hooks/onboard
flow:
  - agent: welcome-writer
    input: {}
"#;
        let parser = YamlEnsembleParser::new();
        assert!(parser.parse(yaml).is_err());
    }

    #[test]
    fn test_validate_agent_references_reports_unknown_names() {
        let parser = YamlEnsembleParser::new();
        let ensemble = parser.parse(MINIMAL).unwrap();
        let available: HashSet<String> = ["someone-else".to_string()].into_iter().collect();
        let err = parser
            .validate_agent_references(&ensemble, &available)
            .unwrap_err();
        assert!(err.to_string().contains("welcome-writer"));
    }

    #[test]
    fn test_versioned_reference_checked_against_unversioned_name() {
        let yaml = r#"
name: versioned
flow:
  - agent: welcome-writer@2
    input: {}
"#;
        let parser = YamlEnsembleParser::new();
        let ensemble = parser.parse(yaml).unwrap();
        let available: HashSet<String> = ["welcome-writer".to_string()].into_iter().collect();
        assert!(parser.validate_agent_references(&ensemble, &available).is_ok());
    }

    #[test]
    fn test_inline_agent_uses_operation_dispatch() {
        let yaml = r#"
name: inline
flow:
  - agent:
      operation: code
      config:
        handler: noop
    input: {}
"#;
        let parser = YamlEnsembleParser::new();
        let ensemble = parser.parse(yaml).unwrap();
        assert!(matches!(
            ensemble.flow[0].agent,
            AgentReference::Inline { operation: Operation::Code, .. }
        ));
    }
}
