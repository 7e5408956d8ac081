//! Scoring: per-step quality evaluation and ensemble-level aggregation.
//!
//! Grounded on the teacher's `quorum_domain::quorum::vote`/`consensus`
//! modules — a `Score` plays the role of a `Vote`, `ScoringState` the
//! role of `VoteResult`'s running tally, and `EnsembleScorer` generalizes
//! `ConsensusRound`'s aggregation from "agreement among voters" to
//! "quality of a step's output across retries."

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// What to do when a step's score falls below its configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnFailure {
    #[default]
    Retry,
    Continue,
    Abort,
}

/// Retry backoff shape used by the application-layer scoring executor.
/// `next` advances from the *previous* backoff value, matching the
/// source behavior pinned by testable property 8: exponential doubles
/// and caps at 60s, linear adds 1s and caps at 30s, fixed never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    Fixed,
    #[default]
    Exponential,
    Linear,
}

impl BackoffStrategy {
    pub fn next_ms(&self, prev_ms: u64) -> u64 {
        match self {
            BackoffStrategy::Fixed => prev_ms,
            BackoffStrategy::Linear => (prev_ms + 1_000).min(30_000),
            BackoffStrategy::Exponential => prev_ms.saturating_mul(2).min(60_000),
        }
    }
}

/// Qualitative tier a single score falls into, used for human-readable
/// reporting (`excellent`/`good`/`acceptable`/`poor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTier {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

pub fn get_score_range(score: f64) -> ScoreTier {
    if score >= 0.95 {
        ScoreTier::Excellent
    } else if score >= 0.8 {
        ScoreTier::Good
    } else if score >= 0.6 {
        ScoreTier::Acceptable
    } else {
        ScoreTier::Poor
    }
}

/// Weighted (or, absent weights, arithmetic) mean over a per-criterion
/// breakdown — what an evaluator agent reports for one attempt.
pub fn calculate_composite_score(
    breakdown: &HashMap<String, f64>,
    weights: Option<&HashMap<String, f64>>,
) -> f64 {
    if breakdown.is_empty() {
        return 0.0;
    }
    match weights {
        None => breakdown.values().sum::<f64>() / breakdown.len() as f64,
        Some(weights) => {
            let mut weighted_sum = 0.0;
            let mut weight_total = 0.0;
            for (criterion, value) in breakdown {
                let weight = weights.get(criterion).copied().unwrap_or(1.0);
                weighted_sum += value * weight;
                weight_total += weight;
            }
            if weight_total == 0.0 {
                0.0
            } else {
                weighted_sum / weight_total
            }
        }
    }
}

pub fn check_threshold(score: f64, minimum: f64) -> bool {
    score >= minimum
}

/// Criteria absent from `breakdown`, or present but below their
/// configured minimum.
pub fn get_failed_criteria(
    breakdown: &HashMap<String, f64>,
    minimums: &HashMap<String, f64>,
) -> Vec<String> {
    minimums
        .iter()
        .filter_map(|(criterion, min)| match breakdown.get(criterion) {
            Some(value) if value < min => Some(criterion.clone()),
            None => Some(criterion.clone()),
            _ => None,
        })
        .collect()
}

/// The result of one scoring attempt: an evaluator agent's verdict on a
/// step's output.
#[derive(Debug, Clone)]
pub struct Score {
    pub agent: String,
    pub score: f64,
    pub passed: bool,
    pub feedback: Option<String>,
    pub breakdown: Option<HashMap<String, f64>>,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

impl Score {
    pub fn new(agent: impl Into<String>, score: f64, minimum: f64, attempt: u32) -> Self {
        Self {
            agent: agent.into(),
            score,
            passed: check_threshold(score, minimum),
            feedback: None,
            breakdown: None,
            attempt,
            timestamp: Utc::now(),
        }
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn with_breakdown(mut self, breakdown: HashMap<String, f64>) -> Self {
        self.breakdown = Some(breakdown);
        self
    }
}

/// Per-criterion rollup across a run's score history.
#[derive(Debug, Clone, Default)]
pub struct CriterionStats {
    pub scores: Vec<f64>,
    pub average: f64,
    pub pass_rate: f64,
}

/// Ensemble-level quality summary computed over the full score history.
#[derive(Debug, Clone, Default)]
pub struct QualityMetrics {
    pub ensemble_score: f64,
    pub average_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub total_evaluations: usize,
    pub pass_rate: f64,
    pub criteria_breakdown: HashMap<String, CriterionStats>,
    pub total_retries: usize,
    pub average_attempts: f64,
}

/// The per-run record of every evaluator score plus retry counts and
/// aggregate metrics, appended to — never mutated — as the run progresses.
#[derive(Debug, Clone, Default)]
pub struct ScoringState {
    pub score_history: Vec<Score>,
    pub retry_count: HashMap<String, u32>,
    pub final_score: f64,
    pub quality_metrics: QualityMetrics,
}

/// How per-agent passing scores roll up into one ensemble score
/// (`scoring.aggregation` in the ensemble document).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationStrategy {
    #[default]
    WeightedAverage,
    Minimum,
    GeometricMean,
}

/// Direction a score series is trending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Aggregates per-step scores into ensemble-level quality metrics.
/// Grounded on `quorum_domain::quorum::consensus::ConsensusRound`: an
/// entity built from a score list, exposing summary computations and
/// nothing else — it holds no state of its own.
pub struct EnsembleScorer;

impl EnsembleScorer {
    /// Keep the latest *passing* entry per agent (a later pass overwrites
    /// an earlier one); combine those per `strategy`. Zero if nothing in
    /// `history` ever passed.
    pub fn ensemble_score(
        history: &[Score],
        strategy: AggregationStrategy,
        weights: Option<&HashMap<String, f64>>,
    ) -> f64 {
        let mut latest_passing: HashMap<&str, f64> = HashMap::new();
        for entry in history {
            if entry.passed {
                latest_passing.insert(entry.agent.as_str(), entry.score);
            }
        }
        if latest_passing.is_empty() {
            return 0.0;
        }
        match strategy {
            AggregationStrategy::Minimum => {
                latest_passing.values().copied().fold(f64::INFINITY, f64::min)
            }
            AggregationStrategy::GeometricMean => {
                let product: f64 = latest_passing.values().map(|s| s.max(0.0)).product();
                product.powf(1.0 / latest_passing.len() as f64)
            }
            AggregationStrategy::WeightedAverage => match weights {
                None => latest_passing.values().sum::<f64>() / latest_passing.len() as f64,
                Some(weights) => {
                    let mut weighted_sum = 0.0;
                    let mut weight_total = 0.0;
                    for (agent, score) in &latest_passing {
                        let weight = weights.get(*agent).copied().unwrap_or(1.0);
                        weighted_sum += score * weight;
                        weight_total += weight;
                    }
                    if weight_total == 0.0 {
                        0.0
                    } else {
                        weighted_sum / weight_total
                    }
                }
            },
        }
    }

    pub fn quality_metrics(
        history: &[Score],
        strategy: AggregationStrategy,
        weights: Option<&HashMap<String, f64>>,
    ) -> QualityMetrics {
        if history.is_empty() {
            return QualityMetrics::default();
        }
        let scores: Vec<f64> = history.iter().map(|s| s.score).collect();
        let average_score = scores.iter().sum::<f64>() / scores.len() as f64;
        let min_score = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let passed_count = history.iter().filter(|s| s.passed).count();
        let pass_rate = passed_count as f64 / history.len() as f64;
        let total_retries = history.iter().filter(|s| s.attempt > 1).count();
        let average_attempts =
            history.iter().map(|s| s.attempt as f64).sum::<f64>() / history.len() as f64;

        let mut criteria_breakdown: HashMap<String, CriterionStats> = HashMap::new();
        for entry in history {
            let Some(breakdown) = &entry.breakdown else {
                continue;
            };
            for (criterion, value) in breakdown {
                let stats = criteria_breakdown.entry(criterion.clone()).or_default();
                stats.scores.push(*value);
            }
        }
        for (criterion, stats) in criteria_breakdown.iter_mut() {
            stats.average = stats.scores.iter().sum::<f64>() / stats.scores.len() as f64;
            let passed_for_criterion = history
                .iter()
                .filter(|e| e.breakdown.as_ref().is_some_and(|b| b.contains_key(criterion)) && e.passed)
                .count();
            let total_for_criterion = history
                .iter()
                .filter(|e| e.breakdown.as_ref().is_some_and(|b| b.contains_key(criterion)))
                .count();
            stats.pass_rate = if total_for_criterion == 0 {
                0.0
            } else {
                passed_for_criterion as f64 / total_for_criterion as f64
            };
        }

        QualityMetrics {
            ensemble_score: Self::ensemble_score(history, strategy, weights),
            average_score,
            min_score,
            max_score,
            total_evaluations: history.len(),
            pass_rate,
            criteria_breakdown,
            total_retries,
            average_attempts,
        }
    }

    /// Compare the mean of the last `window` entries against the prior
    /// `window`; requires at least `2 * window` entries, else `Stable`.
    pub fn trend(history: &[Score], window: usize) -> Trend {
        if window == 0 || history.len() < 2 * window {
            return Trend::Stable;
        }
        let len = history.len();
        let recent_mean = mean(&history[len - window..]);
        let prior_mean = mean(&history[len - 2 * window..len - window]);
        let delta = recent_mean - prior_mean;
        if delta > 0.05 {
            Trend::Improving
        } else if delta < -0.05 {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }

    pub fn is_quality_degrading(history: &[Score], window: usize) -> bool {
        if window == 0 || history.len() < 2 * window {
            return false;
        }
        let len = history.len();
        let recent_mean = mean(&history[len - window..]);
        let prior_mean = mean(&history[len - 2 * window..len - window]);
        prior_mean - recent_mean > 0.1
    }

    /// Human-readable hints surfaced in run summaries.
    pub fn recommendations(ensemble_score: f64, metrics: &QualityMetrics) -> Vec<String> {
        let mut out = Vec::new();
        if ensemble_score < 0.7 {
            out.push(format!(
                "ensemble score {ensemble_score:.2} is below the 0.70 quality bar"
            ));
        }
        if metrics.total_evaluations > 0 {
            let retry_ratio = metrics.total_retries as f64 / metrics.total_evaluations as f64;
            if retry_ratio > 0.5 {
                out.push(format!(
                    "{:.0}% of evaluations required a retry",
                    retry_ratio * 100.0
                ));
            }
        }
        if metrics.pass_rate < 0.8 {
            out.push(format!(
                "pass rate {:.0}% is below 80%",
                metrics.pass_rate * 100.0
            ));
        }
        for (criterion, stats) in &metrics.criteria_breakdown {
            if stats.pass_rate < 0.7 {
                out.push(format!(
                    "criterion '{criterion}' pass rate {:.0}% is below 70%",
                    stats.pass_rate * 100.0
                ));
            }
        }
        out
    }

    /// Append `entry` to `prev`'s history, bump the agent's retry count
    /// when this is a retried attempt, and recompute metrics — returning
    /// a new `ScoringState` rather than mutating `prev`.
    pub fn update_scoring_state(prev: &ScoringState, entry: Score) -> ScoringState {
        let mut history = prev.score_history.clone();
        let mut retry_count = prev.retry_count.clone();
        if entry.attempt > 1 {
            *retry_count.entry(entry.agent.clone()).or_insert(0) += 1;
        }
        history.push(entry);
        let quality_metrics =
            Self::quality_metrics(&history, AggregationStrategy::WeightedAverage, None);
        let final_score = quality_metrics.ensemble_score;
        ScoringState {
            score_history: history,
            retry_count,
            final_score,
            quality_metrics,
        }
    }
}

fn mean(scores: &[Score]) -> f64 {
    scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_composite_score_weighted_vs_plain() {
        let b = breakdown(&[("accuracy", 0.8), ("completeness", 0.6)]);
        let plain = calculate_composite_score(&b, None);
        assert!((plain - 0.7).abs() < 1e-9);

        let weights = breakdown(&[("accuracy", 2.0), ("completeness", 1.0)]);
        let weighted = calculate_composite_score(&b, Some(&weights));
        assert!((weighted - ((0.8 * 2.0 + 0.6) / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_score_tiers() {
        assert_eq!(get_score_range(0.97), ScoreTier::Excellent);
        assert_eq!(get_score_range(0.85), ScoreTier::Good);
        assert_eq!(get_score_range(0.65), ScoreTier::Acceptable);
        assert_eq!(get_score_range(0.2), ScoreTier::Poor);
    }

    #[test]
    fn test_failed_criteria_includes_missing_and_below_minimum() {
        let b = breakdown(&[("accuracy", 0.9)]);
        let minimums = breakdown(&[("accuracy", 0.95), ("relevance", 0.5)]);
        let mut failed = get_failed_criteria(&b, &minimums);
        failed.sort();
        assert_eq!(failed, vec!["accuracy".to_string(), "relevance".to_string()]);
    }

    /// Pins testable property 8: exponential backoff sequence starting
    /// at 1s caps at 60s after doubling six times.
    #[test]
    fn test_exponential_backoff_schedule() {
        let strategy = BackoffStrategy::Exponential;
        let mut ms = 1_000u64;
        let mut seconds = vec![ms / 1000];
        for _ in 0..7 {
            ms = strategy.next_ms(ms);
            seconds.push(ms / 1000);
        }
        assert_eq!(seconds, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_linear_and_fixed_backoff() {
        assert_eq!(BackoffStrategy::Linear.next_ms(29_500), 30_000);
        assert_eq!(BackoffStrategy::Fixed.next_ms(500), 500);
    }

    /// Pins §4.7: only the latest passing entry per agent counts, and an
    /// ensemble with no passing entries scores 0.
    #[test]
    fn test_ensemble_score_keeps_latest_passing_entry_per_agent() {
        let history = vec![
            Score::new("a", 0.5, 0.8, 1),
            Score::new("a", 0.9, 0.8, 2),
            Score::new("b", 0.4, 0.8, 1),
        ];
        assert!(
            (EnsembleScorer::ensemble_score(&history, AggregationStrategy::WeightedAverage, None) - 0.9)
                .abs()
                < 1e-9
        );

        let all_failing = vec![Score::new("a", 0.2, 0.8, 1)];
        assert_eq!(
            EnsembleScorer::ensemble_score(&all_failing, AggregationStrategy::WeightedAverage, None),
            0.0
        );
    }

    #[test]
    fn test_ensemble_score_minimum_and_geometric_aggregation() {
        let history = vec![Score::new("a", 0.9, 0.8, 1), Score::new("b", 0.4, 0.3, 1)];
        assert_eq!(
            EnsembleScorer::ensemble_score(&history, AggregationStrategy::Minimum, None),
            0.4
        );
        let geo = EnsembleScorer::ensemble_score(&history, AggregationStrategy::GeometricMean, None);
        assert!((geo - (0.9f64 * 0.4).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_quality_metrics_aggregate_shape() {
        let history = vec![
            Score::new("a", 0.9, 0.8, 1),
            Score::new("b", 0.5, 0.8, 2),
        ];
        let metrics = EnsembleScorer::quality_metrics(&history, AggregationStrategy::WeightedAverage, None);
        assert_eq!(metrics.total_evaluations, 2);
        assert_eq!(metrics.total_retries, 1);
        assert!((metrics.average_attempts - 1.5).abs() < 1e-9);
        assert!((metrics.pass_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_trend_requires_two_full_windows() {
        let history: Vec<Score> = (0..3).map(|i| Score::new("a", 0.5, 0.8, i + 1)).collect();
        assert_eq!(EnsembleScorer::trend(&history, 5), Trend::Stable);
    }

    #[test]
    fn test_trend_improving_and_degrading() {
        let mut history = Vec::new();
        for _ in 0..3 {
            history.push(Score::new("a", 0.4, 0.8, 1));
        }
        for _ in 0..3 {
            history.push(Score::new("a", 0.9, 0.8, 1));
        }
        assert_eq!(EnsembleScorer::trend(&history, 3), Trend::Improving);
        assert!(!EnsembleScorer::is_quality_degrading(&history, 3));

        let declining: Vec<Score> = history.into_iter().rev().collect();
        assert_eq!(EnsembleScorer::trend(&declining, 3), Trend::Declining);
        assert!(EnsembleScorer::is_quality_degrading(&declining, 3));
    }

    #[test]
    fn test_update_scoring_state_appends_and_tracks_retries() {
        let state = ScoringState::default();
        let state = EnsembleScorer::update_scoring_state(&state, Score::new("a", 0.5, 0.8, 1));
        let state = EnsembleScorer::update_scoring_state(&state, Score::new("a", 0.9, 0.8, 2));
        assert_eq!(state.score_history.len(), 2);
        assert_eq!(state.retry_count.get("a"), Some(&1));
        assert!((state.final_score - 0.9).abs() < 1e-9);
    }
}
