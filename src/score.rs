//! Parsing of evaluation scores out of generated text.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub scores: Vec<i64>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedScore {
    pub score: i64,
    pub weighted_score: f64,
    pub probabilities: BTreeMap<i64, f64>,
}

fn score_list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[([0-9,\s]+)\]").expect("valid score list pattern"))
}

fn distribution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"- (?:\w+/)?(\w+)\s*:\s*(\d+)\s*- (?:확률분포|probabilities)\s*:\s*\{([^}]+)\}",
        )
        .expect("valid distribution pattern")
    })
}

/// Reads the first bracketed integer list, e.g. `[4, 5, 3]`.
pub fn parse_scores(content: &str) -> ScoreSummary {
    if content.is_empty() {
        tracing::warn!("No valid content received.");
        return ScoreSummary::default();
    }

    let Some(captures) = score_list_pattern().captures(content) else {
        tracing::warn!("No valid score list found.");
        return ScoreSummary::default();
    };

    let scores: Vec<i64> = captures[1]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    let total = scores.iter().sum();
    ScoreSummary { scores, total }
}

/// Probability-weighted score, rounded to two decimals.
pub fn weighted_score(probabilities: &BTreeMap<i64, f64>) -> f64 {
    let sum: f64 = probabilities
        .iter()
        .map(|(score, prob)| *score as f64 * prob)
        .sum();
    (sum * 100.0).round() / 100.0
}

fn parse_distribution(raw: &str) -> Option<BTreeMap<i64, f64>> {
    raw.split(',')
        .map(|item| {
            let (score, prob) = item.split_once(':')?;
            Some((score.trim().parse().ok()?, prob.trim().parse().ok()?))
        })
        .collect()
}

/// Extracts per-criterion distributions written as
/// `- fluency : 4 - 확률분포 : {3: 0.2, 4: 0.8}`.
pub fn weighted_scores(content: &str) -> BTreeMap<String, WeightedScore> {
    distributions(content).into_iter().collect()
}

/// Scores of an evaluation response, criteria kept in the order they appear.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evaluation {
    pub total_score: i64,
    pub proba_scores: Vec<f64>,
    pub total_proba_score: f64,
}

impl Evaluation {
    /// Weighted score of the first criterion in the response, usually
    /// correctness.
    pub fn first_proba_score(&self) -> Option<f64> {
        self.proba_scores.first().copied()
    }
}

pub fn evaluate(content: &str) -> Evaluation {
    let summary = parse_scores(content);
    let proba_scores: Vec<f64> = distributions(content)
        .into_iter()
        .map(|(_, score)| score.weighted_score)
        .collect();
    let total_proba_score = proba_scores.iter().sum();

    tracing::info!(
        "Scores: {:?}, total {}; probability scores: {:?}, total {}",
        summary.scores,
        summary.total,
        proba_scores,
        total_proba_score
    );

    Evaluation {
        total_score: summary.total,
        proba_scores,
        total_proba_score,
    }
}

fn distributions(content: &str) -> Vec<(String, WeightedScore)> {
    let mut result = Vec::new();

    for captures in distribution_pattern().captures_iter(content) {
        let category = &captures[1];
        let raw = &captures[3];

        let Some(probabilities) = parse_distribution(raw) else {
            tracing::error!("Error parsing probabilities for {}: {}", category, raw);
            continue;
        };
        let Ok(score) = captures[2].parse::<i64>() else {
            continue;
        };

        result.push((
            category.to_string(),
            WeightedScore {
                score,
                weighted_score: weighted_score(&probabilities),
                probabilities,
            },
        ));
    }

    result
}
