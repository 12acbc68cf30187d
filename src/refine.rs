//! Generate, evaluate, and regenerate until the evaluation clears the
//! configured thresholds.

use crate::executor::CompletionExecutor;
use crate::preset::{PresetSettings, TemplateVars};
use crate::retry::RetryPolicy;
use crate::score::{self, Evaluation};
use serde::Serialize;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD_PROBA: f64 = 30.0;
pub const DEFAULT_THRESHOLD_CORRECTNESS: f64 = 7.0;
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum sum of the probability-weighted scores.
    pub proba: f64,
    /// Minimum weighted score of the first criterion.
    pub correctness: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            proba: DEFAULT_THRESHOLD_PROBA,
            correctness: DEFAULT_THRESHOLD_CORRECTNESS,
        }
    }
}

impl Thresholds {
    /// An evaluation without any weighted score never passes.
    pub fn passes(&self, evaluation: &Evaluation) -> bool {
        match evaluation.first_proba_score() {
            Some(first) => {
                evaluation.total_proba_score >= self.proba && first >= self.correctness
            }
            None => false,
        }
    }
}

/// Evaluation preset plus the acceptance rule applied to each generation.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub evaluator: PresetSettings,
    pub thresholds: Thresholds,
    /// Generations tried per item before giving up; zero is treated as one.
    pub max_rounds: u32,
}

impl Refinement {
    pub fn new(evaluator: PresetSettings) -> Self {
        Self {
            evaluator,
            thresholds: Thresholds::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Refined {
    /// The accepted generation, flattened to one line.
    pub content: Option<String>,
    pub rounds: u32,
    /// Calls made across every generation and evaluation.
    pub attempts: u32,
    /// Evaluation of the last scored generation.
    pub evaluation: Option<Evaluation>,
}

impl Refined {
    pub fn is_accepted(&self) -> bool {
        self.content.is_some()
    }
}

/// Runs `generator` and then the evaluator on its output, regenerating until
/// the evaluation passes or `max_rounds` generations were tried.
///
/// Each call goes through the retry policy on its own. A generation or
/// evaluation that exhausts its retries just ends that round.
pub async fn refine(
    executor: &CompletionExecutor,
    policy: &RetryPolicy,
    generator: &PresetSettings,
    refinement: &Refinement,
    vars: &TemplateVars<'_>,
    variant: Option<&str>,
) -> Refined {
    let max_rounds = refinement.max_rounds.max(1);
    let mut refined = Refined::default();

    let Some(request) = generator.build_variant_request(variant, vars) else {
        warn!("Unknown user variant {:?}", variant);
        return refined;
    };

    while refined.rounds < max_rounds {
        refined.rounds += 1;
        info!("Generation round {}/{}", refined.rounds, max_rounds);

        let generated = executor.execute_with_retries(&request, policy).await;
        refined.attempts += generated.attempts;
        let Some(generated) = generated.content else {
            warn!("Generation failed in round {}", refined.rounds);
            continue;
        };

        let eval_vars = vars.with_generated_text(&generated);
        let eval_request = refinement.evaluator.build_request(&eval_vars);
        let evaluated = executor.execute_with_retries(&eval_request, policy).await;
        refined.attempts += evaluated.attempts;
        let Some(eval_content) = evaluated.content else {
            warn!("Evaluation failed in round {}", refined.rounds);
            continue;
        };

        let evaluation = score::evaluate(&eval_content);
        let passed = refinement.thresholds.passes(&evaluation);
        refined.evaluation = Some(evaluation);

        if passed {
            refined.content = Some(flatten(&generated));
            return refined;
        }
        warn!("Score below threshold. Regenerating...");
    }

    warn!("No generation passed after {} rounds", refined.rounds);
    refined
}

fn flatten(text: &str) -> String {
    text.replace('\n', " ").replace("\"  \"", " ")
}
