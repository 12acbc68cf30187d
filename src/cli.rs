use crate::batch::DEFAULT_TEXT_COLUMN;
use crate::refine::{
    Thresholds, DEFAULT_MAX_ROUNDS, DEFAULT_THRESHOLD_CORRECTNESS, DEFAULT_THRESHOLD_PROBA,
};
use crate::settings::DEFAULT_CONFIG_PATH;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "completion-client", version, about = "Retrying streaming completion client")]
pub struct Cli {
    /// YAML settings file; `COMPLETION__*` environment variables override it.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate one completion and print it, or `N/A` when retries run out.
    Complete {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        generated_text: Option<String>,
        /// Named user template of the preset to use instead of `user`.
        #[arg(long)]
        variant: Option<String>,
        #[command(flatten)]
        refine: RefineArgs,
    },
    /// Generate a completion for every item of a JSON Lines or `.csv` file.
    Batch {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        input: PathBuf,
        /// Written as CSV when the extension is `.csv`, JSON Lines otherwise.
        #[arg(long)]
        output: PathBuf,
        /// Parse score lists and probability distributions from each response.
        #[arg(long)]
        score: bool,
        /// Run every item once per named user template; repeatable.
        #[arg(long = "variant")]
        variants: Vec<String>,
        /// CSV column holding the source text.
        #[arg(long, default_value = DEFAULT_TEXT_COLUMN)]
        text_column: String,
        #[command(flatten)]
        refine: RefineArgs,
    },
}

/// Generate-then-evaluate mode, enabled by `--eval-preset`.
#[derive(Debug, Args)]
pub struct RefineArgs {
    /// Preset that scores each generation; low scores trigger a regeneration.
    #[arg(long)]
    pub eval_preset: Option<String>,
    /// Minimum sum of the probability-weighted scores.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_PROBA)]
    pub threshold_proba: f64,
    /// Minimum probability-weighted score of the first criterion.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_CORRECTNESS)]
    pub threshold_correctness: f64,
    /// Generations tried per item before it is marked failed.
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
    pub max_rounds: u32,
}

impl RefineArgs {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            proba: self.threshold_proba,
            correctness: self.threshold_correctness,
        }
    }
}
