//! Batch generation over JSON Lines or CSV input.

use crate::error::BatchError;
use crate::executor::CompletionExecutor;
use crate::preset::{PresetSettings, TemplateVars};
use crate::refine::{self, Refinement};
use crate::retry::RetryPolicy;
use crate::schemas::completion_request::CompletionRequest;
use crate::schemas::completion_response::{CompletionResponse, NOT_AVAILABLE};
use crate::schemas::task_status::TaskStatus;
use crate::score::{self, Evaluation, ScoreSummary, WeightedScore};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

const PROGRESS_EVERY: usize = 10;
pub const DEFAULT_TEXT_COLUMN: &str = "text";

/// File format picked from the extension: `.csv` is CSV, anything else is
/// JSON Lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    JsonLines,
    Csv,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Format::Csv,
            _ => Format::JsonLines,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub generated_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub status: TaskStatus,
    pub content: String,
    pub attempts: u32,
    pub cached: bool,
    pub body_hash: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weighted_scores: Option<BTreeMap<String, WeightedScore>>,
    /// Generations tried when refinement is on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

/// One flat CSV row per record; nested score fields are reduced to totals.
#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    id: &'a str,
    variant: Option<&'a str>,
    status: TaskStatus,
    content: &'a str,
    attempts: u32,
    cached: bool,
    body_hash: &'a str,
    started_at: String,
    completed_at: String,
    duration_ms: i64,
    total_score: Option<i64>,
    rounds: Option<u32>,
    total_proba_score: Option<f64>,
}

impl<'a> From<&'a BatchRecord> for CsvRecord<'a> {
    fn from(record: &'a BatchRecord) -> Self {
        Self {
            id: &record.id,
            variant: record.variant.as_deref(),
            status: record.status,
            content: &record.content,
            attempts: record.attempts,
            cached: record.cached,
            body_hash: &record.body_hash,
            started_at: record.started_at.to_rfc3339(),
            completed_at: record.completed_at.to_rfc3339(),
            duration_ms: record.duration_ms,
            total_score: record.scores.as_ref().map(|s| s.total),
            rounds: record.rounds,
            total_proba_score: record.evaluation.as_ref().map(|e| e.total_proba_score),
        }
    }
}

/// SHA-256 of the serialized request body, base64 encoded.
pub fn body_hash(request: &CompletionRequest) -> String {
    let body = serde_json::to_vec(request).unwrap_or_default();
    STANDARD.encode(Sha256::digest(&body))
}

/// Reads JSON Lines input. Blank lines are ignored and malformed lines are
/// logged and skipped.
pub fn read_items(reader: impl BufRead) -> Result<Vec<BatchItem>, BatchError> {
    let mut items = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BatchItem>(&line) {
            Ok(item) => items.push(item),
            Err(e) => error!("Failed to parse input line {}: {}", line_no + 1, e),
        }
    }
    Ok(items)
}

/// Reads CSV input with a header row. `id` and `text_column` are required
/// per row, `generated_text` is optional; rows missing a required column are
/// logged and skipped.
pub fn read_csv_items(reader: impl Read, text_column: &str) -> Result<Vec<BatchItem>, BatchError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut items = Vec::new();
    for (row_no, row) in csv_reader.deserialize::<HashMap<String, String>>().enumerate() {
        let mut row = match row {
            Ok(row) => row,
            Err(e) => {
                error!("Failed to parse CSV row {}: {}", row_no + 1, e);
                continue;
            }
        };
        let id = row.remove("id").filter(|id| !id.is_empty());
        let (Some(id), Some(text)) = (id, row.remove(text_column)) else {
            error!("CSV row {} has no id or {} column", row_no + 1, text_column);
            continue;
        };
        items.push(BatchItem {
            id,
            text,
            generated_text: row.remove("generated_text").filter(|s| !s.is_empty()),
        });
    }
    Ok(items)
}

pub fn write_records(mut writer: impl Write, records: &[BatchRecord]) -> Result<(), BatchError> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_csv_records(writer: impl Write, records: &[BatchRecord]) -> Result<(), BatchError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(CsvRecord::from(record))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Awaits `handles` in order. On the first failed task the remaining tasks
/// are aborted before the error is returned.
async fn collect_in_order<T>(handles: Vec<JoinHandle<T>>) -> Result<Vec<T>, BatchError> {
    let total = handles.len();
    let mut results = Vec::with_capacity(total);
    let mut pending = handles.into_iter();

    while let Some(handle) = pending.next() {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                error!("Batch task failed after {}/{} items: {}", results.len(), total, e);
                pending.for_each(|rest| rest.abort());
                return Err(e.into());
            }
        }
        if results.len() % PROGRESS_EVERY == 0 {
            info!("{}/{} items processed", results.len(), total);
        }
    }

    Ok(results)
}

pub struct BatchRunner {
    executor: CompletionExecutor,
    policy: RetryPolicy,
    preset: PresetSettings,
    max_parallel_tasks: usize,
    score: bool,
    variants: Vec<String>,
    refinement: Option<Refinement>,
    cache: Mutex<HashMap<String, String>>,
}

impl BatchRunner {
    pub fn new(executor: CompletionExecutor, policy: RetryPolicy, preset: PresetSettings) -> Self {
        Self {
            executor,
            policy,
            preset,
            max_parallel_tasks: 1,
            score: false,
            variants: Vec::new(),
            refinement: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_parallel_tasks(mut self, max_parallel_tasks: usize) -> Self {
        self.max_parallel_tasks = max_parallel_tasks.max(1);
        self
    }

    pub fn with_scoring(mut self, score: bool) -> Self {
        self.score = score;
        self
    }

    /// Runs every item once per named user variant of the preset instead of
    /// once with the default user template.
    pub fn with_variants(mut self, variants: Vec<String>) -> Result<Self, BatchError> {
        if let Some(unknown) = variants.iter().find(|name| !self.preset.has_variant(name)) {
            return Err(BatchError::UnknownVariant(unknown.clone()));
        }
        self.variants = variants;
        Ok(self)
    }

    /// Scores each generation with the evaluator and regenerates until the
    /// thresholds pass. Responses are not reused in this mode.
    pub fn with_refinement(mut self, refinement: Refinement) -> Self {
        self.refinement = Some(refinement);
        self
    }

    /// Processes every item (once per variant), at most `max_parallel_tasks`
    /// at a time. Records come back in input order, variants in the order
    /// they were given.
    pub async fn run(self: Arc<Self>, items: Vec<BatchItem>) -> Result<Vec<BatchRecord>, BatchError> {
        let variants: Vec<Option<String>> = if self.variants.is_empty() {
            vec![None]
        } else {
            self.variants.iter().cloned().map(Some).collect()
        };
        let total = items.len() * variants.len();
        let semaphore = Arc::new(Semaphore::new(self.max_parallel_tasks));
        info!(
            "Processing {} items with up to {} parallel tasks",
            total, self.max_parallel_tasks
        );

        let mut handles = Vec::with_capacity(total);
        for item in items {
            for variant in &variants {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        handles.iter().for_each(JoinHandle::abort);
                        return Err(e.into());
                    }
                };
                let runner = self.clone();
                let item = item.clone();
                let variant = variant.clone();
                handles.push(tokio::spawn(async move {
                    let record = runner.process_item(item, variant).await;
                    drop(permit);
                    record
                }));
            }
        }

        let records = collect_in_order(handles).await?;

        let completed = records
            .iter()
            .filter(|r| r.status == TaskStatus::Completed)
            .count();
        info!("Batch finished: {}/{} completed", completed, total);
        Ok(records)
    }

    async fn process_item(&self, item: BatchItem, variant: Option<String>) -> BatchRecord {
        let started_at = Utc::now();
        match &variant {
            Some(name) => info!("Processing item {} ({})", item.id, name),
            None => info!("Processing item {}", item.id),
        }

        let mut vars = TemplateVars::new(&item.text);
        if let Some(generated) = item.generated_text.as_deref() {
            vars = vars.with_generated_text(generated);
        }
        let request = self
            .preset
            .build_variant_request(variant.as_deref(), &vars)
            .unwrap_or_else(|| self.preset.build_request(&vars));
        let hash = body_hash(&request);

        let (response, rounds, evaluation) = match &self.refinement {
            Some(refinement) => {
                let refined = refine::refine(
                    &self.executor,
                    &self.policy,
                    &self.preset,
                    refinement,
                    &vars,
                    variant.as_deref(),
                )
                .await;
                let response = CompletionResponse {
                    content: refined.content,
                    attempts: refined.attempts,
                    cached: false,
                };
                (response, Some(refined.rounds), refined.evaluation)
            }
            None => (self.complete(&item.id, &request, &hash).await, None, None),
        };

        let status = if response.is_completed() {
            TaskStatus::Completed
        } else {
            error!("Item {} exhausted after {} attempts", item.id, response.attempts);
            TaskStatus::Failed
        };

        let (scores, weighted_scores) = match (&response.content, self.score) {
            (Some(content), true) => (
                Some(score::parse_scores(content)),
                Some(score::weighted_scores(content)),
            ),
            _ => (None, None),
        };

        let completed_at = Utc::now();
        BatchRecord {
            id: item.id,
            variant,
            status,
            content: response.content_or(NOT_AVAILABLE).to_string(),
            attempts: response.attempts,
            cached: response.cached,
            body_hash: hash,
            started_at,
            completed_at,
            duration_ms: completed_at
                .signed_duration_since(started_at)
                .num_milliseconds(),
            scores,
            weighted_scores,
            rounds,
            evaluation,
        }
    }

    async fn complete(&self, id: &str, request: &CompletionRequest, hash: &str) -> CompletionResponse {
        if let Some(content) = self.cached(hash) {
            info!("Using cached response for item {}", id);
            return CompletionResponse {
                cached: true,
                ..CompletionResponse::completed(content, 0)
            };
        }

        let response = self.executor.execute_with_retries(request, &self.policy).await;
        if let Some(content) = &response.content {
            self.remember(hash, content);
        }
        response
    }

    fn cached(&self, hash: &str) -> Option<String> {
        self.cache.lock().ok()?.get(hash).cloned()
    }

    fn remember(&self, hash: &str, content: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(hash.to_string(), content.to_string());
        }
    }
}
