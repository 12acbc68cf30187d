use clap::Parser;
use completion_client::batch::{self, BatchRunner, Format};
use completion_client::cli::{Cli, Command, RefineArgs};
use completion_client::error::BatchError;
use completion_client::preset::TemplateVars;
use completion_client::refine::{self, Refinement};
use completion_client::{CompletionExecutor, Settings, NOT_AVAILABLE};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_writer(std::io::stderr)
        .init();
}

fn refinement(settings: &Settings, args: &RefineArgs) -> Result<Option<Refinement>, BatchError> {
    let Some(name) = args.eval_preset.as_deref() else {
        return Ok(None);
    };
    let evaluator = settings
        .preset(name)
        .cloned()
        .ok_or_else(|| BatchError::UnknownPreset(name.to_string()))?;
    info!(
        "Regenerating below {} total / {} first-criterion score, at most {} rounds",
        args.threshold_proba, args.threshold_correctness, args.max_rounds
    );
    Ok(Some(
        Refinement::new(evaluator)
            .with_thresholds(args.thresholds())
            .with_max_rounds(args.max_rounds),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::from_path(&cli.config).map_err(|e| {
        error!("Failed to load settings from {}: {}", cli.config.display(), e);
        e
    })?;
    let executor = CompletionExecutor::new(&settings.api)?;
    let policy = settings.retry.policy();
    info!(
        "Using endpoint {} (request id {})",
        executor.endpoint(),
        settings.api.request_id
    );

    match cli.command {
        Command::Complete {
            preset,
            text,
            generated_text,
            variant,
            refine: refine_args,
        } => {
            let preset = settings
                .preset(&preset)
                .ok_or_else(|| BatchError::UnknownPreset(preset.clone()))?;
            if let Some(name) = variant.as_deref().filter(|name| !preset.has_variant(name)) {
                return Err(BatchError::UnknownVariant(name.to_string()).into());
            }

            let mut vars = TemplateVars::new(&text);
            if let Some(generated) = generated_text.as_deref() {
                vars = vars.with_generated_text(generated);
            }

            let content = match refinement(&settings, &refine_args)? {
                Some(refinement) => {
                    refine::refine(&executor, &policy, preset, &refinement, &vars, variant.as_deref())
                        .await
                        .content
                }
                None => match preset.build_variant_request(variant.as_deref(), &vars) {
                    Some(request) => executor.execute_with_retries(&request, &policy).await.content,
                    None => None,
                },
            };
            println!("{}", content.as_deref().unwrap_or(NOT_AVAILABLE));
        }
        Command::Batch {
            preset,
            input,
            output,
            score,
            variants,
            text_column,
            refine: refine_args,
        } => {
            let preset = settings
                .preset(&preset)
                .cloned()
                .ok_or_else(|| BatchError::UnknownPreset(preset.clone()))?;

            let items = match Format::from_path(&input) {
                Format::Csv => batch::read_csv_items(File::open(&input)?, &text_column)?,
                Format::JsonLines => batch::read_items(BufReader::new(File::open(&input)?))?,
            };
            info!("Loaded {} items from {}", items.len(), input.display());

            let mut runner = BatchRunner::new(executor, policy, preset)
                .with_max_parallel_tasks(settings.max_parallel_tasks)
                .with_scoring(score)
                .with_variants(variants)?;
            if let Some(refinement) = refinement(&settings, &refine_args)? {
                runner = runner.with_refinement(refinement);
            }
            let records = Arc::new(runner).run(items).await?;

            let writer = BufWriter::new(File::create(&output)?);
            match Format::from_path(&output) {
                Format::Csv => batch::write_csv_records(writer, &records)?,
                Format::JsonLines => batch::write_records(writer, &records)?,
            }
            info!("Wrote {} records to {}", records.len(), output.display());
        }
    }

    Ok(())
}
