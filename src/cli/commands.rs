//! CLI command definitions for augment-forge.
//!
//! `generate` runs a resumable augmentation over one JSONL file, `index`
//! only assigns record ids, and `curate` holds the offline filter and
//! chunk passes.

use crate::augment::{
    AugmentConfig, Augmenter, RejectionTarget, RunLayout, RunSummary, DEFAULT_BATCH_SIZE,
    DEFAULT_OUTPUT_DIR, DEFAULT_PROCESSED_LOG, DEFAULT_REJECTED_DIR, DEFAULT_TEMPLATES_DIR,
    DEFAULT_TOTAL_GENERATIONS,
};
use crate::curation::{
    run_chunk, run_filter, ChunkOptions, FilterOptions, DEFAULT_EXCLUDE_FIELD,
};
use crate::dataset::{index_dataset, IndexOutcome};
use crate::llm::{
    ChatCompletionsClient, ModelParams, ResponseFormat, RetryLimit, RetryPolicy, API_BASE_ENV,
    API_KEY_ENV, DEFAULT_API_BASE,
};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default model name sent with every request.
const DEFAULT_MODEL: &str = "mix";

/// Resumable batch augmentation of JSONL datasets.
#[derive(Parser)]
#[command(name = "augment-forge")]
#[command(about = "Augment JSONL datasets against an OpenAI-compatible chat completion API")]
#[command(version)]
#[command(
    long_about = "augment-forge renders a rotating set of prompt templates against every record of a JSONL dataset, sends the prompts to an OpenAI-compatible chat completion endpoint in concurrent batches, and appends the responses to an output file.\n\nRuns are resumable: completed record ids are logged to processed_indices.txt and skipped on the next run.\n\nExample usage:\n  augment-forge generate --input data/questions.jsonl --batch 64 --total 1000"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate augmentations for every unprocessed record of a dataset.
    #[command(alias = "gen")]
    Generate(Box<GenerateArgs>),

    /// Assign a stable `idx` to every record of a dataset, if not done yet.
    Index(IndexArgs),

    /// Offline curation of generated datasets.
    Curate(CurateArgs),
}

/// Arguments for `augment-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// JSONL dataset to augment. Indexed in place on first use.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Stop after this many successful generations.
    #[arg(short = 'n', long, default_value_t = DEFAULT_TOTAL_GENERATIONS)]
    pub total: u64,

    /// Records dispatched concurrently per batch.
    #[arg(short, long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch: usize,

    /// Model name sent to the API.
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, default_value_t = 16000)]
    pub max_tokens: u32,

    #[arg(short, long, default_value_t = 1.3)]
    pub temperature: f64,

    #[arg(long)]
    pub top_p: Option<f64>,

    #[arg(long)]
    pub min_p: Option<f64>,

    /// Tail-free sampling parameter.
    #[arg(long)]
    pub tfs: Option<f64>,

    #[arg(long)]
    pub repetition_penalty: Option<f64>,

    #[arg(long)]
    pub presence_penalty: Option<f64>,

    #[arg(long)]
    pub frequency_penalty: Option<f64>,

    /// Maximum attempts per record, or "unlimited".
    #[arg(long, default_value = "10")]
    pub max_retries: RetryLimit,

    /// Seconds to wait before each retry.
    #[arg(long, default_value_t = 30)]
    pub delay: u64,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 600)]
    pub timeout: u64,

    /// Directory of *.txt prompt templates, used in file-name order.
    #[arg(long, default_value = DEFAULT_TEMPLATES_DIR)]
    pub templates: PathBuf,

    /// Directory for <stem>_augmented.jsonl.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Explicit output file; overrides --output-dir.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Directory receiving one <uuid>.jsonl file per rejection.
    #[arg(long, default_value = DEFAULT_REJECTED_DIR)]
    pub rejected_dir: PathBuf,

    /// Append all rejections to this single file instead of --rejected-dir.
    #[arg(long)]
    pub rejected_file: Option<PathBuf>,

    /// Log of completed record ids.
    #[arg(long, default_value = DEFAULT_PROCESSED_LOG)]
    pub processed_log: PathBuf,

    /// Required shape of response content (text or json).
    #[arg(long, default_value = "text")]
    pub response_format: ResponseFormat,

    /// Base URL of the chat completion API.
    #[arg(long, env = API_BASE_ENV, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Bearer token for the API.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Seconds between progress log lines; 0 disables them.
    #[arg(long, default_value_t = 60)]
    pub progress_interval: u64,

    /// Output the run summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl GenerateArgs {
    /// Build the run configuration these arguments describe.
    pub fn to_config(&self) -> AugmentConfig {
        let layout = RunLayout {
            output_dir: self.output_dir.clone(),
            rejected_dir: self.rejected_dir.clone(),
            processed_log: self.processed_log.clone(),
            templates_dir: self.templates.clone(),
        };

        let mut config = AugmentConfig::for_input(&self.input, &layout);
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(file) = &self.rejected_file {
            config.rejection = RejectionTarget::File(file.clone());
        }
        config.total_generations = self.total;
        config.batch_size = self.batch;
        config.model = ModelParams {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            min_p: self.min_p,
            tfs: self.tfs,
            repetition_penalty: self.repetition_penalty,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        };
        config.retry = RetryPolicy::new(self.max_retries, Duration::from_secs(self.delay));
        config.response_format = self.response_format;
        config.progress_interval =
            (self.progress_interval > 0).then(|| Duration::from_secs(self.progress_interval));
        config
    }
}

/// Arguments for `augment-forge index`.
#[derive(Parser, Debug)]
pub struct IndexArgs {
    /// JSONL dataset to index in place.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output the outcome as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Curation entrypoint arguments.
#[derive(Parser, Debug)]
pub struct CurateArgs {
    /// Curation pass to run.
    #[command(subcommand)]
    pub command: CurateSubcommand,
}

/// Curation subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum CurateSubcommand {
    /// Deduplicate, exclude already-seen records and drop tagged records.
    Dedup(DedupArgs),

    /// Select per-system-prompt chunks listed in a manifest.
    Chunk(ChunkArgs),
}

/// Arguments for `augment-forge curate dedup`.
#[derive(Parser, Debug)]
pub struct DedupArgs {
    /// JSONL file to filter.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the surviving records.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Comma-separated deduplication keys, applied in order.
    #[arg(long, value_delimiter = ',', default_value = "id,question")]
    pub keys: Vec<String>,

    /// JSONL reference file; records whose --exclude-field value appears there are dropped.
    #[arg(long)]
    pub exclude_from: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_EXCLUDE_FIELD)]
    pub exclude_field: String,

    /// YAML list of tag rules ({name, pattern, fields?}).
    #[arg(long)]
    pub tags: Option<PathBuf>,

    /// Output the report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `augment-forge curate chunk`.
#[derive(Parser, Debug)]
pub struct ChunkArgs {
    /// JSONL pool to select records from.
    #[arg(short, long)]
    pub input: PathBuf,

    /// JSON manifest with a "chunks" (or "chuncks") list.
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Where to write the selected records.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Seed for a reproducible shuffle.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output the report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(*args).await,
        Commands::Index(args) => run_index_command(args).await,
        Commands::Curate(args) => match args.command {
            CurateSubcommand::Dedup(args) => run_dedup_command(args),
            CurateSubcommand::Chunk(args) => run_chunk_command(args),
        },
    }
}

// ============================================================================
// Generate
// ============================================================================

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let config = args.to_config();
    config.validate()?;

    if !args.input.is_file() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    let provider = ChatCompletionsClient::new(
        args.api_base.clone(),
        args.api_key.clone(),
        Duration::from_secs(args.timeout),
    )
    .context("Failed to initialize API client")?;
    info!(
        api_base = %provider.api_base(),
        authenticated = provider.has_api_key(),
        model = %config.model.model,
        "Using chat completions endpoint"
    );

    let summary = Augmenter::new(config, Arc::new(provider)).run().await?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&summary)
            .map_err(|e| anyhow::anyhow!("Failed to serialize run summary: {}", e))?;
        println!("{}", json_output);
    } else {
        print_run_summary(&summary);
    }

    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("Augmentation finished in {:.1}s", summary.elapsed_secs);
    println!("  Succeeded:  {}", summary.succeeded);
    println!("  Rejected:   {}", summary.rejected);
    println!("  Skipped:    {} (already processed)", summary.skipped);
    println!("  Batches:    {}", summary.batches);
    println!(
        "  Target:     {} ({})",
        summary.target,
        if summary.target_reached {
            "reached"
        } else {
            "input exhausted"
        }
    );
    println!("  Processed:  {} ids in total", summary.processed_total);
    println!("  Output:     {}", summary.output_path.display());
}

// ============================================================================
// Index
// ============================================================================

#[derive(Debug, Serialize)]
struct IndexOutput {
    input: PathBuf,
    outcome: IndexOutcome,
}

async fn run_index_command(args: IndexArgs) -> anyhow::Result<()> {
    let input = args.input.clone();
    let outcome = tokio::task::spawn_blocking(move || index_dataset(&input))
        .await
        .context("Indexer task failed")?
        .with_context(|| format!("Failed to index {}", args.input.display()))?;

    if args.json {
        let json_output = serde_json::to_string_pretty(&IndexOutput {
            input: args.input.clone(),
            outcome,
        })?;
        println!("{}", json_output);
        return Ok(());
    }

    match outcome {
        IndexOutcome::AlreadyIndexed => {
            println!("{} is already indexed", args.input.display())
        }
        IndexOutcome::Indexed { records } => {
            println!("Indexed {} records in {}", records, args.input.display())
        }
        IndexOutcome::Empty => println!("{} contains no records", args.input.display()),
    }
    Ok(())
}

// ============================================================================
// Curate
// ============================================================================

fn run_dedup_command(args: DedupArgs) -> anyhow::Result<()> {
    let options = FilterOptions {
        input: args.input,
        output: args.output,
        keys: args.keys,
        exclude_from: args.exclude_from,
        exclude_field: args.exclude_field,
        tags: args.tags,
    };
    let report = run_filter(&options)
        .with_context(|| format!("Failed to filter {}", options.input.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Filtered {} -> {} records", report.total_before, report.total_after);
    for step in &report.dedup_steps {
        println!("  dedup {:<12} {} -> {}", step.key, step.before, step.after);
    }
    if options.exclude_from.is_some() {
        println!("  excluded           {}", report.excluded);
    }
    for (tag, dropped) in &report.dropped_by_tag {
        println!("  tag {:<14} {}", tag, dropped);
    }
    println!("Output: {}", report.output.display());
    Ok(())
}

fn run_chunk_command(args: ChunkArgs) -> anyhow::Result<()> {
    let options = ChunkOptions {
        input: args.input,
        manifest: args.manifest,
        output: args.output,
        seed: args.seed,
    };
    let report = run_chunk(&options).with_context(|| {
        format!(
            "Failed to select chunks from {} with manifest {}",
            options.input.display(),
            options.manifest.display()
        )
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Selected {} records from {} of {} manifest entries",
        report.records, report.filled, report.entries
    );
    for short in &report.short {
        println!("  {}: Missing {} examples", short.label, short.missing);
    }
    println!("Output: {}", report.output.display());
    Ok(())
}
