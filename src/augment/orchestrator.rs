//! Resumable batch augmentation.
//!
//! A run moves through `Indexing -> Loading -> (BatchFill -> Dispatch ->
//! Drain)* -> Done`. Each batch is read sequentially from the input, sent
//! to the generation client concurrently, and drained one result at a time
//! so that the output sink, rejection sink and processed log only ever
//! have a single writer. Batch N+1 is not read before batch N has drained.
//!
//! An id is marked done only after its augmented record is synced to the
//! output file. A crash between the two leaves a duplicate output line on
//! the next run, never a lost one.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::AugmentConfig;
use super::processed::ProcessedSet;
use super::progress::{ProgressCounters, ProgressMonitor};
use super::sink::{OutputSink, RejectionSink};
use crate::dataset::{index_dataset, IndexOutcome, JsonlReader, Record, SourceLine};
use crate::error::DatasetError;
use crate::llm::{Completion, GenerationClient, LlmProvider};
use crate::template::{PromptTemplate, TemplateRotator, TemplateSet};

/// Field holding the template the prompt was rendered from.
pub const TEMPLATE_FIELD: &str = "template";
/// Field holding the rendered prompt.
pub const PROMPT_FIELD: &str = "prompt";
/// Field holding the raw response content.
pub const RESPONSE_FIELD: &str = "response";
/// Field holding the parsed response in JSON response mode.
pub const AUGMENTATION_FIELD: &str = "augmentation";

/// State transitions reported while a run progresses.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AugmentEvent {
    Indexed { outcome: IndexOutcome },
    TemplatesLoaded { count: usize },
    BatchDispatched { batch: usize, size: usize },
    BatchDrained { batch: usize, succeeded: usize, rejected: usize },
    Completed { succeeded: u64, rejected: u64 },
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub index: IndexOutcome,
    pub templates: usize,
    pub batches: usize,
    /// Generations written during this run.
    pub succeeded: u64,
    /// Records written to the rejection sink during this run.
    pub rejected: u64,
    /// Records skipped because they were already processed.
    pub skipped: u64,
    pub target: u64,
    pub target_reached: bool,
    /// Ids in the processed log after the run, earlier runs included.
    pub processed_total: usize,
    pub output_path: PathBuf,
    pub elapsed_secs: f64,
}

/// An admitted record with its rendered prompt.
struct Prepared {
    idx: u64,
    record: Record,
    template: Arc<PromptTemplate>,
    prompt: String,
}

/// A record that failed before it could be dispatched.
struct EarlyRejection {
    error: String,
    data: Value,
}

#[derive(Default)]
struct Batch {
    ready: Vec<Prepared>,
    rejected: Vec<EarlyRejection>,
    /// Records counted against the batch size: ready plus render failures.
    admitted: usize,
    skipped: u64,
    exhausted: bool,
}

impl Batch {
    fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.rejected.is_empty()
    }
}

/// Everything a run writes to.
struct RunState {
    reader: JsonlReader,
    rotator: TemplateRotator,
    processed: ProcessedSet,
    output: OutputSink,
    rejections: RejectionSink,
    /// Ids admitted so far in this run.
    admitted: HashSet<u64>,
}

/// Batch augmentation orchestrator.
pub struct Augmenter {
    config: AugmentConfig,
    client: GenerationClient,
    templates: Option<TemplateSet>,
    events: Option<mpsc::Sender<AugmentEvent>>,
    counters: ProgressCounters,
}

impl Augmenter {
    /// Create an augmenter whose client follows the configured retry policy
    /// and response format.
    pub fn new(config: AugmentConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let client =
            GenerationClient::new(provider, config.retry).with_format(config.response_format);
        Self::with_client(config, client)
    }

    pub fn with_client(config: AugmentConfig, client: GenerationClient) -> Self {
        Self {
            config,
            client,
            templates: None,
            events: None,
            counters: ProgressCounters::new(),
        }
    }

    /// Use an in-memory template set instead of loading the templates directory.
    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Report state transitions on `sender`. Sends wait for capacity, so the
    /// receiver must keep up or the channel must be large enough.
    pub fn with_events(mut self, sender: mpsc::Sender<AugmentEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &AugmentConfig {
        &self.config
    }

    /// Live counters, shared with the progress monitor.
    pub fn counters(&self) -> &ProgressCounters {
        &self.counters
    }

    /// Run until the target number of generations is reached or the input
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Setup faults (invalid configuration, unreadable input, no templates,
    /// unwritable sinks) abort before the first batch. A sink write failure
    /// mid-run also aborts, since nothing after it could be recorded
    /// durably. Per-record failures never surface here.
    pub async fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();
        self.config.validate()?;
        let target = self.config.total_generations;

        let index = self.index().await?;
        self.emit(AugmentEvent::Indexed { outcome: index }).await;

        let templates = self.load_templates()?;
        let template_count = templates.len();
        info!(count = template_count, "Loaded templates");
        self.emit(AugmentEvent::TemplatesLoaded {
            count: template_count,
        })
        .await;

        let mut state = self.open_state(templates).await?;
        info!(
            input = %self.config.input_path.display(),
            output = %state.output.path().display(),
            already_processed = state.processed.len(),
            target,
            batch_size = self.config.batch_size,
            "Starting generation"
        );

        let monitor = self
            .config
            .progress_interval
            .map(|interval| ProgressMonitor::start(self.counters.clone(), target, interval));

        let mut succeeded: u64 = 0;
        let mut rejected: u64 = 0;
        let mut skipped: u64 = 0;
        let mut batches: usize = 0;

        while succeeded < target {
            let capacity = (target - succeeded).min(self.config.batch_size as u64) as usize;
            let batch = self.fill_batch(&mut state, capacity).await?;
            skipped += batch.skipped;

            if batch.is_empty() {
                info!("Input exhausted");
                break;
            }

            batches += 1;
            let exhausted = batch.exhausted;
            let (batch_ok, batch_rejected) = self.run_batch(&mut state, batch, batches).await?;
            succeeded += batch_ok as u64;
            rejected += batch_rejected as u64;

            if exhausted {
                info!("Input exhausted");
                break;
            }
        }

        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let target_reached = succeeded >= target;
        if target_reached {
            info!(target, "Reached target number of generations");
        }
        self.emit(AugmentEvent::Completed {
            succeeded,
            rejected,
        })
        .await;

        let summary = RunSummary {
            index,
            templates: template_count,
            batches,
            succeeded,
            rejected,
            skipped,
            target,
            target_reached,
            processed_total: state.processed.len(),
            output_path: state.output.path().to_path_buf(),
            elapsed_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            succeeded,
            rejected,
            skipped,
            batches,
            elapsed_secs = format!("{:.1}", summary.elapsed_secs),
            "Processing complete"
        );
        Ok(summary)
    }

    async fn index(&self) -> Result<IndexOutcome> {
        let input = self.config.input_path.clone();
        tokio::task::spawn_blocking(move || index_dataset(&input))
            .await
            .context("Indexer task failed")?
            .with_context(|| {
                format!(
                    "Failed to index dataset {}",
                    self.config.input_path.display()
                )
            })
    }

    fn load_templates(&self) -> Result<TemplateSet> {
        match &self.templates {
            Some(set) => Ok(set.clone()),
            None => TemplateSet::load_directory(&self.config.templates_dir).with_context(|| {
                format!(
                    "Failed to load templates from {}",
                    self.config.templates_dir.display()
                )
            }),
        }
    }

    async fn open_state(&self, templates: TemplateSet) -> Result<RunState> {
        let processed = ProcessedSet::load(&self.config.processed_log)
            .await
            .with_context(|| {
                format!(
                    "Failed to load processed log {}",
                    self.config.processed_log.display()
                )
            })?;
        let output = OutputSink::open(&self.config.output_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open output file {}",
                    self.config.output_path.display()
                )
            })?;
        let rejections = RejectionSink::open(self.config.rejection.clone())
            .await
            .with_context(|| {
                format!(
                    "Failed to open rejection sink {}",
                    self.config.rejection.path().display()
                )
            })?;
        let reader = JsonlReader::open(&self.config.input_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open input {}",
                    self.config.input_path.display()
                )
            })?;

        Ok(RunState {
            reader,
            rotator: TemplateRotator::new(templates),
            processed,
            output,
            rejections,
            admitted: HashSet::new(),
        })
    }

    /// Read records until `capacity` are admitted or the input runs out.
    ///
    /// Already processed ids are skipped without counting toward the batch.
    /// Unparseable lines, and records repeating an id admitted earlier in
    /// the run, are set aside for the rejection sink and do not count
    /// either. A record whose prompt fails to render is admitted (it
    /// consumes a template and a batch slot) and set aside as a rejection.
    async fn fill_batch(&self, state: &mut RunState, capacity: usize) -> Result<Batch> {
        let mut batch = Batch::default();

        while batch.admitted < capacity {
            let source = state
                .reader
                .next_line()
                .await
                .context("Failed to read input")?;
            let Some(SourceLine { line, raw, record }) = source else {
                batch.exhausted = true;
                break;
            };

            let parsed = record.and_then(|record| match record.idx() {
                Some(idx) => Ok((idx, record)),
                None => Err(DatasetError::MissingIndex { line }),
            });
            let (idx, record) = match parsed {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(line, error = %err, "Malformed input line, writing to rejected");
                    batch.rejected.push(EarlyRejection {
                        error: err.to_string(),
                        data: Value::String(raw),
                    });
                    continue;
                }
            };

            if state.processed.contains(idx) {
                batch.skipped += 1;
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            if !state.admitted.insert(idx) {
                let err = DatasetError::DuplicateIndex { idx, line };
                warn!(idx, line, "Duplicate idx in input, writing to rejected");
                batch.rejected.push(EarlyRejection {
                    error: err.to_string(),
                    data: record.into_value(),
                });
                continue;
            }

            batch.admitted += 1;
            self.counters.admitted.fetch_add(1, Ordering::Relaxed);

            let template = state.rotator.next_template();
            match template.render(&record) {
                Ok(prompt) => batch.ready.push(Prepared {
                    idx,
                    record,
                    template,
                    prompt,
                }),
                Err(err) => {
                    warn!(
                        idx,
                        template = template.name(),
                        error = %err,
                        "Failed to render prompt, writing to rejected"
                    );
                    batch.rejected.push(EarlyRejection {
                        error: err.to_string(),
                        data: record.into_value(),
                    });
                }
            }
        }

        Ok(batch)
    }

    /// Dispatch one batch concurrently, then drain it sequentially.
    ///
    /// Returns the number of successes and rejections.
    async fn run_batch(
        &self,
        state: &mut RunState,
        batch: Batch,
        number: usize,
    ) -> Result<(usize, usize)> {
        let Batch {
            ready,
            rejected: early,
            ..
        } = batch;

        info!(batch = number, size = ready.len(), "Dispatching batch");
        self.emit(AugmentEvent::BatchDispatched {
            batch: number,
            size: ready.len(),
        })
        .await;

        let client = &self.client;
        let params = &self.config.model;
        let calls = ready.iter().map(|prepared| async move {
            debug!(idx = prepared.idx, "Sending prompt");
            client
                .generate(&prepared.idx.to_string(), &prepared.prompt, params)
                .await
        });
        let results = futures::future::join_all(calls).await;

        let mut succeeded = 0usize;
        let mut rejected = 0usize;

        for (prepared, result) in ready.into_iter().zip(results) {
            let idx = prepared.idx;
            match result {
                Ok(completion) => {
                    let record = augmented_record(prepared, completion);
                    state
                        .output
                        .append(&record)
                        .await
                        .with_context(|| format!("Failed to write output for idx {}", idx))?;
                    state
                        .processed
                        .mark_done(idx)
                        .await
                        .with_context(|| format!("Failed to mark idx {} as processed", idx))?;
                    succeeded += 1;
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    debug!(idx, "Saved generation");
                }
                Err(failure) => {
                    warn!(idx, error = %failure, "Generation failed, writing to rejected");
                    state
                        .rejections
                        .reject(failure.reason(), prepared.record.into_value())
                        .await
                        .with_context(|| format!("Failed to write rejection for idx {}", idx))?;
                    rejected += 1;
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        for rejection in early {
            state
                .rejections
                .reject(rejection.error, rejection.data)
                .await
                .context("Failed to write rejection")?;
            rejected += 1;
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        info!(batch = number, succeeded, rejected, "Batch drained");
        self.emit(AugmentEvent::BatchDrained {
            batch: number,
            succeeded,
            rejected,
        })
        .await;

        Ok((succeeded, rejected))
    }

    async fn emit(&self, event: AugmentEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event).await;
        }
    }
}

/// The original record plus the template, prompt and response.
fn augmented_record(prepared: Prepared, completion: Completion) -> Record {
    let Prepared {
        mut record,
        template,
        prompt,
        ..
    } = prepared;
    record.insert(TEMPLATE_FIELD, template.source());
    record.insert(PROMPT_FIELD, prompt);
    record.insert(RESPONSE_FIELD, completion.content);
    if let Some(parsed) = completion.parsed {
        record.insert(AUGMENTATION_FIELD, parsed);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::sink::{RejectionEntry, RejectionTarget};
    use crate::error::LlmError;
    use crate::llm::{GenerationRequest, GenerationResponse, ResponseFormat, RetryLimit, RetryPolicy};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Provider that answers every prompt with the prompt's own text,
    /// except prompts containing "forbidden", which get a 403.
    #[derive(Default)]
    struct EchoProvider {
        prompts: Mutex<Vec<String>>,
    }

    impl EchoProvider {
        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl LlmProvider for EchoProvider {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            let prompt = request.prompt().unwrap_or_default().to_string();
            self.prompts.lock().expect("lock").push(prompt.clone());
            if prompt.contains("forbidden") {
                return Err(LlmError::Forbidden("content policy".to_string()));
            }
            Ok(GenerationResponse::from_content(format!("re: {}", prompt)))
        }
    }

    fn write_input(dir: &Path, questions: &[&str]) -> PathBuf {
        let path = dir.join("questions.jsonl");
        let content: String = questions
            .iter()
            .map(|q| format!("{}\n", serde_json::json!({ "question": q })))
            .collect();
        std::fs::write(&path, content).expect("write input");
        path
    }

    fn test_config(dir: &Path, input: PathBuf) -> AugmentConfig {
        let mut config = AugmentConfig::default();
        config.input_path = input;
        config.output_path = dir.join("output/questions_augmented.jsonl");
        config.rejection = RejectionTarget::File(dir.join("rejected.jsonl"));
        config.processed_log = dir.join("processed_indices.txt");
        config.templates_dir = dir.join("templates");
        config.batch_size = 3;
        config.total_generations = 100;
        config.retry = RetryPolicy::new(RetryLimit::Limited(2), Duration::ZERO);
        config.progress_interval = None;
        config
    }

    fn templates(sources: &[(&str, &str)]) -> TemplateSet {
        TemplateSet::new(
            sources
                .iter()
                .map(|(name, source)| PromptTemplate::parse(*name, *source).expect("valid template"))
                .collect(),
        )
        .expect("non-empty set")
    }

    fn read_lines(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).expect("valid json line"))
            .collect()
    }

    #[tokio::test]
    async fn test_templates_rotate_round_robin_across_batches() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = write_input(temp_dir.path(), &["1", "2", "3", "4", "5", "6", "7"]);
        let config = test_config(temp_dir.path(), input);
        let output_path = config.output_path.clone();

        let provider = Arc::new(EchoProvider::default());
        let augmenter = Augmenter::new(config, provider.clone()).with_templates(templates(&[
            ("a", "A {question}"),
            ("b", "B {question}"),
            ("c", "C {question}"),
        ]));

        let summary = augmenter.run().await.expect("run should succeed");
        assert_eq!(summary.succeeded, 7);
        assert_eq!(summary.batches, 3);

        let mut outputs = read_lines(&output_path);
        outputs.sort_by_key(|v| v["idx"].as_u64());
        let assigned: Vec<&str> = outputs
            .iter()
            .map(|v| &v["prompt"].as_str().expect("prompt")[..1])
            .collect();
        assert_eq!(assigned, vec!["A", "B", "C", "A", "B", "C", "A"]);
        assert_eq!(outputs[3]["template"], "A {question}");
        assert_eq!(outputs[3]["response"], "re: A 4");
        assert_eq!(provider.prompts().len(), 7);
    }

    #[tokio::test]
    async fn test_run_stops_at_target_without_overshooting() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = write_input(temp_dir.path(), &["1", "2", "3", "4", "5"]);
        let mut config = test_config(temp_dir.path(), input);
        config.total_generations = 4;
        let processed_log = config.processed_log.clone();

        let provider = Arc::new(EchoProvider::default());
        let augmenter =
            Augmenter::new(config, provider.clone()).with_templates(templates(&[("q", "{question}")]));

        let summary = augmenter.run().await.expect("run should succeed");
        assert_eq!(summary.succeeded, 4);
        assert!(summary.target_reached);
        assert_eq!(provider.prompts().len(), 4);
        assert_eq!(
            std::fs::read_to_string(&processed_log).expect("read"),
            "0\n1\n2\n3\n"
        );
    }

    #[tokio::test]
    async fn test_render_failure_is_rejected_and_does_not_abort_batch() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = temp_dir.path().join("questions.jsonl");
        std::fs::write(
            &input,
            "{\"question\":\"a\"}\n{\"title\":\"no question\"}\n{\"question\":\"c\"}\n",
        )
        .expect("write input");
        let config = test_config(temp_dir.path(), input);
        let rejected_path = temp_dir.path().join("rejected.jsonl");
        let output_path = config.output_path.clone();

        let provider = Arc::new(EchoProvider::default());
        let augmenter =
            Augmenter::new(config, provider.clone()).with_templates(templates(&[("q", "Q: {question}")]));

        let summary = augmenter.run().await.expect("run should succeed");
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(read_lines(&output_path).len(), 2);

        let rejections = read_lines(&rejected_path);
        assert_eq!(rejections.len(), 1);
        let entry: RejectionEntry =
            serde_json::from_value(rejections[0].clone()).expect("rejection entry");
        assert!(entry.error.contains("question"));
        assert_eq!(entry.data["idx"], 1);
    }

    #[tokio::test]
    async fn test_malformed_line_after_indexing_is_rejected() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = temp_dir.path().join("questions.jsonl");
        std::fs::write(
            &input,
            "{\"question\":\"a\",\"idx\":0}\n{broken\n{\"question\":\"c\"}\n",
        )
        .expect("write input");
        let config = test_config(temp_dir.path(), input);
        let rejected_path = temp_dir.path().join("rejected.jsonl");

        let provider = Arc::new(EchoProvider::default());
        let augmenter =
            Augmenter::new(config, provider).with_templates(templates(&[("q", "{question}")]));

        let summary = augmenter.run().await.expect("run should succeed");
        assert_eq!(summary.index, IndexOutcome::AlreadyIndexed);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.rejected, 2);

        let rejections = read_lines(&rejected_path);
        let raw: Vec<&Value> = rejections.iter().map(|r| &r["data"]).collect();
        assert!(raw.contains(&&Value::String("{broken".to_string())));
    }

    #[tokio::test]
    async fn test_forbidden_is_rejected_and_not_marked_done() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = write_input(temp_dir.path(), &["fine", "forbidden", "also fine"]);
        let config = test_config(temp_dir.path(), input);
        let processed_log = config.processed_log.clone();

        let provider = Arc::new(EchoProvider::default());
        let augmenter =
            Augmenter::new(config, provider).with_templates(templates(&[("q", "{question}")]));

        let summary = augmenter.run().await.expect("run should succeed");
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.processed_total, 2);

        let done = ProcessedSet::load(&processed_log).await.expect("load");
        assert!(done.contains(0));
        assert!(!done.contains(1));
        assert!(done.contains(2));
    }

    #[tokio::test]
    async fn test_duplicate_idx_is_generated_once() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = temp_dir.path().join("questions.jsonl");
        std::fs::write(
            &input,
            "{\"idx\":0,\"question\":\"a\"}\n{\"idx\":0,\"question\":\"b\"}\n",
        )
        .expect("write input");
        let config = test_config(temp_dir.path(), input);
        let output_path = config.output_path.clone();
        let rejected_path = temp_dir.path().join("rejected.jsonl");

        let provider = Arc::new(EchoProvider::default());
        let augmenter = Augmenter::new(config, provider.clone())
            .with_templates(templates(&[("q", "{question}")]));

        let summary = augmenter.run().await.expect("run should succeed");
        assert_eq!(provider.prompts(), vec!["a".to_string()]);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(read_lines(&output_path).len(), 1);

        let rejections = read_lines(&rejected_path);
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0]["data"]["question"], "b");
    }

    #[tokio::test]
    async fn test_json_mode_stores_parsed_augmentation() {
        struct JsonProvider;

        #[async_trait]
        impl LlmProvider for JsonProvider {
            async fn generate(
                &self,
                _request: &GenerationRequest,
            ) -> Result<GenerationResponse, LlmError> {
                Ok(GenerationResponse::from_content(r#"{"answer": 42}"#))
            }
        }

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = write_input(temp_dir.path(), &["q"]);
        let mut config = test_config(temp_dir.path(), input);
        config.response_format = ResponseFormat::Json;
        let output_path = config.output_path.clone();

        let augmenter = Augmenter::new(config, Arc::new(JsonProvider))
            .with_templates(templates(&[("q", "{question}")]));
        augmenter.run().await.expect("run should succeed");

        let outputs = read_lines(&output_path);
        assert_eq!(outputs[0]["augmentation"], serde_json::json!({"answer": 42}));
        assert_eq!(outputs[0]["response"], r#"{"answer": 42}"#);
    }

    #[tokio::test]
    async fn test_events_follow_state_transitions() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = write_input(temp_dir.path(), &["a", "b"]);
        let config = test_config(temp_dir.path(), input);

        let (tx, mut rx) = mpsc::channel(32);
        let augmenter = Augmenter::new(config, Arc::new(EchoProvider::default()))
            .with_templates(templates(&[("q", "{question}")]))
            .with_events(tx);
        augmenter.run().await.expect("run should succeed");
        drop(augmenter);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(
            events[0],
            AugmentEvent::Indexed {
                outcome: IndexOutcome::Indexed { records: 2 }
            }
        ));
        assert!(matches!(events[1], AugmentEvent::TemplatesLoaded { count: 1 }));
        assert!(matches!(
            events[2],
            AugmentEvent::BatchDispatched { batch: 1, size: 2 }
        ));
        assert!(matches!(
            events[3],
            AugmentEvent::BatchDrained {
                batch: 1,
                succeeded: 2,
                rejected: 0
            }
        ));
        assert!(matches!(
            events.last(),
            Some(AugmentEvent::Completed {
                succeeded: 2,
                rejected: 0
            })
        ));
    }

    #[tokio::test]
    async fn test_missing_templates_directory_is_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let input = write_input(temp_dir.path(), &["a"]);
        let config = test_config(temp_dir.path(), input);
        let output_path = config.output_path.clone();

        let provider = Arc::new(EchoProvider::default());
        let result = Augmenter::new(config, provider.clone()).run().await;
        assert!(result.is_err());
        assert!(provider.prompts().is_empty());
        assert!(!output_path.exists());
    }
}
