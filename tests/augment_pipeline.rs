//! End-to-end tests for the augmentation run against a scripted backend.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::Mutex;

use augment_forge::augment::{AugmentConfig, Augmenter, RejectionTarget};
use augment_forge::error::LlmError;
use augment_forge::llm::{
    GenerationRequest, GenerationResponse, LlmProvider, RetryLimit, RetryPolicy,
};

type Reply = Result<GenerationResponse, LlmError>;

/// Answers by prompt: scripted replies are consumed first, then `fallback`.
struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: String,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(fallback: &str) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: fallback.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    async fn script(&self, prompt: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .await
            .insert(prompt.to_string(), replies.into_iter().collect());
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let prompt = request.prompt().unwrap_or_default().to_string();
        self.calls.lock().await.push(prompt.clone());
        let scripted = self
            .scripts
            .lock()
            .await
            .get_mut(&prompt)
            .and_then(|replies| replies.pop_front());
        scripted.unwrap_or_else(|| Ok(GenerationResponse::from_content(self.fallback.clone())))
    }
}

fn write_input(dir: &Path, questions: &[&str]) -> PathBuf {
    let path = dir.join("questions.jsonl");
    let content: String = questions
        .iter()
        .map(|q| format!("{}\n", json!({ "question": q })))
        .collect();
    std::fs::write(&path, content).expect("write input");
    path
}

fn write_template(dir: &Path, source: &str) -> PathBuf {
    let templates = dir.join("templates");
    std::fs::create_dir_all(&templates).expect("create templates dir");
    std::fs::write(templates.join("question.txt"), source).expect("write template");
    templates
}

fn config(dir: &Path, input: PathBuf) -> AugmentConfig {
    let mut config = AugmentConfig::default();
    config.input_path = input;
    config.output_path = dir.join("output/questions_augmented.jsonl");
    config.rejection = RejectionTarget::Directory(dir.join("rejected"));
    config.processed_log = dir.join("processed_indices.txt");
    config.templates_dir = write_template(dir, "Q: {question}");
    config.batch_size = 3;
    config.total_generations = 100;
    config.retry = RetryPolicy::new(RetryLimit::Limited(3), Duration::ZERO);
    config.progress_interval = None;
    config
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| serde_json::from_str(l).expect("valid json line"))
        .collect()
}

fn processed_ids(path: &Path) -> Vec<u64> {
    let mut ids: Vec<u64> = std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|l| l.parse().expect("numeric id"))
        .collect();
    ids.sort_unstable();
    ids
}

fn rejection_entries(dir: &Path) -> Vec<Value> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .map(|entry| entry.expect("dir entry").path())
        .flat_map(|path| read_lines(&path))
        .collect()
}

#[tokio::test]
async fn test_unindexed_input_is_indexed_and_augmented() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(temp_dir.path(), &["one", "two", "three"]);
    let config = config(temp_dir.path(), input.clone());
    let provider = Arc::new(ScriptedProvider::new("ok"));

    let summary = Augmenter::new(config.clone(), provider)
        .run()
        .await
        .expect("run should succeed");
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.processed_total, 3);

    let indexed = read_lines(&input);
    let idx: Vec<u64> = indexed.iter().filter_map(|r| r["idx"].as_u64()).collect();
    assert_eq!(idx, vec![0, 1, 2]);
    assert_eq!(indexed[1]["question"], "two");

    let output = read_lines(&config.output_path);
    assert_eq!(output.len(), 3);
    for record in &output {
        assert_eq!(record["response"], "ok");
        assert_eq!(record["template"], "Q: {question}");
        assert_eq!(
            record["prompt"],
            format!("Q: {}", record["question"].as_str().expect("question"))
        );
    }
    assert_eq!(processed_ids(&config.processed_log), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_second_run_skips_processed_records() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(temp_dir.path(), &["one", "two", "three", "four"]);
    let mut config = config(temp_dir.path(), input);
    config.total_generations = 2;

    let first = Arc::new(ScriptedProvider::new("first"));
    let summary = Augmenter::new(config.clone(), first)
        .run()
        .await
        .expect("first run");
    assert_eq!(summary.succeeded, 2);

    config.total_generations = 100;
    let second = Arc::new(ScriptedProvider::new("second"));
    let summary = Augmenter::new(config.clone(), second.clone())
        .run()
        .await
        .expect("second run");
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.skipped, 2);

    let mut prompts = second.calls().await;
    prompts.sort();
    assert_eq!(prompts, vec!["Q: four".to_string(), "Q: three".to_string()]);

    let output = read_lines(&config.output_path);
    assert_eq!(output.len(), 4);
    assert_eq!(processed_ids(&config.processed_log), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_rate_limited_record_is_written_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(temp_dir.path(), &["busy"]);
    let config = config(temp_dir.path(), input);
    let provider = Arc::new(ScriptedProvider::new("done"));
    provider
        .script(
            "Q: busy",
            vec![Err(LlmError::RateLimited("slow down".to_string()))],
        )
        .await;

    let summary = Augmenter::new(config.clone(), provider.clone())
        .run()
        .await
        .expect("run should succeed");
    assert_eq!(summary.succeeded, 1);
    assert_eq!(provider.calls().await.len(), 2);

    let output = read_lines(&config.output_path);
    assert_eq!(output.len(), 1);
    assert_eq!(output[0]["response"], "done");
    assert_eq!(processed_ids(&config.processed_log), vec![0]);
}

#[tokio::test]
async fn test_forbidden_record_is_rejected_and_siblings_succeed() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(temp_dir.path(), &["fine", "blocked", "also fine"]);
    let config = config(temp_dir.path(), input);
    let provider = Arc::new(ScriptedProvider::new("ok"));
    provider
        .script(
            "Q: blocked",
            vec![Err(LlmError::Forbidden("content policy".to_string()))],
        )
        .await;

    let summary = Augmenter::new(config.clone(), provider.clone())
        .run()
        .await
        .expect("run should succeed");
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.rejected, 1);
    // Forbidden is terminal: one call per record.
    assert_eq!(provider.calls().await.len(), 3);

    let output = read_lines(&config.output_path);
    assert_eq!(output.len(), 2);
    assert_eq!(processed_ids(&config.processed_log), vec![0, 2]);

    let rejections = rejection_entries(&temp_dir.path().join("rejected"));
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0]["error"], "content policy");
    assert_eq!(rejections[0]["data"]["question"], "blocked");
    assert_eq!(rejections[0]["data"]["idx"], 1);
}

#[tokio::test]
async fn test_exhausted_retries_leave_record_unprocessed() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = write_input(temp_dir.path(), &["flaky"]);
    let config = config(temp_dir.path(), input);
    let provider = Arc::new(ScriptedProvider::new("never reached"));
    provider
        .script(
            "Q: flaky",
            (0..3)
                .map(|_| {
                    Err(LlmError::ApiError {
                        code: 502,
                        message: "bad gateway".to_string(),
                    })
                })
                .collect(),
        )
        .await;

    let summary = Augmenter::new(config.clone(), provider.clone())
        .run()
        .await
        .expect("run should succeed");
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.rejected, 1);
    assert_eq!(provider.calls().await.len(), 3);
    assert!(processed_ids(&config.processed_log).is_empty());
    assert!(read_lines(&config.output_path).is_empty());
    assert_eq!(rejection_entries(&temp_dir.path().join("rejected")).len(), 1);
}
