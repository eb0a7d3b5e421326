//! Append-only output and rejection sinks.
//!
//! Both sinks write one JSON object per line and sync each line to disk
//! before returning, so a line that was reported written survives a crash.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dataset::Record;
use crate::error::SinkError;

/// A line-delimited file opened for durable appends.
#[derive(Debug)]
struct AppendFile {
    path: PathBuf,
    file: File,
}

impl AppendFile {
    /// Open `path` for appending, creating it and its parent directories.
    ///
    /// If the existing content ends in a partial line (a write torn by a
    /// crash), the fragment is truncated so every line in the file parses.
    async fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        if let Some(valid_len) = complete_prefix_len(path).await? {
            warn!(
                path = %path.display(),
                valid_len,
                "Sink file ends in a partial line, truncating it"
            );
            file.set_len(valid_len).await?;
            file.sync_all().await?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.file.write_all(buf.as_bytes()).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }
}

/// Length of the content up to and including its last newline, or `None`
/// when the file is empty or already ends in a newline.
async fn complete_prefix_len(path: &Path) -> Result<Option<u64>, SinkError> {
    const CHUNK: u64 = 8 * 1024;

    let len = fs::metadata(path).await?.len();
    if len == 0 {
        return Ok(None);
    }

    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; CHUNK as usize];
    let mut end = len;
    loop {
        let start = end.saturating_sub(CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(chunk).await?;

        if end == len && chunk.last() == Some(&b'\n') {
            return Ok(None);
        }
        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            return Ok(Some(start + pos as u64 + 1));
        }
        if start == 0 {
            return Ok(Some(0));
        }
        end = start;
    }
}

/// Output sink for augmented records.
///
/// Opened in append mode so resuming a run never truncates prior results.
#[derive(Debug)]
pub struct OutputSink {
    inner: AppendFile,
    written: usize,
}

impl OutputSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self {
            inner: AppendFile::open(path.as_ref()).await?,
            written: 0,
        })
    }

    /// Append one record and sync it to disk.
    pub async fn append(&mut self, record: &Record) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        self.inner.write_line(&line).await?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Lines appended through this handle.
    pub fn written(&self) -> usize {
        self.written
    }
}

/// Where rejected records go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "path")]
pub enum RejectionTarget {
    /// One `<uuid>.jsonl` file per rejection inside this directory.
    Directory(PathBuf),
    /// All rejections appended to this single file.
    File(PathBuf),
}

impl RejectionTarget {
    pub fn path(&self) -> &Path {
        match self {
            RejectionTarget::Directory(path) | RejectionTarget::File(path) => path,
        }
    }
}

/// One entry of the rejection sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionEntry {
    /// Why the record was rejected.
    pub error: String,
    /// The rejected record, or the raw line when it could not be parsed.
    pub data: Value,
}

enum Destination {
    Directory(PathBuf),
    File(AppendFile),
}

/// Rejection sink for terminal failures.
pub struct RejectionSink {
    target: RejectionTarget,
    destination: Destination,
    written: usize,
}

impl RejectionSink {
    /// Open the sink. Directory mode creates the directory; file mode opens
    /// the file for appending.
    pub async fn open(target: RejectionTarget) -> Result<Self, SinkError> {
        let destination = match &target {
            RejectionTarget::Directory(dir) => {
                fs::create_dir_all(dir).await?;
                Destination::Directory(dir.clone())
            }
            RejectionTarget::File(path) => Destination::File(AppendFile::open(path).await?),
        };
        Ok(Self {
            target,
            destination,
            written: 0,
        })
    }

    /// Write one rejection and return the file it landed in.
    pub async fn reject(
        &mut self,
        error: impl Into<String>,
        data: Value,
    ) -> Result<PathBuf, SinkError> {
        let entry = RejectionEntry {
            error: error.into(),
            data,
        };
        let line = serde_json::to_string(&entry)?;

        let path = match &mut self.destination {
            Destination::File(file) => {
                file.write_line(&line).await?;
                file.path.clone()
            }
            Destination::Directory(dir) => {
                let path = dir.join(format!("{}.jsonl", Uuid::new_v4()));
                let mut file = AppendFile::open(&path).await?;
                file.write_line(&line).await?;
                path
            }
        };

        self.written += 1;
        debug!(path = %path.display(), error = %entry.error, "Wrote rejection");
        Ok(path)
    }

    pub fn target(&self) -> &RejectionTarget {
        &self.target
    }

    /// Rejections written through this handle.
    pub fn written(&self) -> usize {
        self.written
    }
}
