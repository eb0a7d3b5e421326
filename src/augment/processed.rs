//! Durable set of completed record ids.
//!
//! The log is a plain text file with one id per line. It is only ever
//! appended to; duplicates are harmless because it is loaded into a set.
//! An id must be appended only after its generation has been durably
//! written to the output sink.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::ProgressLogError;

/// Completed record ids, mirrored to an append-only log.
#[derive(Debug)]
pub struct ProcessedSet {
    path: PathBuf,
    ids: HashSet<u64>,
    file: Option<File>,
}

impl ProcessedSet {
    /// Load all ids recorded in `path`. A missing file is an empty set.
    ///
    /// A trailing fragment without a newline is the remains of an
    /// interrupted append; it is truncated away so it can never be read
    /// back as a different id.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ProgressLogError> {
        let path = path.into();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No processed indices found");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut ids = HashSet::new();
        let mut lines: Vec<&str> = content.split('\n').collect();
        // `split` yields a final "" when the content ends in a newline.
        if let Some(last) = lines.pop().filter(|last| !last.is_empty()) {
            warn!(
                path = %path.display(),
                fragment = last,
                "Truncating incomplete last line in processed log"
            );
            let valid_len = (content.len() - last.len()) as u64;
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(valid_len).await?;
            file.sync_all().await?;
        }

        for (i, line) in lines.iter().enumerate() {
            let entry = line.trim();
            if entry.is_empty() {
                continue;
            }
            let idx = entry
                .parse::<u64>()
                .map_err(|_| ProgressLogError::InvalidEntry {
                    line: i + 1,
                    content: entry.to_string(),
                })?;
            ids.insert(idx);
        }

        if !content.is_empty() {
            info!(path = %path.display(), count = ids.len(), "Loaded processed indices");
        }

        Ok(Self {
            path,
            ids,
            file: None,
        })
    }

    pub fn contains(&self, idx: u64) -> bool {
        self.ids.contains(&idx)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `idx` as done: append it to the log, sync, then add it to the set.
    pub async fn mark_done(&mut self, idx: u64) -> Result<(), ProgressLogError> {
        let entry = format!("{}\n", idx);
        let file = self.file().await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await?;

        self.ids.insert(idx);
        Ok(())
    }

    async fn file(&mut self) -> Result<&mut File, ProgressLogError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).await?;
                }
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?
            }
        };
        Ok(self.file.insert(file))
    }
}
