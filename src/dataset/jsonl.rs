//! Line-delimited JSON reading and writing.
//!
//! Blank lines are ignored everywhere: they carry no record and do not
//! advance record positions.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, Lines};

use super::record::Record;
use crate::error::DatasetError;

/// Parse one non-blank line into a record.
///
/// `line` is the 1-based physical line number, used in error messages.
pub fn parse_record(raw: &str, line: usize) -> Result<Record, DatasetError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|source| DatasetError::Json { line, source })?;
    match value {
        Value::Object(map) => Ok(Record::from_map(map)),
        _ => Err(DatasetError::NotAnObject { line }),
    }
}

/// Read every record from a JSONL file.
pub fn read_records(path: &Path) -> Result<Vec<Record>, DatasetError> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_record(&line, i + 1)?);
    }
    Ok(records)
}

/// Write records to any writer, one compact JSON object per line.
pub fn write_records_to<W: Write>(writer: W, records: &[Record]) -> Result<(), DatasetError> {
    let mut writer = BufWriter::new(writer);
    for record in records {
        serde_json::to_writer(&mut writer, record).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write records to a file, replacing its contents.
pub fn write_records(path: &Path, records: &[Record]) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    write_records_to(fs::File::create(path)?, records)
}

/// One line pulled from a record source.
#[derive(Debug)]
pub struct SourceLine {
    /// 1-based physical line number.
    pub line: usize,
    /// The raw text of the line, without the trailing newline.
    pub raw: String,
    /// The parsed record, or why it could not be parsed.
    pub record: Result<Record, DatasetError>,
}

/// Sequential async reader over a JSONL file.
///
/// Reads lazily so that a run over a very large dataset only holds one
/// batch of records in memory.
pub struct JsonlReader {
    lines: Lines<tokio::io::BufReader<tokio::fs::File>>,
    line: usize,
}

impl JsonlReader {
    /// Open a JSONL file for sequential reading.
    pub async fn open(path: &Path) -> Result<Self, DatasetError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self {
            lines: tokio::io::BufReader::new(file).lines(),
            line: 0,
        })
    }

    /// Next non-blank line, or `None` once the source is exhausted.
    pub async fn next_line(&mut self) -> Result<Option<SourceLine>, DatasetError> {
        while let Some(raw) = self.lines.next_line().await? {
            self.line += 1;
            if raw.trim().is_empty() {
                continue;
            }
            let record = parse_record(&raw, self.line);
            return Ok(Some(SourceLine {
                line: self.line,
                raw,
                record,
            }));
        }
        Ok(None)
    }
}
