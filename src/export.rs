//! JSON Lines export of agent history, one step per line, for replay and
//! script generation tooling.

use std::fs::{create_dir_all, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use agent_core::{AgentHistory, AgentHistoryEntry};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize step {step}: {source}")]
    Serialize {
        step: u32,
        #[source]
        source: serde_json::Error,
    },

    #[error("step {step} is {bytes} bytes, over the {limit} byte line limit")]
    Oversize { step: u32, bytes: usize, limit: usize },

    #[error("line {line} is not a history entry: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub max_line_bytes: usize,
    /// Keep the per-step observation; without it lines carry only what was
    /// requested and what happened.
    pub include_observations: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_line_bytes: 8 * 1024 * 1024,
            include_observations: true,
        }
    }
}

pub fn serialize_lines(
    history: &AgentHistory,
    options: &ExportOptions,
) -> Result<Vec<String>, ExportError> {
    let mut serialized = Vec::with_capacity(history.len());
    for entry in history {
        let json = if options.include_observations {
            serde_json::to_string(entry)
        } else {
            serde_json::to_string(&AgentHistoryEntry {
                observation: None,
                ..entry.clone()
            })
        }
        .map_err(|source| ExportError::Serialize {
            step: entry.step,
            source,
        })?;
        if json.len() > options.max_line_bytes {
            return Err(ExportError::Oversize {
                step: entry.step,
                bytes: json.len(),
                limit: options.max_line_bytes,
            });
        }
        serialized.push(json);
    }
    Ok(serialized)
}

pub fn write_lines(path: &Path, lines: &[String]) -> Result<PathBuf, ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}

/// Serialize `history` and write it to `path`, creating parent directories.
pub fn export_history(
    history: &AgentHistory,
    path: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<PathBuf, ExportError> {
    let lines = serialize_lines(history, options)?;
    let written = write_lines(path.as_ref(), &lines)?;
    info!(path = %written.display(), steps = lines.len(), "history exported");
    Ok(written)
}

/// Read an exported file back, skipping blank lines.
pub fn read_history(path: impl AsRef<Path>) -> Result<Vec<AgentHistoryEntry>, ExportError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|source| ExportError::Parse {
            line: number + 1,
            source,
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
