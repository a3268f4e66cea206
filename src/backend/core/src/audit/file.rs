//! JSON-lines file sink. One entry per line, opened in append mode.
//!
//! The file is replayed into memory when opened; afterwards queries are
//! served from memory and the file is only appended to.

use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{AuditError, AuditFilter, AuditSink, SyncLogEntry};

/// Durable audit sink writing newline-delimited JSON.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    writer: Mutex<File>,
    entries: RwLock<Vec<SyncLogEntry>>,
}

impl JsonLinesAuditSink {
    /// Open (or create) the log file at `path`, creating parent directories,
    /// and load the entries it already holds.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuditError::WriteFailed(format!("{}: {}", parent.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AuditError::WriteFailed(format!("{}: {}", path.display(), e)))?;
        let entries = replay(&path)?;
        debug!(path = %path.display(), entries = entries.len(), "Opened audit file");

        Ok(Self {
            path,
            writer: Mutex::new(file),
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every well-formed entry from `path`, oldest first.
fn replay(path: &Path) -> Result<Vec<SyncLogEntry>, AuditError> {
    let file = File::open(path)
        .map_err(|e| AuditError::QueryFailed(format!("{}: {}", path.display(), e)))?;

    let mut entries = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| AuditError::QueryFailed(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SyncLogEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(
                path = %path.display(),
                line = number + 1,
                error = %e,
                "Skipping malformed audit line"
            ),
        }
    }
    Ok(entries)
}

impl AuditSink for JsonLinesAuditSink {
    fn append(&self, entry: &SyncLogEntry) -> Result<(), AuditError> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        line.push(b'\n');

        // Held across the index update so memory keeps file order.
        let mut file = self.writer.lock();
        file.write_all(&line)
            .and_then(|_| file.flush())
            .map_err(|e| AuditError::WriteFailed(format!("{}: {}", self.path.display(), e)))?;
        self.entries.write().push(entry.clone());
        Ok(())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<SyncLogEntry>, AuditError> {
        Ok(filter.apply(self.entries.read().iter()))
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
