//! Audit sinks: where records go.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::record::AuditRecord;

/// Append-only destination for audit records.
///
/// Called synchronously, including from `Drop`, so implementations block the
/// calling worker thread for the duration of one line-sized write.
pub trait AuditSink: Send + Sync {
    fn write(&self, record: &AuditRecord) -> Result<()>;
}

/// Writes one JSON object per line to stdout.
pub struct StdoutSink;

impl AuditSink for StdoutSink {
    fn write(&self, record: &AuditRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("Failed to serialize audit record")?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line).context("Failed to write audit record to stdout")
    }
}

/// Appends one JSON object per line to a file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    /// Open (or create) the audit log for appending.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log: {:?}", path))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileSink {
    fn write(&self, record: &AuditRecord) -> Result<()> {
        let mut line =
            serde_json::to_vec(record).context("Failed to serialize audit record")?;
        line.push(b'\n');

        // One write per record so lines from concurrent exchanges never interleave.
        // Blocking, but short: the lock is held for a single append.
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("Audit log lock poisoned"))?;
        file.write_all(&line)
            .with_context(|| format!("Failed to append to audit log: {:?}", self.path))
    }
}
