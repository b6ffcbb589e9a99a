//! Persisted run artifacts

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use upbench_core::{EventSink, LogEvent, Result, RunSummary};

/// `{out_dir}/{run_id}.events.jsonl`
pub fn events_path(out_dir: &Path, run_id: &str) -> PathBuf {
    out_dir.join(format!("{}.events.jsonl", run_id))
}

/// `{out_dir}/{run_id}.summary.json`
pub fn summary_path(out_dir: &Path, run_id: &str) -> PathBuf {
    out_dir.join(format!("{}.summary.json", run_id))
}

/// Newline-delimited JSON event log, flushed after every record
pub struct JsonlSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Create (or truncate) the log at `path`
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &LogEvent) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Write the run summary as pretty JSON
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json)?;
    Ok(())
}
