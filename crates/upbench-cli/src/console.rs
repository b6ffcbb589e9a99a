//! Human-readable run narration

use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::PathBuf;
use upbench_core::{EventKind, EventSink, LogEvent, ResponseBody, Result, UploadEvent, UploadStatus};

/// Prints one line per event worth narrating
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
    events_path: Option<PathBuf>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            events_path: None,
        }
    }

    /// Event log location mentioned in the failure note
    pub fn with_events_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.events_path = Some(path.into());
        self
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn render(&self, event: &LogEvent) -> Vec<String> {
        match &event.kind {
            EventKind::RunStart { config, files } => vec![format!(
                "Run {}: {} file(s) x {} batch(es), concurrency {}{}",
                event.run_id,
                files.len(),
                config.batches,
                if config.concurrency == 0 {
                    "unbounded".to_string()
                } else {
                    config.concurrency.to_string()
                },
                if config.dry_run { " (dry run)" } else { "" }
            )],
            EventKind::Upload(upload) => vec![upload_line(upload)],
            EventKind::Planned {
                batch,
                file,
                size,
                public_id,
                ..
            } => vec![format!(
                "· [b{}] {} ({}) -> {}",
                batch,
                file,
                human_size(*size),
                public_id
            )],
            EventKind::BatchEnd {
                batch,
                ok,
                fail,
                elapsed_ms,
            } => vec![format!(
                "Batch {}: {} ok, {} failed in {:.0}ms",
                batch, ok, fail, elapsed_ms
            )],
            EventKind::RunEnd {
                total_ok,
                total_tried,
                elapsed_ms,
            } => {
                let mut lines = vec![format!(
                    "Done: {}/{} uploads ok in {:.1}s",
                    total_ok,
                    total_tried,
                    elapsed_ms / 1000.0
                )];
                if total_ok < total_tried {
                    lines.push(match &self.events_path {
                        Some(path) => format!(
                            "{} upload(s) failed; see {} for details",
                            total_tried - total_ok,
                            path.display()
                        ),
                        None => format!("{} upload(s) failed", total_tried - total_ok),
                    });
                }
                lines
            }
        }
    }
}

impl<W: Write + Send> EventSink for ConsoleSink<W> {
    fn emit(&self, event: &LogEvent) -> Result<()> {
        let lines = self.render(event);
        let mut out = self.out.lock();
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn upload_line(upload: &UploadEvent) -> String {
    match upload.status {
        UploadStatus::Ok => {
            let throughput = upload
                .throughput_mbps
                .map(|t| format!("{:.2} MB/s", t))
                .unwrap_or_else(|| "- MB/s".to_string());
            format!(
                "✓ [b{}] {} ({}) {} {:.0}ms {}",
                upload.batch,
                upload.file,
                human_size(upload.size),
                upload.http_status.unwrap_or_default(),
                upload.duration_ms.unwrap_or_default(),
                throughput
            )
        }
        UploadStatus::HttpError => {
            let detail = upload
                .error_header
                .clone()
                .or_else(|| upload.body.as_ref().and_then(error_message))
                .unwrap_or_default();
            format!(
                "✗ [b{}] {} HTTP {} {}",
                upload.batch,
                upload.file,
                upload.http_status.unwrap_or_default(),
                detail
            )
            .trim_end()
            .to_string()
        }
        UploadStatus::Exception => match &upload.error {
            Some(error) => format!(
                "✗ [b{}] {} {}: {} ({})",
                upload.batch,
                upload.file,
                error.kind,
                error.message,
                error.code.as_deref().unwrap_or("no code")
            ),
            None => format!("✗ [b{}] {} failed", upload.batch, upload.file),
        },
    }
}

fn error_message(body: &ResponseBody) -> Option<String> {
    match body {
        ResponseBody::Json(value) => value
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        ResponseBody::ParseError { .. } => None,
    }
}

fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}
