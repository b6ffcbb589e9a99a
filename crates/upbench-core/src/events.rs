//! Structured event records
//!
//! Every record is one line of the per-run event log. Records are built by
//! the orchestrator and handed to an [`EventSink`]; writing them anywhere is
//! the sink's business.

use crate::config::RunConfig;
use crate::types::{AttemptOutcome, FileAsset, ResponseBody, TimingPhases, TransportError};
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A timestamped, run-scoped event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub run_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl LogEvent {
    pub fn new(run_id: &str, kind: EventKind) -> Self {
        Self {
            ts: Utc::now(),
            run_id: run_id.to_string(),
            kind,
        }
    }
}

/// Event payloads, tagged by `"event"`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    #[serde(rename_all = "camelCase")]
    RunStart {
        config: RunConfig,
        files: Vec<FileAsset>,
    },
    Upload(UploadEvent),
    #[serde(rename_all = "camelCase")]
    Planned {
        batch: u32,
        index: usize,
        file: String,
        size: u64,
        public_id: String,
        duration_ms: f64,
    },
    #[serde(rename_all = "camelCase")]
    BatchEnd {
        batch: u32,
        ok: u64,
        fail: u64,
        elapsed_ms: f64,
    },
    #[serde(rename_all = "camelCase")]
    RunEnd {
        total_ok: u64,
        total_tried: u64,
        elapsed_ms: f64,
    },
}

/// How an upload attempt ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Ok,
    HttpError,
    Exception,
}

/// Per-attempt record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub batch: u32,
    pub index: usize,
    pub file: String,
    pub size: u64,
    pub public_id: String,
    pub status: UploadStatus,
    pub ok: bool,
    pub http_status: Option<u16>,
    pub duration_ms: Option<f64>,
    pub throughput_mbps: Option<f64>,
    pub request_id: Option<String>,
    pub error_header: Option<String>,
    pub timings: Option<TimingPhases>,
    /// Peer address, copied out of `timings` for grepping
    pub remote_address: Option<String>,
    pub alpn: Option<String>,
    pub body: Option<ResponseBody>,
    /// Why the response body did not parse, when it did not
    pub body_parse_error: Option<String>,
    pub error: Option<TransportError>,
}

impl UploadEvent {
    pub fn from_outcome(
        batch: u32,
        index: usize,
        asset: &FileAsset,
        public_id: &str,
        outcome: &AttemptOutcome,
    ) -> Self {
        let base = Self {
            batch,
            index,
            file: asset.name.clone(),
            size: asset.size,
            public_id: public_id.to_string(),
            status: UploadStatus::Exception,
            ok: false,
            http_status: None,
            duration_ms: outcome.duration_ms(),
            throughput_mbps: None,
            request_id: None,
            error_header: None,
            timings: None,
            remote_address: None,
            alpn: None,
            body: None,
            body_parse_error: None,
            error: None,
        };

        match outcome {
            AttemptOutcome::Completed(result) => Self {
                status: if result.ok {
                    UploadStatus::Ok
                } else {
                    UploadStatus::HttpError
                },
                ok: result.ok,
                http_status: Some(result.http_status),
                throughput_mbps: if result.ok {
                    throughput_mbps(asset.size, result.duration_ms)
                } else {
                    None
                },
                request_id: result.request_id.clone(),
                error_header: result.error_header.clone(),
                timings: result.timings.clone(),
                remote_address: result
                    .timings
                    .as_ref()
                    .and_then(|t| t.remote_address.clone()),
                alpn: result.timings.as_ref().and_then(|t| t.alpn_protocol.clone()),
                body: Some(result.body.clone()),
                body_parse_error: match &result.body {
                    ResponseBody::ParseError { error, .. } => Some(error.clone()),
                    ResponseBody::Json(_) => None,
                },
                ..base
            },
            AttemptOutcome::Failed { error, .. } => Self {
                error: Some(error.clone()),
                ..base
            },
        }
    }
}

/// Megabytes (2^20 bytes) per second, `None` for a zero duration
pub fn throughput_mbps(size: u64, duration_ms: f64) -> Option<f64> {
    if !(duration_ms.is_finite() && duration_ms > 0.0) {
        return None;
    }
    Some(size as f64 / 1_048_576.0 / (duration_ms / 1000.0))
}

/// Generate a run id: UTC timestamp plus a short random suffix
pub fn new_run_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..0x100_0000);
    format!("{}-{:06x}", Utc::now().format("%Y%m%dT%H%M%SZ"), suffix)
}

/// Per-attempt unique public identifier
pub fn public_id(asset: &FileAsset, batch: u32, run_id: &str) -> String {
    let raw = format!("{}_b{}_{}", asset.stem(), batch, run_id);
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Receives event records
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LogEvent) -> Result<()>;
}

/// Keeps every event in memory
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &LogEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Forwards every event to each inner sink in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: &LogEvent) -> Result<()> {
        for sink in &self.sinks {
            sink.emit(event)?;
        }
        Ok(())
    }
}
