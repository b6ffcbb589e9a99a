//! Common types shared by the engine and the transport

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A file selected for upload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAsset {
    /// File name (used as the per-file statistics key)
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

impl FileAsset {
    /// Create a new asset
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size,
        }
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }
}

/// Phase decomposition of one request
///
/// Every phase is `None` when one of its endpoint timestamps was never
/// observed; `None` means unknown, not zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingPhases {
    pub queue_ms: Option<f64>,
    pub upload_ms: Option<f64>,
    pub ttfb_ms: Option<f64>,
    pub download_ms: Option<f64>,
    pub connect_ms: Option<f64>,
    pub remote_address: Option<String>,
    pub alpn_protocol: Option<String>,
    pub tls_protocol: Option<String>,
    pub tls_cipher: Option<String>,
}

/// Response body as seen by the benchmark
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Well-formed JSON
    Json(serde_json::Value),
    /// The body did not parse; kept as data, never propagated
    ParseError { error: String, raw: String },
}

impl ResponseBody {
    const RAW_SNIPPET_LEN: usize = 512;

    /// Parse a raw response body, capturing failures as a value
    pub fn parse(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(e) => {
                let raw = String::from_utf8_lossy(bytes);
                let raw: String = raw.chars().take(Self::RAW_SNIPPET_LEN).collect();
                Self::ParseError {
                    error: e.to_string(),
                    raw,
                }
            }
        }
    }

    /// Look up a string field of a JSON object body
    pub fn str_field(&self, field: &str) -> Option<&str> {
        match self {
            Self::Json(value) => value.get(field).and_then(|v| v.as_str()),
            Self::ParseError { .. } => None,
        }
    }
}

/// Result of one upload attempt that reached an HTTP response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// 2xx status
    pub ok: bool,
    pub http_status: u16,
    /// Wall-clock duration, measured independently of phase correlation
    pub duration_ms: f64,
    /// Value of the request-id diagnostic header
    pub request_id: Option<String>,
    /// Value of the error-detail diagnostic header
    pub error_header: Option<String>,
    pub timings: Option<TimingPhases>,
    pub body: ResponseBody,
}

/// Broad class of a transport exception
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    Cancelled,
    Connect,
    Dns,
    Request,
    Body,
    Io,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Connect => "connect",
            Self::Dns => "dns",
            Self::Request => "request",
            Self::Body => "body",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A network-level failure with whatever root-cause detail the transport
/// exposed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// Symbolic error code, e.g. `ECONNREFUSED`
    pub code: Option<String>,
    pub errno: Option<i32>,
    pub syscall: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    /// Innermost cause in the error chain
    pub cause: Option<String>,
}

impl TransportError {
    /// Create a new error with no detail fields
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            errno: None,
            syscall: None,
            address: None,
            port: None,
            cause: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_endpoint(mut self, address: Option<String>, port: Option<u16>) -> Self {
        self.address = address;
        self.port = port;
        self
    }
}

/// What happened to one attempt, as forwarded to the aggregator and logger
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    /// An HTTP response arrived (any status)
    Completed(UploadResult),
    /// The attempt raised before a response was available
    Failed {
        error: TransportError,
        duration_ms: Option<f64>,
    },
}

impl AttemptOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Completed(result) if result.ok)
    }

    pub fn duration_ms(&self) -> Option<f64> {
        match self {
            Self::Completed(result) => Some(result.duration_ms),
            Self::Failed { duration_ms, .. } => *duration_ms,
        }
    }

    pub fn timings(&self) -> Option<&TimingPhases> {
        match self {
            Self::Completed(result) => result.timings.as_ref(),
            Self::Failed { .. } => None,
        }
    }
}

/// Milliseconds as a float, the unit used throughout the reports
pub fn millis(duration: std::time::Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
