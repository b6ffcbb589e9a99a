//! Phase timing correlation
//!
//! The transport reports lifecycle events keyed by a per-request trace id.
//! [`PhaseCorrelator`] keeps one [`TraceRecord`] per live trace and turns it
//! into [`TimingPhases`] exactly once, when the owning request collects it.
//!
//! Lifecycle of a trace record:
//!
//! ```text
//! request_created ──► headers_sending ──► body_sent ──► response_headers ──► response_done
//!        │                                                                        │
//!        └──────────── collect_timings (removes) / sweep_stale (purges) ◄─────────┘
//! ```
//!
//! Connection metadata is tracked per origin, last write wins. Pooled
//! connections are reused across requests, so the connect timestamp copied
//! into a record at `headers_sending` is an approximate attribution, not a
//! per-socket fact.

use crate::types::{millis, TimingPhases};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

/// Trace records older than this are purged by [`PhaseCorrelator::sweep_stale`]
pub const STALE_TRACE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Unique token correlating transport events to one upload attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the value of an outbound marker header
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

/// Most recent connection facts for an origin
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConnectionInfo {
    /// When the connection finished establishing
    pub connected_at: Option<Instant>,
    pub remote_address: Option<String>,
    pub alpn_protocol: Option<String>,
    pub tls_protocol: Option<String>,
    pub tls_cipher: Option<String>,
}

impl ConnectionInfo {
    /// Overlay the fields `other` knows about
    fn merge(&mut self, other: ConnectionInfo) {
        if other.connected_at.is_some() {
            self.connected_at = other.connected_at;
        }
        if other.remote_address.is_some() {
            self.remote_address = other.remote_address;
        }
        if other.alpn_protocol.is_some() {
            self.alpn_protocol = other.alpn_protocol;
        }
        if other.tls_protocol.is_some() {
            self.tls_protocol = other.tls_protocol;
        }
        if other.tls_cipher.is_some() {
            self.tls_cipher = other.tls_cipher;
        }
    }
}

/// Lifecycle signals emitted by a transport
///
/// Timestamps are passed in so that a transport stamps the instant it
/// observed the event, not the instant the listener got around to it.
pub trait TransportListener: Send + Sync {
    /// A new connection to `origin` finished establishing
    fn connection_established(&self, origin: &str, info: ConnectionInfo);

    /// The request for `trace` was created
    fn request_created(&self, trace: TraceId, at: Instant);

    /// Request headers for `trace` are about to go out on `origin`
    fn headers_sending(&self, trace: TraceId, origin: &str, at: Instant);

    /// The last request body byte was handed to the transport
    fn body_sent(&self, trace: TraceId, at: Instant);

    /// Response headers arrived; `peer` carries what the response revealed
    /// about the connection it came over
    fn response_headers(&self, trace: TraceId, origin: &str, peer: ConnectionInfo, at: Instant);

    /// The response body was fully received
    fn response_done(&self, trace: TraceId, at: Instant);
}

/// Ephemeral per-request timestamps
#[derive(Clone, Debug)]
struct TraceRecord {
    created_at: Instant,
    send_headers_at: Option<Instant>,
    body_sent_at: Option<Instant>,
    headers_at: Option<Instant>,
    done_at: Option<Instant>,
    connection: ConnectionInfo,
}

impl TraceRecord {
    fn new(created_at: Instant) -> Self {
        Self {
            created_at,
            send_headers_at: None,
            body_sent_at: None,
            headers_at: None,
            done_at: None,
            connection: ConnectionInfo::default(),
        }
    }

    fn phases(&self) -> TimingPhases {
        TimingPhases {
            queue_ms: span_ms(Some(self.created_at), self.send_headers_at),
            upload_ms: span_ms(self.send_headers_at, self.body_sent_at),
            ttfb_ms: span_ms(self.body_sent_at, self.headers_at),
            download_ms: span_ms(self.headers_at, self.done_at),
            connect_ms: span_ms(self.connection.connected_at, self.send_headers_at),
            remote_address: self.connection.remote_address.clone(),
            alpn_protocol: self.connection.alpn_protocol.clone(),
            tls_protocol: self.connection.tls_protocol.clone(),
            tls_cipher: self.connection.tls_cipher.clone(),
        }
    }
}

fn span_ms(from: Option<Instant>, to: Option<Instant>) -> Option<f64> {
    Some(millis(to?.saturating_duration_since(from?)))
}

/// Keyed store of in-flight trace records plus per-origin connection facts
///
/// One instance is shared (behind an `Arc`) by the transport, which reports
/// events and collects timings, and the orchestrator, which sweeps.
pub struct PhaseCorrelator {
    /// Live traces (trace id -> record)
    traces: DashMap<TraceId, TraceRecord>,
    /// Last connection seen per origin
    connections: DashMap<String, ConnectionInfo>,
    /// Staleness threshold for sweeps
    stale_after: Duration,
}

impl PhaseCorrelator {
    pub fn new() -> Self {
        Self::with_stale_after(STALE_TRACE_AFTER)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            traces: DashMap::new(),
            connections: DashMap::new(),
            stale_after,
        }
    }

    /// Generate a fresh trace id
    pub fn begin_trace(&self) -> TraceId {
        TraceId::new()
    }

    /// Derive phases for `trace` and forget it
    ///
    /// Returns `None` for unknown, already collected, or swept traces.
    pub fn collect_timings(&self, trace: TraceId) -> Option<TimingPhases> {
        self.traces.remove(&trace).map(|(_, record)| record.phases())
    }

    /// Purge records created more than the staleness threshold before now
    pub fn sweep_stale(&self) -> usize {
        self.sweep_stale_at(Instant::now())
    }

    /// Purge records created more than the staleness threshold before `now`
    pub fn sweep_stale_at(&self, now: Instant) -> usize {
        let before = self.traces.len();
        self.traces
            .retain(|_, record| now.saturating_duration_since(record.created_at) <= self.stale_after);
        let purged = before.saturating_sub(self.traces.len());
        if purged > 0 {
            debug!(purged, "Swept stale trace records");
        }
        purged
    }

    /// Number of traces not yet collected or swept
    pub fn live_traces(&self) -> usize {
        self.traces.len()
    }

    /// Last connection facts recorded for `origin`
    pub fn connection_for(&self, origin: &str) -> Option<ConnectionInfo> {
        self.connections.get(origin).map(|r| r.clone())
    }

    fn stamp(&self, trace: TraceId, apply: impl FnOnce(&mut TraceRecord)) {
        match self.traces.get_mut(&trace) {
            Some(mut record) => apply(&mut record),
            None => trace!(%trace, "Event for unknown trace ignored"),
        }
    }
}

impl Default for PhaseCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportListener for PhaseCorrelator {
    fn connection_established(&self, origin: &str, info: ConnectionInfo) {
        // A new connection supersedes everything known about the previous one.
        self.connections.insert(origin.to_string(), info);
    }

    fn request_created(&self, trace: TraceId, at: Instant) {
        self.traces.insert(trace, TraceRecord::new(at));
    }

    fn headers_sending(&self, trace: TraceId, origin: &str, at: Instant) {
        let snapshot = self.connection_for(origin).unwrap_or_default();
        self.stamp(trace, |record| {
            record.send_headers_at = Some(at);
            record.connection = snapshot;
        });
    }

    fn body_sent(&self, trace: TraceId, at: Instant) {
        self.stamp(trace, |record| record.body_sent_at = Some(at));
    }

    fn response_headers(&self, trace: TraceId, origin: &str, peer: ConnectionInfo, at: Instant) {
        self.connections
            .entry(origin.to_string())
            .or_default()
            .merge(peer.clone());
        self.stamp(trace, |record| {
            record.headers_at = Some(at);
            record.connection.merge(peer);
        });
    }

    fn response_done(&self, trace: TraceId, at: Instant) {
        self.stamp(trace, |record| record.done_at = Some(at));
    }
}
