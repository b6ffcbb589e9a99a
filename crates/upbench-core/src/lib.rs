//! # Upbench Core
//!
//! The upload execution and instrumentation engine behind `upbench`.
//!
//! This crate provides:
//! - **Phase Timing Correlator**: maps transport lifecycle events onto
//!   individual upload attempts and derives queue/upload/ttfb/download/connect
//! - **Bounded Concurrency Pool**: at most N tasks in flight, ordered result
//!   slots, per-task failure isolation
//! - **Batch Orchestrator**: shuffled batches, inter-batch delay, dry-run
//! - **Statistics Aggregator**: per-file and global order statistics
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────────┐
//! │ Orchestrator ├──►│    Pool    ├──►│ Uploader (trait) │
//! └──────┬───────┘   └────────────┘   └────────┬─────────┘
//!        │                                     │ transport events
//!        ▼                                     ▼
//! ┌──────────────┐   ┌────────────┐   ┌──────────────────┐
//! │  EventSink   │   │ Aggregator │   │ PhaseCorrelator  │
//! └──────────────┘   └────────────┘   └──────────────────┘
//! ```

pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod pool;
pub mod stats;
pub mod types;

pub use config::{DestinationConfig, ResourceType, RunConfig};
pub use correlator::{ConnectionInfo, PhaseCorrelator, TraceId, TransportListener, STALE_TRACE_AFTER};
pub use error::{BenchError, Result};
pub use events::{
    new_run_id, public_id, throughput_mbps, EventKind, EventSink, FanoutSink, LogEvent, MemorySink,
    UploadEvent, UploadStatus,
};
pub use orchestrator::{Attempt, Orchestrator, RunReport, RunState, Uploader};
pub use pool::{run_bounded, PoolError};
pub use stats::{
    percentile, summarize, ErrorDetail, FileSummary, OverallSummary, RunSummary, SampleSummary,
    StatsAggregator, StatsBucket, Totals,
};
pub use types::*;
