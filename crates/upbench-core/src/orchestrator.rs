//! Batch orchestration
//!
//! ```text
//! Idle ──► Running(1) ──► Draining ──► Running(2) ──► ... ──► Running(B) ──► Completed
//! ```
//!
//! Batch N+1 never starts before batch N's pool has settled and the
//! inter-batch delay has elapsed.

use crate::config::RunConfig;
use crate::correlator::PhaseCorrelator;
use crate::events::{public_id, EventKind, EventSink, LogEvent, UploadEvent};
use crate::pool::{run_bounded, PoolError};
use crate::stats::{RunSummary, StatsAggregator};
use crate::types::{millis, AttemptOutcome, FileAsset, TransportError, TransportErrorKind, UploadResult};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Identity of one upload attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub run_id: String,
    pub batch: u32,
    /// Position within the (shuffled) batch
    pub index: usize,
    pub public_id: String,
}

/// Something that can upload one file
///
/// Implementations must not panic on network failures; they return a
/// structured [`TransportError`] instead.
#[async_trait]
pub trait Uploader: Send + Sync + 'static {
    async fn upload(
        &self,
        asset: &FileAsset,
        attempt: &Attempt,
    ) -> std::result::Result<UploadResult, TransportError>;
}

/// Where the orchestrator is in its run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { batch: u32 },
    Draining { after_batch: u32 },
    Completed,
}

/// What a finished run hands back
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub total_ok: u64,
    pub total_tried: u64,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn failed(&self) -> u64 {
        self.total_tried - self.total_ok
    }
}

/// A transport exception with the time spent before it surfaced
struct AttemptFailure {
    error: TransportError,
    duration_ms: f64,
}

/// Drives B sequential batches of bounded-parallel uploads
pub struct Orchestrator<U> {
    config: RunConfig,
    run_id: String,
    uploader: Arc<U>,
    correlator: Arc<PhaseCorrelator>,
    sink: Arc<dyn EventSink>,
    stats: StatsAggregator,
    rng: StdRng,
    state: RunState,
}

impl<U: Uploader> Orchestrator<U> {
    pub fn new(
        config: RunConfig,
        run_id: impl Into<String>,
        uploader: Arc<U>,
        correlator: Arc<PhaseCorrelator>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            run_id: run_id.into(),
            uploader,
            correlator,
            sink,
            stats: StatsAggregator::new(),
            rng,
            state: RunState::Idle,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    fn set_state(&mut self, state: RunState) {
        debug!(from = ?self.state, to = ?state, "Orchestrator state change");
        self.state = state;
    }

    fn emit(&self, kind: EventKind) -> Result<()> {
        self.sink.emit(&LogEvent::new(&self.run_id, kind))
    }

    /// Run every batch over `assets` and build the run summary
    #[instrument(skip(self, assets), fields(run_id = %self.run_id, files = assets.len()))]
    pub async fn run(&mut self, assets: &[FileAsset]) -> Result<RunReport> {
        self.config.validate()?;
        let started_at = Utc::now();
        let run_start = Instant::now();

        self.emit(EventKind::RunStart {
            config: self.config.clone(),
            files: assets.to_vec(),
        })?;
        info!(
            batches = self.config.batches,
            concurrency = self.config.concurrency,
            dry_run = self.config.dry_run,
            "Run started"
        );

        let mut total_ok = 0u64;
        let mut total_tried = 0u64;

        for batch in 1..=self.config.batches {
            self.set_state(RunState::Running { batch });
            let (ok, fail) = if self.config.dry_run {
                self.plan_batch(batch, assets)?
            } else {
                self.run_batch(batch, assets).await?
            };
            total_ok += ok;
            total_tried += ok + fail;

            if batch < self.config.batches && self.config.delay_ms > 0 {
                self.set_state(RunState::Draining { after_batch: batch });
                debug!(delay_ms = self.config.delay_ms, "Waiting before next batch");
                tokio::time::sleep(self.config.delay()).await;
            }
        }

        self.emit(EventKind::RunEnd {
            total_ok,
            total_tried,
            elapsed_ms: millis(run_start.elapsed()),
        })?;
        self.set_state(RunState::Completed);
        info!(total_ok, total_tried, "Run completed");

        let summary = self
            .stats
            .summary(&self.run_id, &self.config, started_at, Utc::now());
        Ok(RunReport {
            run_id: self.run_id.clone(),
            total_ok,
            total_tried,
            summary,
        })
    }

    /// One shuffled batch through the pool; returns `(ok, fail)`
    #[instrument(skip(self, assets), fields(run_id = %self.run_id))]
    async fn run_batch(&mut self, batch: u32, assets: &[FileAsset]) -> Result<(u64, u64)> {
        let batch_start = Instant::now();
        let order = self.permute(assets);

        let attempts: Vec<(FileAsset, Attempt)> = order
            .into_iter()
            .enumerate()
            .map(|(index, asset)| {
                let attempt = Attempt {
                    run_id: self.run_id.clone(),
                    batch,
                    index,
                    public_id: public_id(&asset, batch, &self.run_id),
                };
                (asset, attempt)
            })
            .collect();
        let planned: Vec<(FileAsset, Attempt)> = attempts.clone();

        let uploader = Arc::clone(&self.uploader);
        let outcomes = run_bounded(attempts, self.config.concurrency, move |_, (asset, attempt)| {
            let uploader = Arc::clone(&uploader);
            async move {
                let started = Instant::now();
                uploader
                    .upload(&asset, &attempt)
                    .await
                    .map_err(|error| AttemptFailure {
                        error,
                        duration_ms: millis(started.elapsed()),
                    })
            }
        })
        .await;

        let (mut ok, mut fail) = (0u64, 0u64);
        for ((asset, attempt), outcome) in planned.iter().zip(outcomes) {
            let outcome = match outcome {
                Ok(result) => AttemptOutcome::Completed(result),
                Err(PoolError::Task(failure)) => AttemptOutcome::Failed {
                    error: failure.error,
                    duration_ms: Some(failure.duration_ms),
                },
                Err(other) => AttemptOutcome::Failed {
                    error: TransportError::new(TransportErrorKind::Other, other_message(&other)),
                    duration_ms: None,
                },
            };

            if outcome.is_ok() {
                ok += 1;
            } else {
                fail += 1;
                log_failure(asset, &outcome);
            }

            self.stats.record(&asset.name, asset.size, batch, &outcome);
            self.emit(EventKind::Upload(UploadEvent::from_outcome(
                batch,
                attempt.index,
                asset,
                &attempt.public_id,
                &outcome,
            )))?;
        }

        self.emit(EventKind::BatchEnd {
            batch,
            ok,
            fail,
            elapsed_ms: millis(batch_start.elapsed()),
        })?;
        self.correlator.sweep_stale();
        info!(batch, ok, fail, "Batch finished");
        Ok((ok, fail))
    }

    /// Dry-run batch: one zero-duration planned record per file
    fn plan_batch(&mut self, batch: u32, assets: &[FileAsset]) -> Result<(u64, u64)> {
        let order = self.permute(assets);
        for (index, asset) in order.iter().enumerate() {
            self.emit(EventKind::Planned {
                batch,
                index,
                file: asset.name.clone(),
                size: asset.size,
                public_id: public_id(asset, batch, &self.run_id),
                duration_ms: 0.0,
            })?;
        }
        self.emit(EventKind::BatchEnd {
            batch,
            ok: 0,
            fail: 0,
            elapsed_ms: 0.0,
        })?;
        Ok((0, 0))
    }

    fn permute(&mut self, assets: &[FileAsset]) -> Vec<FileAsset> {
        let mut order = assets.to_vec();
        order.shuffle(&mut self.rng);
        order
    }
}

fn other_message(error: &PoolError<AttemptFailure>) -> String {
    match error {
        PoolError::Task(failure) => failure.error.message.clone(),
        PoolError::Panicked(msg) => format!("upload task panicked: {}", msg),
        PoolError::Closed => "upload task was never dispatched".to_string(),
    }
}

fn log_failure(asset: &FileAsset, outcome: &AttemptOutcome) {
    match outcome {
        AttemptOutcome::Completed(result) => warn!(
            file = %asset.name,
            status = result.http_status,
            error_header = result.error_header.as_deref().unwrap_or(""),
            "Upload rejected"
        ),
        AttemptOutcome::Failed { error, .. } => warn!(
            file = %asset.name,
            kind = %error.kind,
            code = error.code.as_deref().unwrap_or(""),
            "Upload failed: {}",
            error.message
        ),
    }
}
