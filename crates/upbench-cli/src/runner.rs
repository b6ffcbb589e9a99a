//! Run wiring

use crate::config::RunOptions;
use crate::console::ConsoleSink;
use crate::discovery;
use crate::output::{self, JsonlSink};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use upbench_client::{Config as ClientConfig, UploadClient};
use upbench_core::{new_run_id, EventSink, FanoutSink, Orchestrator, PhaseCorrelator, RunReport};

/// What a finished run leaves behind
#[derive(Debug)]
pub struct RunArtifacts {
    pub report: RunReport,
    pub events_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Validate, discover, run every batch and persist the summary
///
/// Configuration and discovery problems surface before any request is made.
pub async fn run(options: &RunOptions) -> Result<RunArtifacts> {
    let config = &options.config;
    config.validate()?;

    discovery::prepare_dirs(&options.asset_dir, &options.out_dir)?;
    let assets = discovery::discover(&options.asset_dir, config.file_count)?;

    let correlator = Arc::new(PhaseCorrelator::new());
    let client_config = ClientConfig::default()
        .with_timeout_ms(config.timeout_ms)
        .with_keep_alive(config.keep_alive);
    let client = Arc::new(UploadClient::new(
        config.destination.clone(),
        client_config,
        correlator.clone(),
    )?);

    let run_id = new_run_id();
    let events_path = output::events_path(&options.out_dir, &run_id);
    let summary_path = output::summary_path(&options.out_dir, &run_id);
    info!(run_id = %run_id, url = %client.url(), events = %events_path.display(), "Starting run");

    let sink: Arc<dyn EventSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(JsonlSink::create(&events_path)?))
            .with(Arc::new(
                ConsoleSink::stdout().with_events_path(events_path.clone()),
            )),
    );

    let mut orchestrator = Orchestrator::new(config.clone(), run_id, client, correlator, sink);
    let report = orchestrator.run(&assets).await?;

    output::write_summary(&summary_path, &report.summary)?;
    info!(summary = %summary_path.display(), "Summary written");

    Ok(RunArtifacts {
        report,
        events_path,
        summary_path,
    })
}
