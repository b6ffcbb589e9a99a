//! upbench - upload benchmarking tool

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upbench_cli::{run, RunOptions};
use upbench_core::{DestinationConfig, ResourceType, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "upbench")]
#[command(about = "Benchmark concurrent multipart uploads against a remote endpoint")]
#[command(version)]
struct Args {
    /// Destination cloud (account) name
    #[arg(long, env = "UPBENCH_CLOUD_NAME")]
    cloud_name: Option<String>,

    /// Unsigned upload preset
    #[arg(long, env = "UPBENCH_UPLOAD_PRESET")]
    upload_preset: Option<String>,

    /// Destination folder
    #[arg(long, default_value = "upbench", env = "UPBENCH_FOLDER")]
    folder: String,

    /// API base URL
    #[arg(long, default_value = "https://api.cloudinary.com", env = "UPBENCH_API_BASE")]
    api_base: String,

    /// Resource type (image, video, raw, auto)
    #[arg(long, default_value = "auto")]
    resource_type: ResourceType,

    /// Number of batches
    #[arg(long, default_value = "3")]
    batches: u32,

    /// Delay between batches (milliseconds)
    #[arg(long, default_value = "1000")]
    delay_ms: u64,

    /// Maximum in-flight uploads per batch (0 = unbounded)
    #[arg(long, default_value = "5")]
    concurrency: usize,

    /// Open a fresh connection for every request
    #[arg(long)]
    no_keep_alive: bool,

    /// Per-request timeout (milliseconds, 0 = none)
    #[arg(long, default_value = "60000")]
    timeout_ms: u64,

    /// Asset directory
    #[arg(long, default_value = "./assets")]
    dir: PathBuf,

    /// Output directory for event logs and summaries
    #[arg(long, default_value = "./runs")]
    out_dir: PathBuf,

    /// Number of assets to upload per batch
    #[arg(long, default_value = "5")]
    files: usize,

    /// Seed for the per-batch shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Plan the run without sending anything
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, env = "UPBENCH_DEBUG")]
    debug: bool,

    /// Emit diagnostics as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn into_options(self) -> RunOptions {
        RunOptions {
            config: RunConfig {
                destination: DestinationConfig {
                    api_base: self.api_base,
                    cloud_name: self.cloud_name.unwrap_or_default(),
                    upload_preset: self.upload_preset.unwrap_or_default(),
                    folder: self.folder,
                    resource_type: self.resource_type,
                },
                batches: self.batches,
                delay_ms: self.delay_ms,
                concurrency: self.concurrency,
                keep_alive: !self.no_keep_alive,
                timeout_ms: self.timeout_ms,
                dry_run: self.dry_run,
                file_count: self.files,
                seed: self.seed,
            },
            asset_dir: self.dir,
            out_dir: self.out_dir,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging; stdout belongs to the run narration
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "upbench={0},upbench_core={0},upbench_client={0},upbench_cli={0}",
            log_level
        )
        .into()
    });
    let json = args.log_json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    let options = args.into_options();
    if options.config.dry_run {
        tracing::warn!("Dry run: nothing will be uploaded");
    }

    match run(&options).await {
        Ok(artifacts) => {
            tracing::info!(
                run_id = %artifacts.report.run_id,
                ok = artifacts.report.total_ok,
                tried = artifacts.report.total_tried,
                "Finished"
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_setup_error() => {
            tracing::error!("{}", e);
            eprintln!("upbench: {}", e);
            Ok(ExitCode::from(e.exit_code()))
        }
        Err(e) => Err(e.into()),
    }
}
