//! Invocation options

use std::path::PathBuf;
use upbench_core::RunConfig;

/// One invocation of the tool
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Engine configuration
    pub config: RunConfig,
    /// Directory the assets are discovered in
    pub asset_dir: PathBuf,
    /// Directory receiving the event log and summary
    pub out_dir: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            config: RunConfig::default(),
            asset_dir: PathBuf::from("./assets"),
            out_dir: PathBuf::from("./runs"),
        }
    }
}
