//! # Upbench CLI
//!
//! Everything between the command line and the engine:
//! - **Discovery**: picks the asset set from a directory
//! - **Output**: newline-delimited JSON event log and the run summary
//! - **Console**: human-readable narration of the same events
//! - **Runner**: wires discovery, client, orchestrator and sinks together

pub mod config;
pub mod console;
pub mod discovery;
pub mod error;
pub mod output;
pub mod runner;

pub use config::RunOptions;
pub use error::{CliError, Result};
pub use runner::{run, RunArtifacts};
