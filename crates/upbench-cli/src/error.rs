//! CLI error type

use thiserror::Error;
use upbench_client::ClientError;
use upbench_core::BenchError;

/// Result type alias
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that end a run
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Bench(#[from] BenchError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

impl CliError {
    /// Configuration or discovery problems, reported before any upload
    pub fn is_setup_error(&self) -> bool {
        match self {
            Self::Bench(e) => e.is_setup_error(),
            Self::Client(ClientError::Config(_)) => true,
            Self::Client(_) => false,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        if self.is_setup_error() {
            2
        } else {
            1
        }
    }
}
