//! # Upbench Client
//!
//! The transport half of `upbench`: one instrumented multipart upload per
//! call, reporting lifecycle events to an [`upbench_core::PhaseCorrelator`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use upbench_client::{Config, UploadClient};
//! use upbench_core::{DestinationConfig, PhaseCorrelator};
//!
//! let correlator = Arc::new(PhaseCorrelator::new());
//! let client = UploadClient::new(destination, Config::default(), correlator)?;
//! let result = client.upload_with_cancel(&asset, &attempt, None).await?;
//! println!("{} in {:.1}ms", result.http_status, result.duration_ms);
//! ```

mod client;
mod config;
mod connect;
mod error;
mod multipart;

pub use client::UploadClient;
pub use config::Config;
pub use connect::{ConnectTiming, ConnectTimingLayer};
pub use error::{ClientError, Result};
