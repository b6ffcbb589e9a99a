//! Run configuration

use crate::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of resource the endpoint should store the upload as
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Video,
    Raw,
    #[default]
    Auto,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Raw => "raw",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "raw" => Ok(Self::Raw),
            "auto" => Ok(Self::Auto),
            other => Err(BenchError::Config(format!(
                "unknown resource type '{}', expected image|video|raw|auto",
                other
            ))),
        }
    }
}

/// Where uploads go
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationConfig {
    /// API base URL, without trailing slash
    pub api_base: String,
    /// Cloud (account) name
    pub cloud_name: String,
    /// Unsigned upload preset
    pub upload_preset: String,
    /// Destination folder
    pub folder: String,
    pub resource_type: ResourceType,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloudinary.com".to_string(),
            cloud_name: String::new(),
            upload_preset: String::new(),
            folder: "upbench".to_string(),
            resource_type: ResourceType::Auto,
        }
    }
}

impl DestinationConfig {
    /// Full upload URL: `{api_base}/v1_1/{cloud}/{resource_type}/upload`
    pub fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.api_base.trim_end_matches('/'),
            self.cloud_name,
            self.resource_type
        )
    }
}

/// Everything the orchestrator needs to drive a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub destination: DestinationConfig,
    /// Number of sequential batches
    pub batches: u32,
    /// Pause between batches (milliseconds)
    pub delay_ms: u64,
    /// Maximum uploads in flight per batch (0 = unbounded)
    pub concurrency: usize,
    /// Reuse pooled connections across requests
    pub keep_alive: bool,
    /// Per-request timeout (milliseconds, 0 = none)
    pub timeout_ms: u64,
    /// Plan only, never touch the network
    pub dry_run: bool,
    /// Number of file assets a run requires
    pub file_count: usize,
    /// Seed for batch permutations
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            destination: DestinationConfig::default(),
            batches: 3,
            delay_ms: 1000,
            concurrency: 5,
            keep_alive: true,
            timeout_ms: 60_000,
            dry_run: false,
            file_count: 5,
            seed: None,
        }
    }
}

impl RunConfig {
    /// Check required parameters before any network activity
    pub fn validate(&self) -> Result<()> {
        let dest = &self.destination;
        if dest.cloud_name.trim().is_empty() {
            return Err(BenchError::Config("cloud name is required".into()));
        }
        if dest.upload_preset.trim().is_empty() {
            return Err(BenchError::Config("upload preset is required".into()));
        }
        if dest.folder.trim().is_empty() {
            return Err(BenchError::Config("destination folder is required".into()));
        }
        if dest.api_base.trim().is_empty() {
            return Err(BenchError::Config("API base URL is required".into()));
        }
        if self.batches == 0 {
            return Err(BenchError::Config("batches must be at least 1".into()));
        }
        if self.file_count == 0 {
            return Err(BenchError::Config("file count must be at least 1".into()));
        }
        Ok(())
    }

    /// Inter-batch delay
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
