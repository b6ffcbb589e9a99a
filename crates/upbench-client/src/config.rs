//! Client configuration

use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// User agent string
    pub user_agent: String,
    /// Reuse pooled connections across requests
    pub keep_alive: bool,
    /// Per-request deadline in milliseconds (0 disables it)
    pub timeout_ms: u64,
    /// Connection establishment timeout
    pub connect_timeout: Option<Duration>,
    /// Response header carrying the server's request id
    pub request_id_header: String,
    /// Response header carrying error detail
    pub error_header: String,
    /// Outbound marker header carrying the trace id
    pub trace_header: String,
    /// Size of the body chunks handed to the transport (bytes)
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: format!("upbench/{}", env!("CARGO_PKG_VERSION")),
            keep_alive: true,
            timeout_ms: 60_000,
            connect_timeout: Some(Duration::from_secs(10)),
            request_id_header: "x-request-id".to_string(),
            error_header: "x-cld-error".to_string(),
            trace_header: "x-upbench-trace-id".to_string(),
            chunk_size: 64 * 1024, // 64 KiB
        }
    }
}

impl Config {
    /// Set the per-request deadline
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Enable or disable connection reuse
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}
