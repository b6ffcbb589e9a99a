//! Instrumented upload client

use crate::config::Config;
use crate::connect::ConnectTimingLayer;
use crate::error::{ClientError, Result};
use crate::multipart::{build_form, InstrumentedBody};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, Url, Version};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use upbench_core::{
    millis, Attempt, ConnectionInfo, DestinationConfig, FileAsset, PhaseCorrelator, ResponseBody,
    TraceId, TransportError, TransportErrorKind, TransportListener, UploadResult, Uploader,
};

/// Sends one multipart upload per call and reports its lifecycle to a
/// [`PhaseCorrelator`]
pub struct UploadClient {
    http: Client,
    config: Config,
    destination: DestinationConfig,
    url: Url,
    origin: Arc<str>,
    correlator: Arc<PhaseCorrelator>,
}

impl UploadClient {
    /// Create a client for one destination
    pub fn new(
        destination: DestinationConfig,
        config: Config,
        correlator: Arc<PhaseCorrelator>,
    ) -> Result<Self> {
        let url = Url::parse(&destination.upload_url())
            .map_err(|e| ClientError::Config(format!("invalid upload URL: {}", e)))?;
        if url.host_str().is_none() {
            return Err(ClientError::Config(format!("upload URL has no host: {}", url)));
        }
        let origin: Arc<str> = Arc::from(url.origin().ascii_serialization());

        let listener: Arc<dyn TransportListener> = correlator.clone();
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .connector_layer(ConnectTimingLayer::new(Arc::clone(&origin), listener));

        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if !config.keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }

        let http = builder.build()?;

        Ok(Self {
            http,
            config,
            destination,
            url,
            origin,
            correlator,
        })
    }

    /// The upload endpoint
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Correlator receiving this client's events
    pub fn correlator(&self) -> &Arc<PhaseCorrelator> {
        &self.correlator
    }

    /// Upload one asset, honouring the configured deadline and an optional
    /// external cancellation signal
    ///
    /// Non-2xx responses are results, not errors. Whatever the outcome, the
    /// trace is collected so no record outlives the call.
    #[instrument(skip(self, asset, attempt, cancel), fields(file = %asset.name, batch = attempt.batch))]
    pub async fn upload_with_cancel(
        &self,
        asset: &FileAsset,
        attempt: &Attempt,
        cancel: Option<&CancellationToken>,
    ) -> std::result::Result<UploadResult, TransportError> {
        let trace = self.correlator.begin_trace();
        let timeout_ms = self.config.timeout_ms;

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            if timeout_ms > 0 {
                tokio::time::sleep(Duration::from_millis(timeout_ms)).await
            } else {
                std::future::pending().await
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancelled => Err(self.aborted(TransportErrorKind::Cancelled, "upload cancelled".to_string())),
            _ = deadline => Err(self
                .aborted(TransportErrorKind::Timeout, format!("upload timed out after {}ms", timeout_ms))
                .with_code("ETIMEDOUT")),
            result = self.exchange(asset, attempt, trace) => result.map_err(|e| e.into_transport(&self.url)),
        };

        let timings = self.correlator.collect_timings(trace);
        match outcome {
            Ok(mut result) => {
                result.timings = timings;
                debug!(status = result.http_status, duration_ms = result.duration_ms, "Upload finished");
                Ok(result)
            }
            Err(e) => {
                debug!(error = %e, "Upload failed");
                Err(e)
            }
        }
    }

    /// Read the file, send the form and drain the response
    async fn exchange(
        &self,
        asset: &FileAsset,
        attempt: &Attempt,
        trace: TraceId,
    ) -> Result<UploadResult> {
        let data = tokio::fs::read(&asset.path)
            .await
            .map_err(|source| ClientError::Io {
                path: asset.path.clone(),
                source,
            })?;

        let listener: Arc<dyn TransportListener> = self.correlator.clone();
        self.correlator.request_created(trace, Instant::now());
        let started = Instant::now();

        let body = InstrumentedBody::new(
            Bytes::from(data),
            self.config.chunk_size,
            trace,
            Arc::clone(&self.origin),
            listener,
        );
        let form = build_form(&self.destination, asset, &attempt.public_id, body)?;

        let response = self
            .http
            .post(self.url.clone())
            .header(self.config.trace_header.as_str(), trace.to_string())
            .multipart(form)
            .send()
            .await?;

        let peer = ConnectionInfo {
            remote_address: response.remote_addr().map(|addr| addr.ip().to_string()),
            alpn_protocol: Some(alpn_protocol(response.version()).to_string()),
            ..Default::default()
        };
        self.correlator
            .response_headers(trace, &self.origin, peer, Instant::now());

        let status = response.status();
        let request_id = header_text(response.headers(), &self.config.request_id_header);
        let error_header = header_text(response.headers(), &self.config.error_header);

        let bytes = response.bytes().await?;
        self.correlator.response_done(trace, Instant::now());

        Ok(UploadResult {
            ok: status.is_success(),
            http_status: status.as_u16(),
            duration_ms: millis(started.elapsed()),
            request_id,
            error_header,
            timings: None,
            body: ResponseBody::parse(&bytes),
        })
    }

    fn aborted(&self, kind: TransportErrorKind, message: String) -> TransportError {
        TransportError::new(kind, message)
            .with_endpoint(self.url.host_str().map(str::to_string), self.url.port_or_known_default())
    }
}

#[async_trait]
impl Uploader for UploadClient {
    async fn upload(
        &self,
        asset: &FileAsset,
        attempt: &Attempt,
    ) -> std::result::Result<UploadResult, TransportError> {
        self.upload_with_cancel(asset, attempt, None).await
    }
}

fn alpn_protocol(version: Version) -> &'static str {
    if version == Version::HTTP_2 {
        "h2"
    } else if version == Version::HTTP_3 {
        "h3"
    } else if version == Version::HTTP_10 {
        "http/1.0"
    } else {
        "http/1.1"
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpn_names() {
        assert_eq!(alpn_protocol(Version::HTTP_2), "h2");
        assert_eq!(alpn_protocol(Version::HTTP_11), "http/1.1");
    }

    #[test]
    fn test_origin_and_upload_path() {
        let destination = DestinationConfig {
            cloud_name: "demo".into(),
            upload_preset: "unsigned".into(),
            ..Default::default()
        };
        let client =
            UploadClient::new(destination, Config::default(), Arc::new(PhaseCorrelator::new()))
                .unwrap();
        assert_eq!(&*client.origin, "https://api.cloudinary.com");
        assert_eq!(client.url().path(), "/v1_1/demo/auto/upload");
    }
}
