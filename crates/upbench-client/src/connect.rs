//! Connector-level timing
//!
//! reqwest exposes no per-connection callbacks, so connection establishment
//! is observed by wrapping its connector stack in a tower layer. The
//! connector request type is opaque, which is why the layer is bound to the
//! single origin its client talks to.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use upbench_core::{ConnectionInfo, TransportListener};

/// Layer reporting every freshly established connection to a listener
#[derive(Clone)]
pub struct ConnectTimingLayer {
    origin: Arc<str>,
    listener: Arc<dyn TransportListener>,
}

impl ConnectTimingLayer {
    pub fn new(origin: impl Into<Arc<str>>, listener: Arc<dyn TransportListener>) -> Self {
        Self {
            origin: origin.into(),
            listener,
        }
    }
}

impl<S> Layer<S> for ConnectTimingLayer {
    type Service = ConnectTiming<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ConnectTiming {
            inner,
            origin: Arc::clone(&self.origin),
            listener: Arc::clone(&self.listener),
        }
    }
}

/// Connector service produced by [`ConnectTimingLayer`]
#[derive(Clone)]
pub struct ConnectTiming<S> {
    inner: S,
    origin: Arc<str>,
    listener: Arc<dyn TransportListener>,
}

impl<S, R> Service<R> for ConnectTiming<S>
where
    S: Service<R>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: R) -> Self::Future {
        let connecting = self.inner.call(request);
        let origin = Arc::clone(&self.origin);
        let listener = Arc::clone(&self.listener);

        Box::pin(async move {
            let conn = connecting.await?;
            tracing::debug!(origin = %origin, "Connection established");
            listener.connection_established(
                &origin,
                ConnectionInfo {
                    connected_at: Some(Instant::now()),
                    ..Default::default()
                },
            );
            Ok(conn)
        })
    }
}
