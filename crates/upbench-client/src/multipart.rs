//! Multipart form assembly with an instrumented file part

use bytes::Bytes;
use futures::Stream;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use upbench_core::{DestinationConfig, FileAsset, TraceId, TransportListener};

/// File bytes served in chunks, stamping the send phases as they go
///
/// The first poll happens once the transport has a connection and starts
/// writing the request, which is the closest observable point to headers
/// going out. Exhaustion marks the end of the body.
pub(crate) struct InstrumentedBody {
    data: Bytes,
    offset: usize,
    chunk_size: usize,
    trace: TraceId,
    origin: Arc<str>,
    listener: Arc<dyn TransportListener>,
    started: bool,
    finished: bool,
}

impl InstrumentedBody {
    pub(crate) fn new(
        data: Bytes,
        chunk_size: usize,
        trace: TraceId,
        origin: Arc<str>,
        listener: Arc<dyn TransportListener>,
    ) -> Self {
        Self {
            data,
            offset: 0,
            chunk_size: chunk_size.max(1),
            trace,
            origin,
            listener,
            started: false,
            finished: false,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

impl Stream for InstrumentedBody {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if !this.started {
            this.started = true;
            this.listener
                .headers_sending(this.trace, &this.origin, Instant::now());
        }

        if this.offset >= this.data.len() {
            if !this.finished {
                this.finished = true;
                this.listener.body_sent(this.trace, Instant::now());
            }
            return Poll::Ready(None);
        }

        let end = (this.offset + this.chunk_size).min(this.data.len());
        let chunk = this.data.slice(this.offset..end);
        this.offset = end;
        Poll::Ready(Some(Ok(chunk)))
    }
}

/// Build the upload form: text fields first, then the file part
pub(crate) fn build_form(
    destination: &DestinationConfig,
    asset: &FileAsset,
    public_id: &str,
    body: InstrumentedBody,
) -> reqwest::Result<Form> {
    let mime = mime_guess::from_path(&asset.path).first_or_octet_stream();
    let len = body.len();
    let part = Part::stream_with_length(Body::wrap_stream(body), len)
        .file_name(asset.name.clone())
        .mime_str(mime.as_ref())?;

    Ok(Form::new()
        .text("upload_preset", destination.upload_preset.clone())
        .text("folder", destination.folder.clone())
        .text("public_id", public_id.to_string())
        .part("file", part))
}
