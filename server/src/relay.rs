//! Relay of the inference stream to the client as `data: <line>\n\n` frames.
//!
//! The response body pulls from the upstream line stream only when the
//! transport asks for more, so a slow client slows the upstream read down
//! instead of growing a buffer. There is no end-of-stream sentinel: the body
//! simply ends. If the upstream breaks off mid-stream the body yields an
//! error, which makes hyper drop the connection without a clean end.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::header,
    response::Response,
};
use futures_util::StreamExt;
use llm_core::{ChatHistory, HistoryRecord, LineStream};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::metrics::RelayMetrics;

/// Wrap one reframed line in the outbound frame envelope.
///
/// Lines that are blank after trimming carry nothing and produce no frame.
pub fn frame(line: &str) -> Option<Bytes> {
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(Bytes::from(format!("data: {line}\n\n")))
    }
}

/// Collects the lines relayed during one turn and appends them to the history
/// as a single assistant record, exactly once.
///
/// `commit` records inline. If the relay is dropped before committing (the
/// client went away mid-stream) the record is written from a spawned task.
pub struct TurnRecorder {
    history: Arc<ChatHistory>,
    text: String,
    armed: bool,
}

impl TurnRecorder {
    pub fn new(history: Arc<ChatHistory>) -> Self {
        Self {
            history,
            text: String::new(),
            armed: true,
        }
    }

    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub async fn commit(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let text = std::mem::take(&mut self.text);
        self.history.record(HistoryRecord::assistant(text)).await;
    }

    /// Nothing was relayed; record nothing.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TurnRecorder {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let history = self.history.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Relay dropped before completion; recording partial turn");
                handle.spawn(async move {
                    history.record(HistoryRecord::assistant(text)).await;
                });
            }
            Err(_) => warn!("No runtime available to record the assistant turn"),
        }
    }
}

/// Turn the upstream line stream into the streaming response.
///
/// The first frame is awaited before the response is built: if the upstream
/// aborts before anything could be written, the client gets an error status
/// instead of an empty stream.
pub async fn relay(
    mut lines: LineStream,
    mut recorder: TurnRecorder,
    metrics: RelayMetrics,
) -> Result<Response, ApiError> {
    let first = loop {
        match lines.next().await {
            Some(Ok(line)) => {
                if let Some(bytes) = frame(&line) {
                    recorder.push_line(line.trim());
                    break Some(bytes);
                }
            }
            Some(Err(aborted)) => {
                recorder.disarm();
                metrics.streams_aborted.fetch_add(1, Ordering::Relaxed);
                return Err(ApiError::StreamAborted(aborted.reason));
            }
            None => break None,
        }
    };

    metrics.streams_started.fetch_add(1, Ordering::Relaxed);

    let body = async_stream::stream! {
        if let Some(bytes) = first {
            metrics.frames_relayed.fetch_add(1, Ordering::Relaxed);
            yield Ok(bytes);
        }
        while let Some(item) = lines.next().await {
            match item {
                Ok(line) => {
                    if let Some(bytes) = frame(&line) {
                        recorder.push_line(line.trim());
                        metrics.frames_relayed.fetch_add(1, Ordering::Relaxed);
                        yield Ok(bytes);
                    }
                }
                Err(aborted) => {
                    warn!("Inference stream aborted mid-relay: {}", aborted.reason);
                    recorder.commit().await;
                    metrics.streams_aborted.fetch_add(1, Ordering::Relaxed);
                    yield Err(aborted);
                    return;
                }
            }
        }
        recorder.commit().await;
        metrics.streams_completed.fetch_add(1, Ordering::Relaxed);
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::InternalError(format!("failed to build relay response: {e}")))
}
