use thiserror::Error;

/// Errors raised while talking to the inference/retrieval services or
/// persisting the chat history.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    StreamAborted(#[from] StreamAborted),

    #[error("History persistence failed: {0}")]
    PersistenceFailed(String),
}

/// The upstream byte stream broke off before it was closed cleanly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Upstream stream aborted: {reason}")]
pub struct StreamAborted {
    pub reason: String,
}

impl StreamAborted {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
