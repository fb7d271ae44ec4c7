use llm_core::StreamAborted;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("Server rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error(transparent)]
    StreamAborted(#[from] StreamAborted),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
}
