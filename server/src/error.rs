use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use llm_core::LlmError;
use thiserror::Error;
use tts_core::SynthesisError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream stream aborted: {0}")]
    StreamAborted(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(#[from] SynthesisError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::UpstreamUnavailable(msg) => ApiError::UpstreamUnavailable(msg),
            LlmError::StreamAborted(aborted) => ApiError::StreamAborted(aborted.reason),
            LlmError::PersistenceFailed(msg) => ApiError::InternalError(msg),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable(_) | ApiError::StreamAborted(_) => StatusCode::BAD_GATEWAY,
            ApiError::SynthesisFailed(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

// Errors go out as a short plain-text diagnostic.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::InvalidInput(msg) => {
                tracing::debug!("Rejected request: {}", msg);
                msg
            }
            other => {
                tracing::error!("{}", other);
                other.to_string()
            }
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_core::StreamAborted;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::UpstreamUnavailable("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(SynthesisError::NoAudio).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_llm_error_conversion() {
        let err = ApiError::from(LlmError::StreamAborted(StreamAborted::new("reset")));
        assert!(matches!(err, ApiError::StreamAborted(ref r) if r == "reset"));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_response_is_plain_text() {
        let response = ApiError::InvalidInput("Prompt cannot be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
