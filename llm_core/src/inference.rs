use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LlmError, StreamAborted};
use crate::reframe::reframe_lines;

/// Lines of the inference service's NDJSON answer, in arrival order.
pub type LineStream = BoxStream<'static, Result<String, StreamAborted>>;

/// Request body for an Ollama-compatible `/api/generate` call
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// One NDJSON object of the streamed answer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// Extract the text fragment carried by one NDJSON line, if any.
///
/// Lines that are not valid JSON, or carry no (or an empty) `response`, yield
/// `None`.
pub fn response_fragment(line: &str) -> Option<String> {
    serde_json::from_str::<GenerateChunk>(line.trim())
        .ok()
        .and_then(|chunk| chunk.response)
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    model: String,
}

impl InferenceClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Start a streaming generation and return its reframed lines.
    ///
    /// Connection failures and non-2xx answers surface as
    /// `UpstreamUnavailable` before any line is produced; a connection that
    /// drops later shows up as a `StreamAborted` item in the stream.
    pub async fn generate_stream(&self, prompt: &str) -> Result<LineStream, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
        };

        debug!("Sending generate request to {} (prompt length={})", url, prompt.len());
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::UpstreamUnavailable(format!("inference service unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::UpstreamUnavailable(format!(
                "inference service returned {status}: {}",
                text.trim()
            )));
        }

        info!("Inference stream opened (model={})", self.model);
        Ok(reframe_lines(response.bytes_stream()).boxed())
    }
}
