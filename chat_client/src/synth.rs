use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::error::ClientError;
use crate::playback::Synthesizer;

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
}

/// Synthesizes sentences through the relay server's `/tts` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    client: Client,
    url: String,
}

impl HttpSynthesizer {
    pub fn new(client: Client, server_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/tts", server_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ClientError> {
        let response = self
            .client
            .post(&self.url)
            .json(&TtsRequest { text })
            .send()
            .await
            .map_err(|e| ClientError::SynthesisFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::SynthesisFailed(format!("{status}: {}", body.trim())));
        }

        let wav = response
            .bytes()
            .await
            .map_err(|e| ClientError::SynthesisFailed(e.to_string()))?;
        if wav.is_empty() {
            return Err(ClientError::SynthesisFailed("empty audio".to_string()));
        }
        debug!("Received {} bytes of audio for {} chars", wav.len(), text.len());
        Ok(wav.to_vec())
    }
}
