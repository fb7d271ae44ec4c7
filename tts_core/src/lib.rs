//! Speech synthesis for the voice chat relay.
//!
//! Every engine is a direct "text in, WAV bytes out" call behind the
//! [`SpeechEngine`] trait, so the HTTP layer never cares whether audio comes
//! from a Piper process or an in-process model.

mod wav;
pub mod piper;
#[cfg(feature = "piper-model")]
pub mod model;

use async_trait::async_trait;
use thiserror::Error;

pub use piper::PiperProcess;
#[cfg(feature = "piper-model")]
pub use model::PiperModel;
pub use wav::{encode_wav, pcm16_to_wav, wav_duration_ms, WAV_CONTENT_TYPE};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Speech engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Synthesis failed: {0}")]
    Failed(String),

    #[error("Speech engine produced no audio")]
    NoAudio,
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Synthesize `text` and return a complete WAV payload.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;

    /// Short engine name for logs.
    fn name(&self) -> &str;
}

/// Read `audio.sample_rate` from a Piper voice config JSON.
pub fn read_sample_rate(cfg_path: impl AsRef<std::path::Path>) -> anyhow::Result<u32> {
    use anyhow::Context;

    let cfg_path = cfg_path.as_ref();
    let text = std::fs::read_to_string(cfg_path)
        .with_context(|| format!("Failed to read config file: {}", cfg_path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| "Config file is not valid JSON")?;

    let sample_rate = json
        .get("audio")
        .and_then(|a| a.get("sample_rate"))
        .and_then(|sr| sr.as_u64())
        .ok_or_else(|| anyhow::anyhow!("Missing or invalid 'audio.sample_rate' in config"))?;

    Ok(sample_rate as u32)
}
