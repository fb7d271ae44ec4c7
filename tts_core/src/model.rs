//! In-process synthesis through piper-rs.
//!
//! The ONNX voice is loaded on first use and kept for the life of the
//! engine. Inference runs on the blocking thread pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use piper_rs::synth::{PiperSpeechStreamParallel, PiperSpeechSynthesizer};
use tracing::info;

use crate::{encode_wav, read_sample_rate, SpeechEngine, SynthesisError};

type SharedSynth = Arc<RwLock<PiperSpeechSynthesizer>>;

pub struct PiperModel {
    config_path: PathBuf,
    sample_rate: u32,
    synth: Arc<Mutex<Option<SharedSynth>>>,
}

impl std::fmt::Debug for PiperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PiperModel")
            .field("config_path", &self.config_path)
            .field("sample_rate", &self.sample_rate)
            .field("synth", &"<PiperSpeechSynthesizer>")
            .finish()
    }
}

impl PiperModel {
    /// `config_path` is the voice's `.onnx.json` config.
    pub fn new(config_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let config_path = config_path.into();
        let sample_rate = read_sample_rate(&config_path)?;
        Ok(Self {
            config_path,
            sample_rate,
            synth: Arc::new(Mutex::new(None)),
        })
    }

    fn load(config_path: &PathBuf, slot: &Mutex<Option<SharedSynth>>) -> Result<SharedSynth, SynthesisError> {
        let mut slot = slot
            .lock()
            .map_err(|_| SynthesisError::Failed("synthesizer lock poisoned".into()))?;
        if let Some(synth) = slot.as_ref() {
            return Ok(synth.clone());
        }

        info!("Loading Piper voice {}", config_path.display());
        let model = piper_rs::from_config_path(config_path)
            .map_err(|e| SynthesisError::EngineUnavailable(format!("piper load error: {e}")))?;
        let synth = PiperSpeechSynthesizer::new(model)
            .map_err(|e| SynthesisError::EngineUnavailable(format!("piper init error: {e}")))?;
        let synth = Arc::new(RwLock::new(synth));
        *slot = Some(synth.clone());
        Ok(synth)
    }
}

#[async_trait]
impl SpeechEngine for PiperModel {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let text = text.to_string();
        let config_path = self.config_path.clone();
        let slot = self.synth.clone();
        let sample_rate = self.sample_rate;

        tokio::task::spawn_blocking(move || {
            let synth = Self::load(&config_path, &slot)?;
            let synth = synth
                .read()
                .map_err(|_| SynthesisError::Failed("synthesizer lock poisoned".into()))?;

            let iter: PiperSpeechStreamParallel = synth
                .synthesize_parallel(text, None)
                .map_err(|e| SynthesisError::Failed(format!("piper synth error: {e}")))?;

            let mut samples: Vec<f32> = Vec::new();
            for part in iter {
                samples.extend(
                    part.map_err(|e| SynthesisError::Failed(format!("chunk error: {e}")))?
                        .into_vec(),
                );
            }
            if samples.is_empty() {
                return Err(SynthesisError::NoAudio);
            }
            encode_wav(&samples, sample_rate).map_err(|e| SynthesisError::Failed(e.to_string()))
        })
        .await
        .map_err(|e| SynthesisError::Failed(format!("Task join error: {e}")))?
    }

    fn name(&self) -> &str {
        "piper-model"
    }
}
