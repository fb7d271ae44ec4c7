//! Piper run as a child process.
//!
//! Piper is asked for raw PCM on stdout (`--output_raw`), which we wrap in a
//! WAV header ourselves. Nothing is written to disk, so there is no output
//! file to discover after the process exits.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{read_sample_rate, wav::pcm16_to_wav, SpeechEngine, SynthesisError};

/// Sample rate assumed when the voice config cannot be read.
const DEFAULT_SAMPLE_RATE: u32 = 22_050;

#[derive(Debug, Clone)]
pub struct PiperProcess {
    binary: PathBuf,
    model: PathBuf,
    sample_rate: u32,
}

impl PiperProcess {
    /// Use `binary` with the voice at `model`; the sample rate comes from the
    /// voice's `<model>.json` config next to it.
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let model = model.into();
        let config = config_path_for(&model);
        let sample_rate = match read_sample_rate(&config) {
            Ok(rate) => rate,
            Err(e) => {
                warn!("{e:#}; assuming {DEFAULT_SAMPLE_RATE} Hz");
                DEFAULT_SAMPLE_RATE
            }
        };
        Self::with_sample_rate(binary, model, sample_rate)
    }

    pub fn with_sample_rate(binary: impl Into<PathBuf>, model: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Piper reads its voice config from `<model>.json`.
fn config_path_for(model: &Path) -> PathBuf {
    let mut name = model.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// Piper synthesizes one utterance per input line.
fn as_single_line(text: &str) -> String {
    let mut line: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    line.push('\n');
    line
}

#[async_trait]
impl SpeechEngine for PiperProcess {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        debug!("Starting Piper for {} chars", text.len());

        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SynthesisError::EngineUnavailable(format!(
                    "failed to start {}: {e}",
                    self.binary.display()
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::Failed("piper stdin not captured".into()))?;
        let input = as_single_line(text);
        // Feed stdin concurrently with draining stdout so neither pipe fills up.
        let writer = tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SynthesisError::Failed(format!("waiting for piper: {e}")))?;

        if let Ok(Err(e)) = writer.await {
            debug!("Piper stdin closed early: {e}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Piper stderr: {}", stderr.trim());
            return Err(SynthesisError::Failed(format!(
                "piper exited with {}",
                output.status
            )));
        }
        if output.stdout.len() < 2 {
            return Err(SynthesisError::NoAudio);
        }

        pcm16_to_wav(&output.stdout, self.sample_rate).map_err(|e| SynthesisError::Failed(e.to_string()))
    }

    fn name(&self) -> &str {
        "piper"
    }
}
