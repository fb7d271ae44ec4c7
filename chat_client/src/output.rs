//! Audio output devices for the playback scheduler.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::ClientError;
use crate::playback::{AudioOutput, PlaybackEnd};

/// Plays each clip by piping the WAV bytes into an external player.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    program: String,
    args: Vec<String>,
}

impl CommandOutput {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a whitespace-split command line such as `aplay -q -`.
    pub fn from_command(parts: &[String]) -> Option<Self> {
        let (program, args) = parts.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl AudioOutput for CommandOutput {
    async fn start(&self, wav: Vec<u8>) -> Result<PlaybackEnd, ClientError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::PlaybackFailed(format!("failed to start {}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::PlaybackFailed("player stdin unavailable".to_string()))?;
        let program = self.program.clone();

        Ok(Box::pin(async move {
            stdin
                .write_all(&wav)
                .await
                .map_err(|e| ClientError::PlaybackFailed(format!("{program}: {e}")))?;
            drop(stdin);

            let status = child
                .wait()
                .await
                .map_err(|e| ClientError::PlaybackFailed(format!("{program}: {e}")))?;
            debug!("{} exited with {}", program, status);
            if status.success() {
                Ok(())
            } else {
                Err(ClientError::PlaybackFailed(format!("{program} exited with {status}")))
            }
        }))
    }
}

/// Plays clips on the default output device in-process.
#[cfg(feature = "rodio")]
#[derive(Debug, Clone, Default)]
pub struct RodioOutput;

#[cfg(feature = "rodio")]
#[async_trait]
impl AudioOutput for RodioOutput {
    async fn start(&self, wav: Vec<u8>) -> Result<PlaybackEnd, ClientError> {
        let source = rodio::Decoder::new(std::io::Cursor::new(wav))
            .map_err(|e| ClientError::PlaybackFailed(format!("undecodable audio: {e}")))?;

        // The output stream is not Send; it lives and dies on a blocking thread.
        let playback = tokio::task::spawn_blocking(move || -> Result<(), ClientError> {
            let (_stream, stream_handle) = rodio::OutputStream::try_default()
                .map_err(|e| ClientError::PlaybackFailed(format!("no output device: {e}")))?;
            let sink = rodio::Sink::try_new(&stream_handle)
                .map_err(|e| ClientError::PlaybackFailed(e.to_string()))?;
            sink.append(source);
            sink.sleep_until_end();
            Ok(())
        });

        Ok(Box::pin(async move {
            playback
                .await
                .map_err(|e| ClientError::PlaybackFailed(e.to_string()))?
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_from_command() {
        let output = CommandOutput::from_command(&["aplay".into(), "-q".into(), "-".into()]).unwrap();
        assert_eq!(output.program, "aplay");
        assert_eq!(output.args, vec!["-q", "-"]);
        assert!(CommandOutput::from_command(&[]).is_none());
    }

    #[tokio::test]
    async fn test_player_consumes_audio() {
        let output = CommandOutput::new("cat", vec![]);
        let end = output.start(b"RIFF....WAVE".to_vec()).await.unwrap();
        assert!(end.await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_player_fails_to_start() {
        let output = CommandOutput::new("/nonexistent/player", vec![]);
        assert!(matches!(
            output.start(vec![0; 4]).await,
            Err(ClientError::PlaybackFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_player_exit_status_is_checked() {
        let output = CommandOutput::new("sh", vec!["-c".into(), "cat >/dev/null; exit 3".into()]);
        let end = output.start(vec![0; 16]).await.unwrap();
        assert!(matches!(end.await, Err(ClientError::PlaybackFailed(_))));
    }
}
