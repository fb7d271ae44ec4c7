//! Console input. Speech commands apply the moment they are typed, even
//! while an answer is streaming; prompts are handed to the turn loop.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::playback::SpeechToggle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prompt(String),
    Speech(bool),
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "/quit" => Command::Quit,
            "/speech on" => Command::Speech(true),
            "/speech off" => Command::Speech(false),
            prompt => Command::Prompt(prompt.to_string()),
        }
    }
}

/// Read commands from `input` until `/quit` or end of input.
///
/// Prompts typed before `/quit` are still answered: dropping `prompts`
/// only ends the turn loop once it has drained them.
pub async fn read_commands<R>(input: R, speech: SpeechToggle, prompts: mpsc::Sender<String>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Speech(enabled) => {
                speech.set(enabled);
                println!("Speech {}.", if enabled { "on" } else { "off" });
            }
            Command::Prompt(prompt) => {
                if prompts.send(prompt).await.is_err() {
                    debug!("Turn loop is gone; stopping input");
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("  /speech off "), Command::Speech(false));
        assert_eq!(Command::parse("/speech on"), Command::Speech(true));
        assert_eq!(Command::parse("/quit"), Command::Quit);
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse(" Why? "), Command::Prompt("Why?".to_string()));
    }

    #[tokio::test]
    async fn test_speech_commands_apply_without_waiting_for_prompts() {
        let speech = SpeechToggle::new(true);
        // Capacity 1 and nobody receiving: the second prompt would block.
        let (tx, mut rx) = mpsc::channel(1);
        let input = &b"First?\n/speech off\n/quit\nnever sent\n"[..];

        read_commands(input, speech.clone(), tx).await.unwrap();

        assert!(!speech.is_enabled());
        assert_eq!(rx.recv().await.as_deref(), Some("First?"));
        assert_eq!(rx.recv().await, None);
    }
}
