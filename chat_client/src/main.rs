use std::sync::Arc;

use anyhow::Context;
use chat_client::playback::AudioOutput;
use chat_client::repl::read_commands;
use chat_client::synth::HttpSynthesizer;
use chat_client::{ChatSession, ClientConfig, ClientError, PlaybackEvent, PlaybackScheduler, SpeechToggle, TerminalView};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they do not interleave with the streamed answer.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenv::dotenv();

    let config = ClientConfig::from_env();
    info!("Talking to {}", config.server_url);

    let client = reqwest::Client::new();
    let synthesizer = Arc::new(HttpSynthesizer::new(client.clone(), &config.server_url));
    let playback = PlaybackScheduler::spawn(synthesizer, audio_output(&config)?);

    let mut events = playback.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PlaybackEvent::Failed { id, reason } => warn!("Sentence {} not spoken: {}", id, reason),
                other => debug!("{:?}", other),
            }
        }
    });

    let speech = SpeechToggle::new(config.speech_enabled);
    let mut session = ChatSession::new(client, &config.server_url, TerminalView::stdout(), playback, speech.clone());

    println!("Connected to {}. Commands: /speech on, /speech off, /quit", config.server_url);

    // Input is read on its own task so /speech commands land mid-answer.
    let (prompts_tx, mut prompts) = mpsc::channel::<String>(8);
    let input = tokio::spawn(read_commands(BufReader::new(tokio::io::stdin()), speech, prompts_tx));

    while let Some(prompt) = prompts.recv().await {
        match session.ask(&prompt).await {
            Ok(_) => {}
            Err(ClientError::StreamAborted(e)) => eprintln!("\n[answer cut off: {}]", e.reason),
            Err(e) => eprintln!("[{e}]"),
        }
    }
    input.await.context("input task panicked")?.context("failed to read stdin")?;

    let report = session.close().await;
    info!(
        "Playback finished: {} spoken, {} failed, {} dropped",
        report.completed, report.failed, report.discarded
    );
    Ok(())
}

#[cfg(feature = "rodio")]
fn audio_output(_config: &ClientConfig) -> anyhow::Result<Arc<dyn AudioOutput>> {
    Ok(Arc::new(chat_client::output::RodioOutput))
}

#[cfg(not(feature = "rodio"))]
fn audio_output(config: &ClientConfig) -> anyhow::Result<Arc<dyn AudioOutput>> {
    let output = chat_client::output::CommandOutput::from_command(&config.player_command)
        .context("PLAYER_COMMAND is empty")?;
    Ok(Arc::new(output))
}
