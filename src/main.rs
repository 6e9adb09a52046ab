use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dialogbank::voice::{
    AudioCache, CacheKey, CaptureBuffer, CaptureDevice, PlaybackController, Speaker, pcm_to_wav,
};
use dialogbank::{Config, shutdown};

/// Dialogbank - voice assistant audio front end
#[derive(Parser)]
#[command(name = "dbank", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize text and play it
    Speak {
        /// Text to speak
        text: String,
        /// Voice identifier (overrides configuration)
        #[arg(long)]
        voice: Option<String>,
    },
    /// Play an audio file through the configured player
    Play {
        /// Path to the audio file
        path: PathBuf,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the cache file for a text
    CachePath {
        /// Segment text
        text: String,
        /// Voice identifier (overrides configuration)
        #[arg(long)]
        voice: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,dialogbank=info",
        1 => "info,dialogbank=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(
        provider = ?config.synthesis.provider,
        cache_dir = %config.cache.dir.display(),
        player = %config.playback.program,
        "loaded configuration"
    );

    match cli.command {
        Command::Speak { text, voice } => speak(config, &text, voice).await,
        Command::Play { path } => play(&config, &path).await,
        Command::TestMic { duration, output } => test_mic(&config, duration, output).await,
        Command::CachePath { text, voice } => cache_path(&config, &text, voice),
    }
}

/// Synthesize and play text, cancelling on Ctrl-C
async fn speak(mut config: Config, text: &str, voice: Option<String>) -> anyhow::Result<()> {
    if let Some(voice) = voice {
        config.synthesis.voice = voice;
    }

    let speaker = Speaker::from_config(&config)?;
    let cancel = CancellationToken::new();
    let signals = shutdown::cancel_on_signal(cancel.clone());

    let result = speaker.speak(text, &cancel).await;
    signals.abort();

    match result {
        Err(e) if cancel.is_cancelled() => {
            tracing::info!("cancelled: {e}");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

/// Play an audio file
async fn play(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let player = PlaybackController::new(config.playback.clone());
    player.play_file(path).await?;
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let buffer = Arc::new(CaptureBuffer::new());
    let device = CaptureDevice::open(config.capture, buffer.handle())?;
    let sample_rate = device.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    buffer.enable()?;
    let reader = {
        let buffer = Arc::clone(&buffer);
        tokio::spawn(async move {
            let mut pcm = Vec::new();
            let mut chunks = 0usize;
            while let Some(chunk) = buffer.next_chunk().await {
                chunks += 1;
                pcm.extend_from_slice(&chunk);
            }
            (chunks, pcm)
        })
    };

    tokio::time::sleep(Duration::from_secs(duration)).await;
    buffer.disable();
    let (chunks, pcm) = reader.await?;
    buffer.close();
    device.stop();

    println!("Captured {} bytes in {chunks} chunks", pcm.len());

    if let Some(path) = output {
        let wav = pcm_to_wav(&pcm, sample_rate)?;
        std::fs::write(&path, wav)?;
        println!("Wrote {}", path.display());
    }

    Ok(())
}

/// Print where the cache entry for a text lives
fn cache_path(config: &Config, text: &str, voice: Option<String>) -> anyhow::Result<()> {
    let cache = AudioCache::open(&config.cache.dir)?;
    let key = CacheKey::new(text, voice.unwrap_or_else(|| config.synthesis.voice.clone()));
    let path = cache.path_for(&key);
    let status = if path.is_file() { "cached" } else { "not cached" };
    println!("{} ({status})", path.display());
    Ok(())
}
