//! TOML configuration file loading
//!
//! Supports `~/.config/dialogbank/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DialogbankConfigFile {
    /// Speech synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Audio cache configuration
    #[serde(default)]
    pub cache: CacheFileConfig,

    /// External player configuration
    #[serde(default)]
    pub playback: PlaybackFileConfig,

    /// Microphone capture configuration
    #[serde(default)]
    pub capture: CaptureFileConfig,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// Provider name ("elevenlabs" or "openai")
    pub provider: Option<String>,

    /// Provider API key
    pub api_key: Option<String>,

    /// Voice identifier (`ElevenLabs` voice ID or `OpenAI` voice name)
    pub voice: Option<String>,

    /// Model identifier (e.g. "`eleven_multilingual_v2`")
    pub model: Option<String>,

    /// Output container/format (e.g. "`mp3_22050_32`")
    pub output_format: Option<String>,

    /// `ElevenLabs` streaming latency optimization level (0-4)
    pub streaming_latency: Option<u8>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// Speed multiplier (`OpenAI` only)
    pub speed: Option<f32>,
}

/// Audio cache configuration
#[derive(Debug, Default, Deserialize)]
pub struct CacheFileConfig {
    pub enabled: Option<bool>,
    pub dir: Option<String>,
}

/// External player configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Player program (e.g. "mpv")
    pub program: Option<String>,

    /// Arguments making the player read audio from stdin
    pub args: Option<Vec<String>>,

    /// Sound played when listening starts
    pub beep_path: Option<String>,

    /// Sound played while waiting on the dialogue engine
    pub wait_tone_path: Option<String>,
}

/// Microphone capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    pub sample_rate: Option<u32>,
    pub frame_size: Option<u32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `DialogbankConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> DialogbankConfigFile {
    config_file_path().map_or_else(DialogbankConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
pub fn load_from(path: &Path) -> DialogbankConfigFile {
    if !path.exists() {
        return DialogbankConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                DialogbankConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            DialogbankConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/dialogbank/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("dialogbank").join("config.toml"))
}
