//! Configuration management for Dialogbank

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::voice::TtsProvider;
use crate::{Error, Result};

use file::DialogbankConfigFile;

/// Default `ElevenLabs` model
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";

/// Default `OpenAI` model
pub const DEFAULT_OPENAI_MODEL: &str = "tts-1";

/// Default capture sample rate (16kHz for speech)
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default frames per capture callback
pub const DEFAULT_FRAME_SIZE: u32 = 128;

/// Dialogbank configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Speech synthesis configuration
    pub synthesis: SynthesisConfig,

    /// Audio cache configuration
    pub cache: CacheConfig,

    /// External player configuration
    pub playback: PlaybackConfig,

    /// Microphone capture configuration
    pub capture: CaptureConfig,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Provider backend
    pub provider: TtsProvider,

    /// Provider API key
    pub api_key: Option<String>,

    /// Voice identifier, also part of every cache key
    pub voice: String,

    /// Model identifier
    pub model: String,

    /// Output format requested from the provider
    pub output_format: String,

    /// `ElevenLabs` streaming latency optimization level
    pub streaming_latency: u8,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Speed multiplier (`OpenAI` only)
    pub speed: f32,
}

/// Audio cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Consult and populate the cache
    pub enabled: bool,

    /// Directory holding one file per cache key
    pub dir: PathBuf,
}

/// External player configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Player program
    pub program: String,

    /// Player arguments (must make the player read from stdin)
    pub args: Vec<String>,

    /// Sound played when listening starts
    pub beep_path: Option<PathBuf>,

    /// Sound played while waiting on the dialogue engine
    pub wait_tone_path: Option<PathBuf>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            program: "mpv".to_string(),
            args: ["--no-cache", "--no-terminal", "--", "fd://0"]
                .into_iter()
                .map(String::from)
                .collect(),
            beep_path: None,
            wait_tone_path: None,
        }
    }
}

/// Microphone capture configuration
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Sample rate in Hz (mono, 16-bit)
    pub sample_rate: u32,

    /// Frames delivered per device callback
    pub frame_size: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

/// Default cache directory (`~/.cache/dialogbank/tts` on Linux)
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("cache"),
        |d| d.cache_dir().join("dialogbank").join("tts"),
    )
}

fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the provider name is unknown
    pub fn from_sources<F>(fc: DialogbankConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = env("DIALOGBANK_TTS_PROVIDER")
            .or(fc.synthesis.provider)
            .map_or(Ok(TtsProvider::ElevenLabs), |name| name.parse::<TtsProvider>())?;

        let api_key = match provider {
            TtsProvider::ElevenLabs => env("EL_API_KEY").or_else(|| env("ELEVENLABS_API_KEY")),
            TtsProvider::OpenAI => env("OPENAI_API_KEY"),
        }
        .or(fc.synthesis.api_key);

        let (default_model, default_voice, default_format) = match provider {
            TtsProvider::ElevenLabs => (DEFAULT_ELEVENLABS_MODEL, "", "mp3_22050_32"),
            TtsProvider::OpenAI => (DEFAULT_OPENAI_MODEL, "alloy", "mp3"),
        };

        let synthesis = SynthesisConfig {
            provider,
            api_key,
            voice: env("EL_VOICE_ID")
                .or(fc.synthesis.voice)
                .unwrap_or_else(|| default_voice.to_string()),
            model: env("DIALOGBANK_TTS_MODEL")
                .or(fc.synthesis.model)
                .unwrap_or_else(|| default_model.to_string()),
            output_format: fc
                .synthesis
                .output_format
                .unwrap_or_else(|| default_format.to_string()),
            streaming_latency: fc.synthesis.streaming_latency.unwrap_or(4).min(4),
            request_timeout: Duration::from_secs(fc.synthesis.request_timeout_secs.unwrap_or(30)),
            speed: fc.synthesis.speed.unwrap_or(1.0),
        };

        let cache = CacheConfig {
            enabled: env("DIALOGBANK_CACHE_ENABLED")
                .map(|v| parse_bool(&v))
                .or(fc.cache.enabled)
                .unwrap_or(true),
            dir: env("DIALOGBANK_CACHE_DIR")
                .or(fc.cache.dir)
                .map_or_else(default_cache_dir, PathBuf::from),
        };

        let defaults = PlaybackConfig::default();
        let playback = PlaybackConfig {
            program: env("DIALOGBANK_PLAYER")
                .or(fc.playback.program)
                .unwrap_or(defaults.program),
            args: fc.playback.args.unwrap_or(defaults.args),
            beep_path: env("DIALOGBANK_BEEP_PATH")
                .or(fc.playback.beep_path)
                .map(PathBuf::from),
            wait_tone_path: env("WAIT_TONE_PATH")
                .or(fc.playback.wait_tone_path)
                .map(PathBuf::from),
        };

        let capture = CaptureConfig {
            sample_rate: fc.capture.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            frame_size: fc.capture.frame_size.unwrap_or(DEFAULT_FRAME_SIZE),
        };
        if capture.sample_rate == 0 || capture.frame_size == 0 {
            return Err(Error::Config(
                "capture sample_rate and frame_size must be non-zero".to_string(),
            ));
        }

        Ok(Self {
            synthesis,
            cache,
            playback,
            capture,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use file::{CaptureFileConfig, SynthesisFileConfig};

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(DialogbankConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.synthesis.provider, TtsProvider::ElevenLabs);
        assert_eq!(config.synthesis.model, DEFAULT_ELEVENLABS_MODEL);
        assert_eq!(config.synthesis.output_format, "mp3_22050_32");
        assert_eq!(config.synthesis.streaming_latency, 4);
        assert!(config.synthesis.api_key.is_none());
        assert!(config.cache.enabled);
        assert_eq!(config.playback.program, "mpv");
        assert_eq!(config.playback.args.last().map(String::as_str), Some("fd://0"));
        assert_eq!(config.capture.sample_rate, 16000);
        assert_eq!(config.capture.frame_size, 128);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = DialogbankConfigFile {
            synthesis: SynthesisFileConfig {
                voice: Some("from-file".to_string()),
                api_key: Some("file-key".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let config = Config::from_sources(
            fc,
            env_from(&[("EL_VOICE_ID", "from-env"), ("DIALOGBANK_CACHE_ENABLED", "false")]),
        )
        .unwrap();

        assert_eq!(config.synthesis.voice, "from-env");
        assert_eq!(config.synthesis.api_key.as_deref(), Some("file-key"));
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_openai_provider_defaults() {
        let config = Config::from_sources(
            DialogbankConfigFile::default(),
            env_from(&[("DIALOGBANK_TTS_PROVIDER", "openai"), ("OPENAI_API_KEY", "sk-test")]),
        )
        .unwrap();

        assert_eq!(config.synthesis.provider, TtsProvider::OpenAI);
        assert_eq!(config.synthesis.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.synthesis.voice, "alloy");
        assert_eq!(config.synthesis.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = Config::from_sources(
            DialogbankConfigFile::default(),
            env_from(&[("DIALOGBANK_TTS_PROVIDER", "gtts")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let fc = DialogbankConfigFile {
            capture: CaptureFileConfig {
                sample_rate: None,
                frame_size: Some(0),
            },
            ..Default::default()
        };
        assert!(Config::from_sources(fc, env_from(&[])).is_err());
    }
}
