//! Text-to-speech (TTS) providers
//!
//! Providers return the synthesized audio as a stream of byte chunks in
//! whatever container the provider emits. Nothing here decodes audio.

use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;

use crate::config::SynthesisConfig;
use crate::{Error, Result};

/// Ordered chunks of one synthesized utterance
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Something that turns text into a streamed audio response
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text` with `voice`
    ///
    /// Resolves once the provider has accepted the request; audio then
    /// arrives through the returned stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Http` if the request cannot be sent, or
    /// `Error::Synthesis` if the provider rejects it
    async fn synthesize(&self, text: &str, voice: &str) -> Result<ChunkStream>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    ElevenLabs,
    OpenAI,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elevenlabs" | "eleven_labs" | "11labs" => Ok(Self::ElevenLabs),
            "openai" => Ok(Self::OpenAI),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Streams speech from an HTTP TTS API
pub struct HttpSynthesizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    output_format: String,
    streaming_latency: u8,
    speed: f32,
    provider: TtsProvider,
    base_url: String,
}

impl HttpSynthesizer {
    /// Create a synthesizer from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the HTTP client cannot be built
    pub fn from_config(config: &SynthesisConfig) -> Result<Self> {
        let api_key = config.api_key.clone().unwrap_or_default();
        if api_key.is_empty() {
            return Err(Error::Config(format!(
                "{:?} API key required for TTS",
                config.provider
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let base_url = match config.provider {
            TtsProvider::ElevenLabs => ELEVENLABS_BASE_URL,
            TtsProvider::OpenAI => OPENAI_BASE_URL,
        };

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            output_format: config.output_format.clone(),
            streaming_latency: config.streaming_latency,
            speed: config.speed,
            provider: config.provider,
            base_url: base_url.to_string(),
        })
    }

    /// Override the API base URL (proxies, local mocks)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request_elevenlabs(&self, text: &str, voice: &str) -> Result<reqwest::Response> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        if voice.is_empty() {
            return Err(Error::Config("ElevenLabs voice ID required".to_string()));
        }

        let url = format!("{}/v1/text-to-speech/{voice}/stream", self.base_url);
        let latency = self.streaming_latency.to_string();

        self.client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .query(&[
                ("optimize_streaming_latency", latency.as_str()),
                ("output_format", self.output_format.as_str()),
            ])
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await
            .map_err(Error::from)
    }

    async fn request_openai(&self, text: &str, voice: &str) -> Result<reqwest::Response> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        self.client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&TtsRequest {
                model: &self.model,
                input: text,
                voice,
                speed: self.speed,
                response_format: &self.output_format,
            })
            .send()
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<ChunkStream> {
        tracing::debug!(provider = self.name(), text, "generating audio");
        let start = Instant::now();

        let response = match self.provider {
            TtsProvider::ElevenLabs => self.request_elevenlabs(text, voice).await?,
            TtsProvider::OpenAI => self.request_openai(text, voice).await?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "{} TTS error {status}: {body}",
                self.name()
            )));
        }

        tracing::debug!(
            provider = self.name(),
            took_ms = start.elapsed().as_millis(),
            text,
            "synthesis response started"
        );

        let provider = self.name();
        Ok(response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| Error::Synthesis(format!("{provider} stream interrupted: {e}")))
            })
            .boxed())
    }

    fn name(&self) -> &'static str {
        match self.provider {
            TtsProvider::ElevenLabs => "elevenlabs",
            TtsProvider::OpenAI => "openai",
        }
    }
}
