//! Speech output: segment, synthesize and play a reply

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{AudioCache, HttpSynthesizer, PlaybackController, SynthesisDispatcher};
use crate::{Config, Error, Result};

/// Speaks replies with one voice through one player
pub struct Speaker {
    dispatcher: SynthesisDispatcher,
    player: Arc<PlaybackController>,
    voice: String,
}

impl Speaker {
    #[must_use]
    pub fn new(
        dispatcher: SynthesisDispatcher,
        player: Arc<PlaybackController>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            player,
            voice: voice.into(),
        }
    }

    /// Build the HTTP synthesizer, cache and player from configuration
    ///
    /// An unusable cache directory disables caching instead of failing.
    ///
    /// # Errors
    ///
    /// Returns error if the synthesizer cannot be configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let synthesizer = HttpSynthesizer::from_config(&config.synthesis)?;
        let mut dispatcher = SynthesisDispatcher::new(Arc::new(synthesizer));

        if config.cache.enabled {
            match AudioCache::open(&config.cache.dir) {
                Ok(cache) => dispatcher = dispatcher.with_cache(cache),
                Err(e) => tracing::warn!(error = %e, "audio cache unavailable, continuing without"),
            }
        }

        let player = Arc::new(PlaybackController::new(config.playback.clone()));
        Ok(Self::new(dispatcher, player, config.synthesis.voice.clone()))
    }

    #[must_use]
    pub fn player(&self) -> &Arc<PlaybackController> {
        &self.player
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &SynthesisDispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Speak `text`, returning once playback has finished
    ///
    /// Cancelling `cancel` aborts outstanding synthesis and stops the player.
    ///
    /// # Errors
    ///
    /// Returns `Error::SynthesisCancelled` if cancelled, otherwise the first
    /// synthesis or playback error
    pub async fn speak(&self, text: &str, cancel: &CancellationToken) -> Result<()> {
        let audio = self.dispatcher.synthesize_text(text, &self.voice, cancel);
        let play = self.player.play_stream(audio);
        tokio::pin!(play);

        let result = tokio::select! {
            result = &mut play => result,
            () = cancel.cancelled() => {
                // `play` must keep running so the session can report its exit
                let ((), result) = tokio::join!(self.player.stop(), &mut play);
                result
            }
        };

        match result {
            Ok(()) if cancel.is_cancelled() => Err(Error::SynthesisCancelled),
            other => other,
        }
    }
}
