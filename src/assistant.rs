//! Conversation loop around the audio pipeline
//!
//! Speech recognition and the dialogue engine are external services; they
//! are modelled here only by the contracts the loop relies on.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::voice::{CaptureBuffer, Cue, PlaybackController, Speaker};

/// Turns a stream of PCM chunks into a transcript
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Transcribe one utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::Recognition` if the service fails
    async fn recognize(&self, audio: BoxStream<'_, Bytes>) -> Result<String>;
}

/// One item of a dialogue engine reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyItem {
    /// Text to speak, optionally with prerecorded audio as a data URI
    Speak {
        message: String,
        audio: Option<String>,
    },
    /// The conversation is over
    End,
}

/// Dialogue engine holding the conversation state
#[async_trait]
pub trait DialogueEngine: Send + Sync {
    /// Start a new conversation
    ///
    /// # Errors
    ///
    /// Returns `Error::Dialogue` if the engine fails
    async fn launch(&self) -> Result<Vec<ReplyItem>>;

    /// Send the user's utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::Dialogue` if the engine fails
    async fn send_text(&self, text: &str) -> Result<Vec<ReplyItem>>;
}

/// What happened at the end of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    Ended,
}

/// Voice assistant: listen, ask the engine, speak the reply
pub struct Assistant<R, D> {
    recognizer: R,
    engine: D,
    capture: Arc<CaptureBuffer>,
    speaker: Speaker,
}

impl<R: Recognizer, D: DialogueEngine> Assistant<R, D> {
    pub const fn new(
        recognizer: R,
        engine: D,
        capture: Arc<CaptureBuffer>,
        speaker: Speaker,
    ) -> Self {
        Self {
            recognizer,
            engine,
            capture,
            speaker,
        }
    }

    /// Run a conversation until the engine ends it
    ///
    /// # Errors
    ///
    /// Returns the first error of any turn
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        let mut outcome = self.launch(cancel).await?;
        while outcome == TurnOutcome::Continue {
            outcome = self.run_turn(cancel).await?;
        }
        tracing::debug!("conversation ended");
        Ok(())
    }

    /// Start a conversation and speak the engine's greeting
    ///
    /// # Errors
    ///
    /// Returns error if the engine, synthesis or playback fails
    pub async fn launch(&self, cancel: &CancellationToken) -> Result<TurnOutcome> {
        let tone = self.start_cue(Cue::WaitTone);
        let reply = self.engine.launch().await;
        finish_cue(tone).await;
        self.respond(reply?, cancel).await
    }

    /// Listen for one utterance, send it, and speak the reply
    ///
    /// # Errors
    ///
    /// Returns error if capture, recognition, the engine, synthesis or
    /// playback fails
    pub async fn run_turn(&self, cancel: &CancellationToken) -> Result<TurnOutcome> {
        if let Err(e) = self.speaker.player().play_cue(Cue::Beep).await {
            tracing::warn!(error = %e, "failed to play beep");
        }

        tracing::debug!("start listening");
        self.capture.enable()?;
        let utterance = self.recognizer.recognize(self.capture.chunks().boxed()).await;
        self.capture.disable();
        tracing::debug!("stop listening");
        let utterance = utterance?;
        tracing::debug!(utterance, "recognized utterance");

        let tone = self.start_cue(Cue::WaitTone);
        let reply = self.engine.send_text(&utterance).await;
        finish_cue(tone).await;
        self.respond(reply?, cancel).await
    }

    async fn respond(
        &self,
        items: Vec<ReplyItem>,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut text = Vec::new();
        let mut spoke = false;

        for item in items {
            match item {
                ReplyItem::Speak {
                    audio: Some(uri), ..
                } => {
                    self.flush(&mut text, cancel).await?;
                    self.speaker.player().play_data_uri(&uri).await?;
                    spoke = true;
                }
                ReplyItem::Speak {
                    message,
                    audio: None,
                } => {
                    tracing::debug!(response = %message, "got response");
                    text.push(message);
                    spoke = true;
                }
                ReplyItem::End => {
                    self.flush(&mut text, cancel).await?;
                    return Ok(TurnOutcome::Ended);
                }
            }
        }

        if !spoke {
            tracing::error!("reply contained nothing to speak, ending conversation");
            return Ok(TurnOutcome::Ended);
        }

        self.flush(&mut text, cancel).await?;
        Ok(TurnOutcome::Continue)
    }

    async fn flush(&self, text: &mut Vec<String>, cancel: &CancellationToken) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        let reply = text.join(" ");
        text.clear();
        self.speaker.speak(&reply, cancel).await
    }

    fn start_cue(&self, cue: Cue) -> JoinHandle<()> {
        let player: Arc<PlaybackController> = Arc::clone(self.speaker.player());
        tokio::spawn(async move {
            if let Err(e) = player.play_cue(cue).await {
                tracing::warn!(?cue, error = %e, "failed to play cue");
            }
        })
    }
}

/// Cut a background cue short
async fn finish_cue(tone: JoinHandle<()>) {
    tone.abort();
    let _ = tone.await;
}
