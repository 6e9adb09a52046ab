//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use dialogbank::config::PlaybackConfig;
use dialogbank::voice::{ChunkStream, PlaybackController, Synthesizer};
use dialogbank::{Error, Result};

/// Audio the mock produces for `text`
#[must_use]
pub fn audio_for(text: &str) -> Vec<u8> {
    format!("[{text}]").into_bytes()
}

/// Scriptable synthesizer that records every request
#[derive(Default)]
pub struct MockSynthesizer {
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the first chunk for `text`
    #[must_use]
    pub fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Fail `text` after its first chunk
    #[must_use]
    pub fn failing(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    /// Never finish `text` after its first chunk
    #[must_use]
    pub fn hanging(mut self, text: &str) -> Self {
        self.hanging.insert(text.to_string());
        self
    }

    /// Texts requested so far, in request order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &str) -> Result<ChunkStream> {
        self.calls.lock().unwrap().push(text.to_string());

        let audio = audio_for(text);
        let (head, tail) = audio.split_at(1);
        let head = Bytes::copy_from_slice(head);
        let tail = Bytes::copy_from_slice(tail);
        let delay = self.delays.get(text).copied().unwrap_or_default();

        let first = futures::stream::once(async move {
            tokio::time::sleep(delay).await;
            Ok(head)
        });

        if self.failing.contains(text) {
            let err = Error::Synthesis(format!("provider failed on {text}"));
            return Ok(first.chain(futures::stream::iter(vec![Err(err)])).boxed());
        }
        if self.hanging.contains(text) {
            return Ok(first.chain(futures::stream::pending()).boxed());
        }
        Ok(first.chain(futures::stream::iter(vec![Ok(tail)])).boxed())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Player that swallows audio and exits at end of input
#[must_use]
pub fn cat_player() -> PlaybackController {
    PlaybackController::new(PlaybackConfig {
        program: "cat".to_string(),
        args: Vec::new(),
        ..PlaybackConfig::default()
    })
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
