//! Concurrent, order-preserving synthesis of reply segments
//!
//! Every segment gets its own task and its own channel. All tasks start at
//! once; the output stream then drains the channels strictly in segment
//! order, so a slow segment only delays what comes after it in the reply
//! while later requests keep streaming into their channels.
//!
//! A failed segment aborts the rest of the reply: the error is yielded in
//! place of the segment's audio, outstanding requests are cancelled and the
//! stream ends.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::cache::{AudioCache, CacheKey};
use super::segment::{self, Segment};
use super::tts::Synthesizer;
use crate::{Error, Result};

type ChunkReceiver = mpsc::UnboundedReceiver<Result<Bytes>>;

/// Fans segments out to a [`Synthesizer`] and back in, in order
#[derive(Clone)]
pub struct SynthesisDispatcher {
    synthesizer: Arc<dyn Synthesizer>,
    cache: Option<Arc<AudioCache>>,
}

impl SynthesisDispatcher {
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            cache: None,
        }
    }

    /// Consult and populate `cache` for every segment
    #[must_use]
    pub fn with_cache(mut self, cache: AudioCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    #[must_use]
    pub fn cache(&self) -> Option<&AudioCache> {
        self.cache.as_deref()
    }

    /// Split `text` into segments and dispatch them
    #[must_use]
    pub fn synthesize_text(
        &self,
        text: &str,
        voice: &str,
        cancel: &CancellationToken,
    ) -> AudioStream {
        self.dispatch(segment::split(text), voice, cancel)
    }

    /// Start synthesizing all `segments` concurrently
    ///
    /// The returned stream yields audio chunks in segment order. Cancelling
    /// `cancel` or dropping the stream cancels every outstanding request.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn dispatch(
        &self,
        segments: Vec<Segment>,
        voice: &str,
        cancel: &CancellationToken,
    ) -> AudioStream {
        let cancel = cancel.child_token();
        let mut tasks = JoinSet::new();
        let mut pending = VecDeque::with_capacity(segments.len());

        tracing::debug!(segments = segments.len(), voice, "dispatching synthesis");

        for segment in segments {
            let (tx, rx) = mpsc::unbounded_channel();
            pending.push_back(rx);

            let job = SegmentJob {
                key: CacheKey::new(segment.text.clone(), voice),
                segment,
                synthesizer: Arc::clone(&self.synthesizer),
                cache: self.cache.clone(),
                tx,
            };
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let index = job.segment.index;
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!(index, "segment synthesis cancelled");
                    }
                    () = job.run(&cancel) => {}
                }
            });
        }

        let state = OrderedChunks {
            pending,
            _guard: cancel.clone().drop_guard(),
            cancel: cancel.clone(),
            _tasks: tasks,
            finished: false,
            started: Instant::now(),
            first_audio: false,
        };

        AudioStream {
            inner: futures::stream::unfold(state, OrderedChunks::next).boxed(),
            cancel,
        }
    }
}

/// Synthesis of one segment, from cache or from the provider
struct SegmentJob {
    segment: Segment,
    key: CacheKey,
    synthesizer: Arc<dyn Synthesizer>,
    cache: Option<Arc<AudioCache>>,
    tx: mpsc::UnboundedSender<Result<Bytes>>,
}

impl SegmentJob {
    async fn run(self, cancel: &CancellationToken) {
        if let Some(cache) = &self.cache {
            if let Some(blob) = cache.get(&self.key).await {
                let _ = self.tx.send(Ok(blob));
                return;
            }
        }

        let mut chunks = match self
            .synthesizer
            .synthesize(&self.segment.text, &self.key.voice)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                let _ = self.tx.send(Err(e));
                return;
            }
        };

        // Whole-segment copy for the cache
        let mut buffer = self.cache.as_ref().map(|_| BytesMut::new());

        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    if let Some(buffer) = buffer.as_mut() {
                        buffer.extend_from_slice(&chunk);
                    }
                    if self.tx.send(Ok(chunk)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = self.tx.send(Err(e));
                    return;
                }
            }
        }

        if let (Some(cache), Some(buffer)) = (&self.cache, buffer) {
            if buffer.is_empty() || cancel.is_cancelled() {
                return;
            }
            cache.put(&self.key, buffer.freeze(), cancel).await;
        }
    }
}

enum Step {
    Cancelled,
    Item(Option<Result<Bytes>>),
}

/// Fan-in state: per-segment receivers in segment order
struct OrderedChunks {
    pending: VecDeque<ChunkReceiver>,
    cancel: CancellationToken,
    // Aborts segment tasks when the stream is dropped
    _tasks: JoinSet<()>,
    _guard: DropGuard,
    finished: bool,
    started: Instant,
    first_audio: bool,
}

impl OrderedChunks {
    async fn next(mut self) -> Option<(Result<Bytes>, Self)> {
        if self.finished {
            return None;
        }

        loop {
            let step = {
                let Some(rx) = self.pending.front_mut() else {
                    self.finished = true;
                    return None;
                };
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => Step::Cancelled,
                    item = rx.recv() => Step::Item(item),
                }
            };

            match step {
                Step::Cancelled => {
                    self.finished = true;
                    tracing::debug!("synthesis cancelled");
                    return Some((Err(Error::SynthesisCancelled), self));
                }
                Step::Item(Some(Ok(chunk))) => {
                    if !self.first_audio {
                        self.first_audio = true;
                        tracing::debug!(
                            took_ms = self.started.elapsed().as_millis(),
                            "time to first audio"
                        );
                    }
                    return Some((Ok(chunk), self));
                }
                Step::Item(Some(Err(e))) => {
                    self.finished = true;
                    self.cancel.cancel();
                    tracing::warn!(error = %e, "segment synthesis failed, aborting reply");
                    return Some((Err(e), self));
                }
                Step::Item(None) => {
                    self.pending.pop_front();
                }
            }
        }
    }
}

/// Ordered audio of a whole reply
///
/// Dropping the stream cancels all outstanding synthesis.
pub struct AudioStream {
    inner: BoxStream<'static, Result<Bytes>>,
    cancel: CancellationToken,
}

impl AudioStream {
    /// Cancel all outstanding synthesis for this reply
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for AudioStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
