//! Audio capture from microphone
//!
//! The device callback runs in a real-time context and must never block, so
//! it only ever pushes frames into an unbounded channel through a
//! [`CaptureHandle`]. The consuming side ([`CaptureBuffer`]) waits on that
//! channel and coalesces whatever has queued up into a single chunk.
//!
//! Enabling the buffer starts a new epoch; frames tagged with an older epoch
//! are discarded on the consumer side instead of being drained eagerly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig};
use futures::Stream as FuturesStream;
use tokio::sync::{Mutex, mpsc};

use crate::config::CaptureConfig;
use crate::{Error, Result};

enum Message {
    Frame { epoch: u64, data: Bytes },
    CycleEnd { epoch: u64 },
    Close,
}

struct Shared {
    enabled: AtomicBool,
    closed: AtomicBool,
    epoch: AtomicU64,
    tx: mpsc::UnboundedSender<Message>,
}

impl Shared {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

struct Consumer {
    rx: mpsc::UnboundedReceiver<Message>,
    /// Epoch whose end was seen while coalescing the previous chunk
    pending_end: Option<u64>,
}

/// Producer side of a [`CaptureBuffer`], safe to call from the device callback
#[derive(Clone)]
pub struct CaptureHandle {
    shared: Arc<Shared>,
}

impl CaptureHandle {
    /// Queue a raw PCM frame if the buffer is enabled
    ///
    /// Never blocks and never fails; frames pushed while disabled or closed
    /// are dropped.
    pub fn push_frame(&self, frame: impl Into<Bytes>) {
        let shared = &self.shared;
        if !shared.enabled.load(Ordering::Acquire) {
            return;
        }
        let _ = shared.tx.send(Message::Frame {
            epoch: shared.epoch(),
            data: frame.into(),
        });
    }
}

/// Hand-off queue between the capture callback and a recognizer
pub struct CaptureBuffer {
    shared: Arc<Shared>,
    consumer: Mutex<Consumer>,
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBuffer {
    /// Create a disabled, open buffer
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                enabled: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                tx,
            }),
            consumer: Mutex::new(Consumer {
                rx,
                pending_end: None,
            }),
        }
    }

    /// Producer handle for the capture callback
    #[must_use]
    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Discard stale frames and start accepting new ones
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureClosed` if the buffer has been closed
    pub fn enable(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::CaptureClosed);
        }
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        self.shared.enabled.store(true, Ordering::Release);
        tracing::debug!(epoch = self.shared.epoch(), "capture enabled");
        Ok(())
    }

    /// Stop accepting frames; already queued frames stay available
    pub fn disable(&self) {
        if self.shared.enabled.swap(false, Ordering::AcqRel) {
            let epoch = self.shared.epoch();
            let _ = self.shared.tx.send(Message::CycleEnd { epoch });
            tracing::debug!(epoch, "capture disabled");
        }
    }

    /// Close the buffer; pending and future reads return `None`
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.enabled.store(false, Ordering::Release);
            let _ = self.shared.tx.send(Message::Close);
            tracing::debug!("capture closed");
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Wait for audio and return everything queued so far as one chunk
    ///
    /// Returns `None` at the end of an enable/disable cycle (after the
    /// remaining frames have been returned) and once the buffer is closed.
    pub async fn next_chunk(&self) -> Option<Bytes> {
        let mut consumer = self.consumer.lock().await;
        if self.is_closed() {
            return None;
        }
        if let Some(ended) = consumer.pending_end.take() {
            if ended == self.shared.epoch() {
                return None;
            }
        }

        let mut chunk = BytesMut::new();

        loop {
            let message = consumer.rx.recv().await?;
            let current = self.shared.epoch();
            match message {
                Message::Frame { epoch, data } if epoch == current => {
                    chunk.extend_from_slice(&data);
                    break;
                }
                Message::CycleEnd { epoch } if epoch == current => return None,
                Message::Close => return None,
                Message::Frame { .. } | Message::CycleEnd { .. } => {}
            }
        }

        while let Ok(message) = consumer.rx.try_recv() {
            let current = self.shared.epoch();
            match message {
                Message::Frame { epoch, data } if epoch == current => {
                    chunk.extend_from_slice(&data);
                }
                Message::CycleEnd { epoch } if epoch == current => {
                    consumer.pending_end = Some(epoch);
                    break;
                }
                Message::Close => break,
                Message::Frame { .. } | Message::CycleEnd { .. } => {}
            }
        }

        Some(chunk.freeze())
    }

    /// Chunks of the current enable/disable cycle as a stream
    pub fn chunks(&self) -> impl FuturesStream<Item = Bytes> + '_ {
        futures::stream::unfold(self, |buffer| async move {
            buffer.next_chunk().await.map(|chunk| (chunk, buffer))
        })
    }

    /// Enable, take a single chunk, then disable again
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureClosed` if the buffer is or becomes closed
    pub async fn capture_once(&self) -> Result<Bytes> {
        self.enable()?;
        let chunk = self.next_chunk().await;
        self.disable();
        chunk.ok_or(Error::CaptureClosed)
    }
}

/// Captures audio from the default input device into a [`CaptureHandle`]
pub struct CaptureDevice {
    stream: Stream,
    config: StreamConfig,
}

impl CaptureDevice {
    /// Open the default input device and start streaming frames
    ///
    /// # Errors
    ///
    /// Returns error if no suitable input device or format is available
    pub fn open(capture: CaptureConfig, handle: CaptureHandle) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let rate = SampleRate(capture.sample_rate);
        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= rate
                    && c.max_sample_rate() >= rate
                    && matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?
            .with_sample_rate(rate);

        let sample_format = supported_config.sample_format();
        let mut config = supported_config.config();
        config.buffer_size = BufferSize::Fixed(capture.frame_size);

        let on_error =
            |err: cpal::StreamError| tracing::error!(error = %err, "audio capture error");
        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    handle.push_frame(f32_to_pcm16(data));
                },
                on_error,
                None,
            ),
            _ => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    handle.push_frame(i16_to_pcm16(data));
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = capture.sample_rate,
            frame_size = capture.frame_size,
            ?sample_format,
            "audio capture started"
        );

        Ok(Self { stream, config })
    }

    /// Sample rate of the running stream
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Stop capturing audio
    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!(error = %e, "failed to pause capture stream");
        }
        drop(self.stream);
        tracing::debug!("audio capture stopped");
    }
}

/// Convert f32 samples in [-1.0, 1.0] to 16-bit little-endian PCM
#[must_use]
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            sample_i16.to_le_bytes()
        })
        .collect()
}

fn i16_to_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Wrap mono 16-bit little-endian PCM in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
