//! Voice processing module
//!
//! Handles microphone capture, segmented streaming synthesis with an audio
//! cache, and playback through an external player.

mod cache;
mod capture;
mod dispatch;
mod playback;
pub mod segment;
mod speaker;
mod tts;

pub use cache::{AudioCache, CacheKey};
pub use capture::{CaptureBuffer, CaptureDevice, CaptureHandle, f32_to_pcm16, pcm_to_wav};
pub use dispatch::{AudioStream, SynthesisDispatcher};
pub use playback::{Cue, PlaybackController};
pub use segment::{Segment, split};
pub use speaker::Speaker;
pub use tts::{ChunkStream, HttpSynthesizer, Synthesizer, TtsProvider};
