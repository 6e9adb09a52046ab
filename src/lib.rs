//! Dialogbank - voice assistant front end
//!
//! This library provides the audio side of a voice assistant:
//! - Microphone capture with a non-blocking hand-off to a recognizer
//! - Concurrent, order-preserving speech synthesis with an audio cache
//! - Playback through a single external player process
//!
//! # Architecture
//!
//! ```text
//!  microphone ──► CaptureBuffer ──► Recognizer ──► DialogueEngine
//!                                                       │
//!                                                       ▼
//!  speakers ◄── PlaybackController ◄── SynthesisDispatcher ◄── segment::split
//!                                          │       ▲
//!                                          ▼       │
//!                                          AudioCache
//! ```

pub mod assistant;
pub mod config;
pub mod error;
pub mod shutdown;
pub mod voice;

pub use assistant::{Assistant, DialogueEngine, Recognizer, ReplyItem, TurnOutcome};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
