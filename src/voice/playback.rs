//! Audio playback through an external media player
//!
//! Audio is piped into the player's stdin; the player does all decoding.
//! A controller owns at most one playback session at a time. Starting a new
//! session first pulls the first chunk of the new audio, then stops the old
//! session, so the silence between two replies is bounded by the time to
//! obtain that chunk.

use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine as _;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::PlaybackConfig;
use crate::{Error, Result};

const MPEG_DATA_URI_PREFIX: &str = "data:audio/mpeg;base64,";

/// Short audio cues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Listening started
    Beep,
    /// Waiting on the dialogue engine
    WaitTone,
}

/// Handle to the one running player process
struct PlaybackSession {
    id: u64,
    pid: Option<u32>,
    kill: CancellationToken,
    exited: watch::Receiver<bool>,
}

/// Owns at most one external player process
pub struct PlaybackController {
    config: PlaybackConfig,
    active: Mutex<Option<PlaybackSession>>,
    next_id: AtomicU64,
}

impl PlaybackController {
    #[must_use]
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Play a complete audio blob
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the player fails
    pub async fn play_blob(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        self.play_stream(futures::stream::once(async move { Ok(data) }))
            .await
    }

    /// Play a `data:audio/mpeg;base64,` URI
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the URI is malformed or the player fails
    pub async fn play_data_uri(&self, uri: &str) -> Result<()> {
        let encoded = uri
            .strip_prefix(MPEG_DATA_URI_PREFIX)
            .ok_or_else(|| Error::Playback("unsupported audio data URI".to_string()))?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Playback(format!("invalid base64 audio: {e}")))?;
        self.play_blob(data).await
    }

    /// Play an audio file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the player fails
    pub async fn play_file(&self, path: &Path) -> Result<()> {
        let data = tokio::fs::read(path).await?;
        self.play_blob(data).await
    }

    /// Play a configured cue sound; a cue without a configured path is skipped
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the player fails
    pub async fn play_cue(&self, cue: Cue) -> Result<()> {
        let path = match cue {
            Cue::Beep => self.config.beep_path.as_deref(),
            Cue::WaitTone => self.config.wait_tone_path.as_deref(),
        };
        match path {
            Some(path) => self.play_file(path).await,
            None => {
                tracing::debug!(?cue, "no sound configured for cue");
                Ok(())
            }
        }
    }

    /// Stream `chunks` into a new player process and wait for it to finish
    ///
    /// The previous session keeps playing until the first chunk is available.
    /// An empty stream leaves the current session untouched. If this session
    /// is stopped or replaced, returns `Ok(())` once its process is gone.
    ///
    /// # Errors
    ///
    /// Returns the stream's error if it fails (after the player has exited),
    /// or `Error::Playback` if the player cannot be spawned or exits
    /// unsuccessfully
    pub async fn play_stream<S>(&self, chunks: S) -> Result<()>
    where
        S: Stream<Item = Result<Bytes>> + Send,
    {
        let mut chunks = std::pin::pin!(chunks);

        let first = match chunks.next().await {
            Some(chunk) => chunk?,
            None => {
                tracing::debug!("nothing to play");
                return Ok(());
            }
        };

        self.stop().await;

        let child = self.spawn_player()?;
        let kill = CancellationToken::new();
        let (exited_tx, exited_rx) = watch::channel(false);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pid = child.id();

        let replaced = self.replace_active(Some(PlaybackSession {
            id,
            pid,
            kill: kill.clone(),
            exited: exited_rx,
        }));
        let mut running = RunningPlayer {
            controller: self,
            id,
            child,
            exited: exited_tx,
        };
        // A concurrent call may have started a session since `stop()` above
        if let Some(previous) = replaced {
            terminate(previous).await;
        }
        tracing::debug!(session = id, ?pid, "playback started");

        let outcome = {
            let feed = feed_and_wait(&mut running.child, first, chunks.as_mut());
            tokio::select! {
                () = kill.cancelled() => None,
                result = feed => Some(result),
            }
        };

        let result = match outcome {
            Some(result) => result,
            None => {
                if let Err(e) = running.child.kill().await {
                    tracing::warn!(session = id, error = %e, "failed to kill player");
                }
                tracing::debug!(session = id, "playback interrupted");
                Ok(())
            }
        };

        tracing::debug!(session = id, ok = result.is_ok(), "playback finished");
        result
    }

    /// Terminate the active session, if any, and wait for its process to exit
    pub async fn stop(&self) {
        if let Some(session) = self.replace_active(None) {
            terminate(session).await;
        }
    }

    /// Whether a player process is currently running
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Process ID of the running player
    #[must_use]
    pub fn active_pid(&self) -> Option<u32> {
        self.lock_active().as_ref().and_then(|s| s.pid)
    }

    fn spawn_player(&self) -> Result<Child> {
        Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Playback(format!("failed to spawn {}: {e}", self.config.program))
            })
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<PlaybackSession>> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn replace_active(&self, session: Option<PlaybackSession>) -> Option<PlaybackSession> {
        std::mem::replace(&mut *self.lock_active(), session)
    }

    fn clear_active(&self, id: u64) {
        let mut active = self.lock_active();
        if active.as_ref().is_some_and(|s| s.id == id) {
            *active = None;
        }
    }
}

/// Player process owned by an in-flight `play_stream` call
///
/// Dropping it (normally or because the call was abandoned) kills the
/// process if still running, clears the active slot and wakes `stop()`.
struct RunningPlayer<'a> {
    controller: &'a PlaybackController,
    id: u64,
    child: Child,
    exited: watch::Sender<bool>,
}

impl Drop for RunningPlayer<'_> {
    fn drop(&mut self) {
        if matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.start_kill();
        }
        self.controller.clear_active(self.id);
        let _ = self.exited.send(true);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Some(session) = self.replace_active(None) {
            session.kill.cancel();
        }
    }
}

async fn terminate(mut session: PlaybackSession) {
    tracing::debug!(session = session.id, "stopping playback");
    session.kill.cancel();
    // Set (or dropped) once the session's process is gone
    let _ = session.exited.wait_for(|exited| *exited).await;
}

/// Write all chunks to the player's stdin, close it, and wait for exit
async fn feed_and_wait<S>(child: &mut Child, first: Bytes, mut rest: S) -> Result<()>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Playback("player stdin unavailable".to_string()))?;

    let mut stream_error = None;
    let mut write_error = stdin.write_all(&first).await.err();

    if write_error.is_none() {
        while let Some(item) = rest.next().await {
            match item {
                Ok(chunk) => {
                    if let Err(e) = stdin.write_all(&chunk).await {
                        write_error = Some(e);
                        break;
                    }
                }
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            }
        }
    }

    if write_error.is_none() {
        if let Err(e) = stdin.flush().await {
            write_error = Some(e);
        }
    }
    drop(stdin);

    let status = child
        .wait()
        .await
        .map_err(|e| Error::Playback(format!("failed to wait for player: {e}")))?;

    if let Some(e) = stream_error {
        return Err(e);
    }
    if !status.success() {
        return Err(Error::Playback(format!("player exited with {status}")));
    }
    if let Some(e) = write_error {
        return Err(Error::Playback(format!("failed to write to player: {e}")));
    }
    Ok(())
}
