//! Playback controller integration tests
//!
//! Uses `cat` as the player so no audio device is needed

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dialogbank::voice::PlaybackController;
use dialogbank::{Error, Result};
use futures::StreamExt;
use futures::stream::BoxStream;

mod common;
use common::{cat_player, wait_until};

/// One chunk, then silence until the session is stopped
fn endless(chunk: &'static [u8]) -> BoxStream<'static, Result<Bytes>> {
    futures::stream::iter(vec![Ok(Bytes::from_static(chunk))])
        .chain(futures::stream::pending())
        .boxed()
}

fn process_exists(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[tokio::test]
async fn test_sequential_plays_complete() {
    let player = cat_player();
    player.play_blob(&b"first"[..]).await.unwrap();
    player.play_blob(&b"second"[..]).await.unwrap();
    assert!(!player.is_playing());
}

#[tokio::test]
async fn test_new_stream_replaces_running_session() {
    let player = Arc::new(cat_player());

    let first = tokio::spawn({
        let player = Arc::clone(&player);
        async move { player.play_stream(endless(b"one")).await }
    });
    assert!(wait_until(Duration::from_secs(2), || player.is_playing()).await);
    let first_pid = player.active_pid().unwrap();

    let second = tokio::spawn({
        let player = Arc::clone(&player);
        async move { player.play_stream(endless(b"two")).await }
    });

    // The replaced session reports an interrupted, successful playback
    tokio::time::timeout(Duration::from_secs(2), first)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            player.active_pid().is_some_and(|pid| pid != first_pid)
        })
        .await
    );
    if cfg!(target_os = "linux") {
        assert!(!process_exists(first_pid));
    }

    player.stop().await;
    tokio::time::timeout(Duration::from_secs(2), second)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!player.is_playing());
}

#[tokio::test]
async fn test_old_session_plays_until_new_audio_arrives() {
    let player = Arc::new(cat_player());

    let first = tokio::spawn({
        let player = Arc::clone(&player);
        async move { player.play_stream(endless(b"one")).await }
    });
    assert!(wait_until(Duration::from_secs(2), || player.is_playing()).await);
    let first_pid = player.active_pid().unwrap();

    let delayed = futures::stream::once(async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(Bytes::from_static(b"two"))
    });
    let second = tokio::spawn({
        let player = Arc::clone(&player);
        async move { player.play_stream(delayed).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(player.active_pid(), Some(first_pid));
    assert!(!first.is_finished());

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert!(!player.is_playing());
}

#[tokio::test]
async fn test_stop_interrupts_playback() {
    let player = Arc::new(cat_player());

    let playing = tokio::spawn({
        let player = Arc::clone(&player);
        async move { player.play_stream(endless(b"audio")).await }
    });
    assert!(wait_until(Duration::from_secs(2), || player.is_playing()).await);

    player.stop().await;
    assert!(!player.is_playing());
    playing.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_mid_stream_error_cleans_up_player() {
    let player = cat_player();
    let chunks = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"audio")),
        Err(Error::Synthesis("connection reset".to_string())),
    ]);

    let result = player.play_stream(chunks).await;
    assert!(matches!(result, Err(Error::Synthesis(_))));
    assert!(!player.is_playing());
}

#[tokio::test]
async fn test_dropping_play_future_kills_player() {
    let player = Arc::new(cat_player());

    let playing = tokio::spawn({
        let player = Arc::clone(&player);
        async move { player.play_stream(endless(b"audio")).await }
    });
    assert!(wait_until(Duration::from_secs(2), || player.is_playing()).await);

    playing.abort();
    let _ = playing.await;
    assert!(!player.is_playing());
}

#[tokio::test]
async fn test_play_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp3");
    std::fs::write(&path, b"not really mp3").unwrap();

    let player = cat_player();
    player.play_file(&path).await.unwrap();

    let missing = player.play_file(&dir.path().join("missing.mp3")).await;
    assert!(matches!(missing, Err(Error::Io(_))));
}

#[tokio::test]
async fn test_controller_without_player_binary() {
    let player = PlaybackController::new(dialogbank::config::PlaybackConfig {
        program: "/nonexistent/player".to_string(),
        args: Vec::new(),
        ..Default::default()
    });
    let result = player.play_blob(&b"audio"[..]).await;
    assert_eq!(result.unwrap_err().kind(), dialogbank::ErrorKind::PlaybackProcessFailed);
}
