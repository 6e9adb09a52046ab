//! Content-addressed audio cache
//!
//! One file per (text, voice) pair under a cache directory. The file name is
//! the SHA-256 of the UTF-8 text followed by the UTF-8 voice identifier, so
//! entries stay addressable across restarts. Writes land in a temporary file
//! first and are renamed into place; readers never see a partial blob.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Identifies one synthesized utterance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub text: String,
    pub voice: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
        }
    }

    /// Hex-encoded SHA-256 of the key components, in order
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hasher.update(self.voice.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Filesystem-backed store of synthesized audio blobs
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
}

impl AudioCache {
    /// Open a cache rooted at `dir`, creating the directory if absent
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheIo` if the directory cannot be created
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::CacheIo(format!("failed to create {}: {e}", dir.display()))
        })?;
        tracing::debug!(path = %dir.display(), "initialized audio cache");
        Ok(Self { dir })
    }

    /// Cache directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds (or would hold) the entry for `key`
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.digest())
    }

    /// Look up `key`, treating any I/O failure as a miss
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        match self.try_get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Look up `key`; an empty entry counts as a miss
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheIo` if the entry exists but cannot be read
    pub async fn try_get(&self, key: &CacheKey) -> Result<Option<Bytes>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) if data.is_empty() => {
                tracing::debug!(key = %key.digest(), "empty cache entry, treating as miss");
                Ok(None)
            }
            Ok(data) => {
                tracing::debug!(key = %key.digest(), bytes = data.len(), "cache hit");
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %key.digest(), "cache miss");
                Ok(None)
            }
            Err(e) => Err(Error::CacheIo(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Store `data` under `key` unless `cancel` fires first, logging and
    /// skipping on failure
    pub async fn put(&self, key: &CacheKey, data: Bytes, cancel: &CancellationToken) {
        if let Err(e) = self.store(key, data, Some(cancel.clone())).await {
            tracing::warn!(error = %e, "cache write failed, skipping");
        }
    }

    /// Store `data` under `key`
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheIo` if the blob cannot be written or published
    pub async fn try_put(&self, key: &CacheKey, data: Bytes) -> Result<()> {
        self.store(key, data, None).await
    }

    async fn store(
        &self,
        key: &CacheKey,
        data: Bytes,
        cancel: Option<CancellationToken>,
    ) -> Result<()> {
        let dir = self.dir.clone();
        let path = self.path_for(key);
        let digest = key.digest();

        // The blocking writer outlives an aborted caller, so it checks the token itself
        let published = tokio::task::spawn_blocking(move || {
            write_atomic(&dir, &path, &data, cancel.as_ref())
        })
        .await
        .map_err(|e| Error::CacheIo(format!("cache writer panicked: {e}")))??;

        if published {
            tracing::debug!(key = %digest, "cache write");
        } else {
            tracing::debug!(key = %digest, "cache write cancelled");
        }
        Ok(())
    }
}

/// Write `data` to a temporary file and rename it to `path`
///
/// Returns `false` without publishing if `cancel` fired before the rename.
fn write_atomic(
    dir: &Path,
    path: &Path,
    data: &[u8],
    cancel: Option<&CancellationToken>,
) -> Result<bool> {
    let io_err =
        |e: std::io::Error| Error::CacheIo(format!("failed to write {}: {e}", path.display()));

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Ok(false);
    }
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable() {
        let key = CacheKey::new("Hello.", "voice-1");
        assert_eq!(key.digest(), CacheKey::new("Hello.", "voice-1").digest());
        assert_eq!(key.digest().len(), 64);

        // Components are hashed back to back
        let mut hasher = Sha256::new();
        hasher.update(b"Hello.voice-1");
        assert_eq!(key.digest(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_digest_depends_on_voice() {
        let a = CacheKey::new("Hello.", "voice-1");
        let b = CacheKey::new("Hello.", "voice-2");
        assert_ne!(a.digest(), b.digest());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::open(dir.path().join("tts")).unwrap();
        let key = CacheKey::new("How are you?", "voice");

        assert!(cache.get(&key).await.is_none());

        cache
            .put(&key, Bytes::from_static(b"\xff\xfbaudio"), &CancellationToken::new())
            .await;
        assert_eq!(cache.get(&key).await.unwrap(), Bytes::from_static(b"\xff\xfbaudio"));
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("Hi.", "voice");

        AudioCache::open(dir.path())
            .unwrap()
            .try_put(&key, Bytes::from_static(b"blob"))
            .await
            .unwrap();

        let reopened = AudioCache::open(dir.path()).unwrap();
        assert_eq!(reopened.get(&key).await.unwrap(), Bytes::from_static(b"blob"));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::open(dir.path()).unwrap();
        let key = CacheKey::new("Fine!", "voice");
        cache
            .put(&key, Bytes::from_static(b"blob"), &CancellationToken::new())
            .await;

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![key.digest()]);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::open(dir.path()).unwrap();
        let key = CacheKey::new("Broken.", "voice");

        // A directory where the blob should be cannot be read as a file
        std::fs::create_dir(cache.path_for(&key)).unwrap();

        assert!(matches!(cache.try_get(&key).await, Err(Error::CacheIo(_))));
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_put_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::open(dir.path()).unwrap();
        let key = CacheKey::new("Too late.", "voice");
        let cancel = CancellationToken::new();
        cancel.cancel();

        cache.put(&key, Bytes::from_static(b"blob"), &cancel).await;

        assert!(!cache.path_for(&key).exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_entry_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::open(dir.path()).unwrap();
        let key = CacheKey::new("Silence.", "voice");
        std::fs::write(cache.path_for(&key), b"").unwrap();

        assert!(cache.try_get(&key).await.unwrap().is_none());
        assert!(cache.get(&key).await.is_none());
    }
}
