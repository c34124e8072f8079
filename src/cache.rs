//! Persistent thumbnail cache: one JPEG per content id under `<cache-dir>/thumbnails/`.
//!
//! Each writer owns a distinct key, so no cross-key locking is needed. Writers fill a
//! uniquely named [`temp_path`](ThumbnailCache::temp_path) and [`commit`](ThumbnailCache::commit)
//! it, so a reader never sees a partially written file and concurrent writers of the
//! same key leave one complete file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::content_id::ContentId;
use crate::error::AppError;

const THUMBNAIL_DIR: &str = "thumbnails";
const THUMBNAIL_EXT: &str = "jpg";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A cached thumbnail known to exist on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub id: ContentId,
    pub thumbnail_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ThumbnailCache {
    dir: PathBuf,
}

impl ThumbnailCache {
    /// `app_cache_dir` is the application cache root; thumbnails go in a subdirectory.
    pub fn new(app_cache_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: app_cache_dir.as_ref().join(THUMBNAIL_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Idempotent; safe to race with other callers.
    pub async fn ensure_dir(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn thumbnail_path(&self, id: &ContentId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, THUMBNAIL_EXT))
    }

    /// Unique sibling path for an in-progress write. Keeps the `.jpg` extension so
    /// ffmpeg picks the right muxer when it writes here directly.
    pub fn temp_path(&self, id: &ContentId) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.{}-{}.tmp.{}",
            id,
            std::process::id(),
            n,
            THUMBNAIL_EXT
        ))
    }

    pub async fn exists(&self, id: &ContentId) -> bool {
        tokio::fs::try_exists(self.thumbnail_path(id))
            .await
            .unwrap_or(false)
    }

    pub async fn record(&self, id: &ContentId) -> Option<CacheRecord> {
        if self.exists(id).await {
            Some(CacheRecord {
                id: id.clone(),
                thumbnail_path: self.thumbnail_path(id),
            })
        } else {
            None
        }
    }

    /// Cached bytes, or `AppError::Io` with `ErrorKind::NotFound` when absent.
    pub async fn read(&self, id: &ContentId) -> Result<Vec<u8>, AppError> {
        Ok(tokio::fs::read(self.thumbnail_path(id)).await?)
    }

    /// Store `bytes` under `id` in one step.
    pub async fn write(&self, id: &ContentId, bytes: &[u8]) -> Result<PathBuf, AppError> {
        self.ensure_dir().await?;
        let tmp = self.temp_path(id);
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        self.commit(&tmp, id).await
    }

    /// Move a finished temp file into the key's slot, replacing any previous entry.
    pub async fn commit(&self, tmp: &Path, id: &ContentId) -> Result<PathBuf, AppError> {
        let dest = self.thumbnail_path(id);
        if let Err(e) = tokio::fs::rename(tmp, &dest).await {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(e.into());
        }
        log::debug!(
            target: "media_preview::cache",
            "cached thumbnail {}",
            dest.display()
        );
        Ok(dest)
    }

    /// Delete temp files left behind by a crashed process.
    pub async fn cleanup_stale_temp_files(&self) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };
        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let is_temp = name
                .to_str()
                .is_some_and(|n| n.ends_with(&format!(".tmp.{}", THUMBNAIL_EXT)));
            if is_temp && tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!(
                target: "media_preview::cache",
                "removed {} stale temp file(s) from {}",
                removed,
                self.dir.display()
            );
        }
        removed
    }
}
