//! Ingestion coordinator: metadata + thumbnail for each playlist entry, at most one
//! pipeline per path at a time, results shared through the thumbnail cache.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::cache::ThumbnailCache;
use crate::config::IngestOptions;
use crate::content_id::ContentId;
use crate::error::AppError;
use crate::ffmpeg::{ProbeReport, probe_media};
use crate::media::{MediaKind, MediaMetadata, is_image_path};
use crate::playlist::{EntryUpdate, IngestState, MediaEntry, Playlist, Thumbnail};
use crate::thumbnail::{ThumbnailSettings, generate_thumbnail};

/// Source of technical metadata for a media file.
pub trait MetadataProbe: Send + Sync + 'static {
    fn probe(&self, path: &Path) -> impl Future<Output = Result<ProbeReport, AppError>> + Send;
}

/// Writes one preview frame for `input` to the scratch file `dest`. The coordinator
/// moves it into the cache on success and deletes it on failure.
pub trait ThumbnailGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        input: &Path,
        kind: MediaKind,
        dest: &Path,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// ffprobe-backed probe.
#[derive(Debug, Clone, Default)]
pub struct FfprobeClient {
    pub timeout: Option<Duration>,
}

impl MetadataProbe for FfprobeClient {
    fn probe(&self, path: &Path) -> impl Future<Output = Result<ProbeReport, AppError>> + Send {
        probe_media(path, self.timeout)
    }
}

/// ffmpeg-backed thumbnailer.
#[derive(Debug, Clone, Default)]
pub struct FfmpegThumbnailer {
    pub settings: ThumbnailSettings,
}

impl ThumbnailGenerator for FfmpegThumbnailer {
    fn generate(
        &self,
        input: &Path,
        kind: MediaKind,
        dest: &Path,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        generate_thumbnail(input, kind, dest, &self.settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Index no longer in the playlist.
    Missing,
    /// Entry or path already has a pipeline running.
    InFlight,
    /// Complete with the metadata its kind needs.
    AlreadyComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Skipped(SkipReason),
    /// Served from the thumbnail cache.
    CacheHit,
    /// Full probe (+ thumbnail) pass ran.
    Ingested,
    /// Pipeline aborted; entry marked Failed.
    Failed,
}

/// Paths with a pipeline running. Owned by one coordinator, not process-global.
type InFlightSet = Arc<Mutex<HashSet<PathBuf>>>;

/// Holds a path in the in-flight set; releases it on drop, including on panic.
struct InFlightGuard {
    set: InFlightSet,
    path: PathBuf,
}

impl InFlightGuard {
    fn acquire(set: &InFlightSet, path: &Path) -> Option<Self> {
        let inserted = set.lock().insert(path.to_path_buf());
        inserted.then(|| Self {
            set: Arc::clone(set),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}

struct Inner<P, T> {
    playlist: Playlist,
    cache: ThumbnailCache,
    prober: P,
    thumbnailer: T,
    options: IngestOptions,
    in_flight: InFlightSet,
}

/// Cloneable; clones share the in-flight set.
pub struct IngestCoordinator<P = FfprobeClient, T = FfmpegThumbnailer> {
    inner: Arc<Inner<P, T>>,
}

impl<P, T> Clone for IngestCoordinator<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl IngestCoordinator {
    /// Coordinator driving the real ffprobe/ffmpeg, cache directory from `options`.
    pub fn with_ffmpeg(playlist: Playlist, options: IngestOptions) -> Self {
        let cache = ThumbnailCache::new(options.effective_cache_dir());
        let prober = FfprobeClient {
            timeout: options.effective_tool_timeout(),
        };
        let thumbnailer = FfmpegThumbnailer {
            settings: ThumbnailSettings::from_options(&options),
        };
        Self::new(playlist, cache, prober, thumbnailer, options)
    }
}

impl<P: MetadataProbe, T: ThumbnailGenerator> IngestCoordinator<P, T> {
    pub fn new(
        playlist: Playlist,
        cache: ThumbnailCache,
        prober: P,
        thumbnailer: T,
        options: IngestOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                playlist,
                cache,
                prober,
                thumbnailer,
                options,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
            }),
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.inner.playlist
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.inner.cache
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.inner.in_flight.lock().contains(path)
    }

    /// Ensure the entry at `index` has metadata and a thumbnail. No-op when a pipeline for
    /// its path is already running or the entry is already complete.
    pub async fn submit(&self, index: usize) -> SubmitOutcome {
        self.submit_inner(index, false).await
    }

    /// Force every entry back to Unprocessed and re-ingest it, bypassing the cache hit.
    /// Paths with a pipeline already running keep that run.
    pub async fn rescan(&self) -> Vec<SubmitOutcome> {
        let entries = self.inner.playlist.snapshot();
        let mut seen = HashSet::new();
        let mut first_indices = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            if !seen.insert(entry.path.clone()) {
                continue;
            }
            first_indices.push(index);
            // Entries of one path share a state, so the first one decides.
            if entry.ingest_state != IngestState::InFlight && !self.is_in_flight(&entry.path) {
                self.inner
                    .playlist
                    .publish(&entry.path, &EntryUpdate::state(IngestState::Unprocessed));
            }
        }
        log::info!(
            target: "media_preview::ingest",
            "rescan: {} entries, {} unique paths",
            entries.len(),
            first_indices.len()
        );
        self.run_all(first_indices, true).await
    }

    /// Submit every entry that needs processing, concurrently. Returns once all finish.
    pub async fn process_pending(&self) -> Vec<SubmitOutcome> {
        let pending: Vec<usize> = self
            .inner
            .playlist
            .snapshot()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.needs_processing())
            .map(|(i, _)| i)
            .collect();
        self.run_all(pending, false).await
    }

    async fn run_all(&self, indices: Vec<usize>, force_refresh: bool) -> Vec<SubmitOutcome> {
        let mut tasks = JoinSet::new();
        for index in indices {
            let this = self.clone();
            tasks.spawn(async move { this.submit_inner(index, force_refresh).await });
        }
        let mut outcomes = Vec::new();
        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => log::error!(
                    target: "media_preview::ingest",
                    "submit task aborted: {}",
                    e
                ),
            }
        }
        outcomes
    }

    async fn submit_inner(&self, index: usize, force_refresh: bool) -> SubmitOutcome {
        let Some(entry) = self.inner.playlist.get(index) else {
            return SubmitOutcome::Skipped(SkipReason::Missing);
        };
        if let Some(reason) = skip_reason(&entry, force_refresh) {
            return SubmitOutcome::Skipped(reason);
        }
        let Some(guard) = InFlightGuard::acquire(&self.inner.in_flight, &entry.path) else {
            return SubmitOutcome::Skipped(SkipReason::InFlight);
        };
        // Another pipeline for this path may have finished between the read above and
        // the claim; look again while holding it.
        let Some(entry) = self
            .inner
            .playlist
            .get(index)
            .filter(|current| current.path == entry.path)
        else {
            return SubmitOutcome::Skipped(SkipReason::Missing);
        };
        if let Some(reason) = skip_reason(&entry, force_refresh) {
            return SubmitOutcome::Skipped(reason);
        }

        let path = entry.path.clone();
        self.inner
            .playlist
            .publish(&path, &EntryUpdate::state(IngestState::InFlight));

        // The pipeline runs on its own task so a panic is contained and reported as Failed,
        // and so it still completes if the caller stops waiting.
        let inner = Arc::clone(&self.inner);
        let supervisor = tokio::spawn(async move {
            let pipeline = {
                let inner = Arc::clone(&inner);
                tokio::spawn(async move { inner.run_pipeline(&entry, force_refresh).await })
            };
            let outcome = match pipeline.await {
                Ok((update, outcome)) => {
                    inner.playlist.publish(&path, &update);
                    outcome
                }
                Err(e) => {
                    log::error!(
                        target: "media_preview::ingest",
                        "ingestion aborted for {}: {}",
                        path.display(),
                        e
                    );
                    inner
                        .playlist
                        .publish(&path, &EntryUpdate::state(IngestState::Failed));
                    SubmitOutcome::Failed
                }
            };
            drop(guard);
            outcome
        });

        supervisor.await.unwrap_or_else(|e| {
            log::error!(target: "media_preview::ingest", "supervisor task failed: {}", e);
            SubmitOutcome::Failed
        })
    }
}

/// Why `entry` needs no pipeline run right now, if it doesn't.
fn skip_reason(entry: &MediaEntry, force_refresh: bool) -> Option<SkipReason> {
    match entry.ingest_state {
        IngestState::InFlight => Some(SkipReason::InFlight),
        IngestState::Complete if !force_refresh && entry.has_expected_metadata() => {
            Some(SkipReason::AlreadyComplete)
        }
        _ => None,
    }
}

impl<P: MetadataProbe, T: ThumbnailGenerator> Inner<P, T> {
    /// Steps after the in-flight claim. Every expected failure degrades into a Complete
    /// update with whatever data was obtained.
    async fn run_pipeline(
        &self,
        entry: &MediaEntry,
        force_refresh: bool,
    ) -> (EntryUpdate, SubmitOutcome) {
        let path = entry.path.as_path();
        let id = ContentId::for_path(path);

        let cache_ready = match self.cache.ensure_dir().await {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    target: "media_preview::ingest",
                    "cache dir {} unavailable, continuing without cache: {}",
                    self.cache.dir().display(),
                    e
                );
                false
            }
        };

        if cache_ready
            && !force_refresh
            && let Some(update) = self.try_cache_hit(entry, &id).await
        {
            return (update, SubmitOutcome::CacheHit);
        }

        let (kind, metadata) = match self.inner_probe(path).await {
            Some(report) => {
                let kind = entry.kind.unwrap_or_else(|| report.classify(path));
                (kind, report.into_metadata(kind))
            }
            None => {
                let kind = entry.kind.unwrap_or(MediaKind::Video);
                (kind, MediaMetadata::empty(kind))
            }
        };

        let thumbnail = if kind.has_thumbnail() && cache_ready {
            self.make_thumbnail(path, kind, &id).await
        } else {
            None
        };

        log::info!(
            target: "media_preview::ingest",
            "ingested {}: kind={:?}, duration={:.2}s, thumbnail={}",
            path.display(),
            kind,
            metadata.duration,
            thumbnail.is_some()
        );
        let update = EntryUpdate {
            ingest_state: Some(IngestState::Complete),
            kind: Some(kind),
            metadata: Some(metadata),
            thumbnail,
        };
        (update, SubmitOutcome::Ingested)
    }

    async fn try_cache_hit(&self, entry: &MediaEntry, id: &ContentId) -> Option<EntryUpdate> {
        let record = self.cache.record(id).await?;
        let bytes = match self.cache.read(id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!(
                    target: "media_preview::ingest",
                    "cached thumbnail {} unreadable, re-ingesting: {}",
                    record.thumbnail_path.display(),
                    e
                );
                return None;
            }
        };
        let path = entry.path.as_path();
        // Audio never gets a thumbnail, so a cache hit is an image or a video.
        let kind = entry.kind.unwrap_or(if is_image_path(path) {
            MediaKind::Image
        } else {
            MediaKind::Video
        });
        let metadata = if self.options.effective_probe_on_cache_hit() {
            self.inner_probe(path)
                .await
                .map(|report| report.into_metadata(kind))
        } else {
            None
        };
        log::debug!(
            target: "media_preview::ingest",
            "cache hit for {} ({})",
            path.display(),
            id
        );
        Some(EntryUpdate {
            ingest_state: Some(IngestState::Complete),
            kind: Some(kind),
            metadata,
            thumbnail: Some(Thumbnail {
                path: record.thumbnail_path,
                bytes: Arc::from(bytes),
            }),
        })
    }

    async fn inner_probe(&self, path: &Path) -> Option<ProbeReport> {
        match self.prober.probe(path).await {
            Ok(report) => Some(report),
            Err(e) => {
                if e.is_tool_failure() {
                    log::warn!(
                        target: "media_preview::ingest",
                        "probe failed for {}: {}",
                        path.display(),
                        e
                    );
                } else {
                    log::error!(
                        target: "media_preview::ingest",
                        "probe error for {}: {}",
                        path.display(),
                        e
                    );
                }
                None
            }
        }
    }

    async fn make_thumbnail(&self, path: &Path, kind: MediaKind, id: &ContentId) -> Option<Thumbnail> {
        let tmp = self.cache.temp_path(id);
        if let Err(e) = self.thumbnailer.generate(path, kind, &tmp).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            log::warn!(
                target: "media_preview::ingest",
                "thumbnail failed for {}: {}",
                path.display(),
                e
            );
            return None;
        }
        let dest = match self.cache.commit(&tmp, id).await {
            Ok(dest) => dest,
            Err(e) => {
                log::warn!(
                    target: "media_preview::ingest",
                    "could not store thumbnail for {}: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };
        match self.cache.read(id).await {
            Ok(bytes) => Some(Thumbnail {
                path: dest,
                bytes: Arc::from(bytes),
            }),
            Err(e) => {
                log::warn!(
                    target: "media_preview::ingest",
                    "thumbnail for {} not readable after generation: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(state: IngestState, kind: Option<MediaKind>) -> MediaEntry {
        let mut entry = MediaEntry::new("/media/clip.mp4");
        entry.ingest_state = state;
        entry.kind = kind;
        entry.metadata = kind.map(MediaMetadata::empty);
        entry
    }

    #[test]
    fn in_flight_is_always_skipped() {
        let e = entry(IngestState::InFlight, None);
        assert_eq!(skip_reason(&e, false), Some(SkipReason::InFlight));
        assert_eq!(skip_reason(&e, true), Some(SkipReason::InFlight));
    }

    #[test]
    fn complete_is_skipped_unless_forced() {
        let e = entry(IngestState::Complete, Some(MediaKind::Video));
        assert_eq!(skip_reason(&e, false), Some(SkipReason::AlreadyComplete));
        assert_eq!(skip_reason(&e, true), None);
    }

    #[test]
    fn complete_without_expected_metadata_runs() {
        let mut e = entry(IngestState::Complete, Some(MediaKind::Audio));
        e.metadata = Some(MediaMetadata::empty(MediaKind::Video));
        assert_eq!(skip_reason(&e, false), None);
    }

    #[test]
    fn unprocessed_and_failed_run() {
        assert_eq!(skip_reason(&entry(IngestState::Unprocessed, None), false), None);
        assert_eq!(skip_reason(&entry(IngestState::Failed, None), false), None);
    }

    #[test]
    fn guard_releases_path_on_drop() {
        let set: InFlightSet = Arc::default();
        let path = Path::new("/media/clip.mp4");
        let guard = InFlightGuard::acquire(&set, path);
        assert!(guard.is_some());
        assert!(InFlightGuard::acquire(&set, path).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&set, path).is_some());
    }
}
