#![allow(dead_code)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use media_preview_core::cache::ThumbnailCache;
use media_preview_core::config::IngestOptions;
use media_preview_core::error::AppError;
use media_preview_core::ffmpeg::ProbeReport;
use media_preview_core::ffmpeg::ffprobe::VideoStreamInfo;
use media_preview_core::ingest::{IngestCoordinator, MetadataProbe, ThumbnailGenerator};
use media_preview_core::media::{AudioDetails, MediaKind};
use media_preview_core::content_id::ContentId;
use media_preview_core::playlist::Playlist;
use parking_lot::Mutex;

pub const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

pub fn video_report() -> ProbeReport {
    ProbeReport {
        duration: 12.5,
        size: 1_250_000,
        container: Some("mov,mp4,m4a,3gp,3g2,mj2".to_string()),
        format_bit_rate: Some(800_000),
        video: Some(VideoStreamInfo {
            width: 1920,
            height: 1080,
            fps: Some(30.0),
            codec: Some("h264".to_string()),
            pixel_format: Some("yuv420p".to_string()),
            profile: Some("High 41".to_string()),
            bit_rate: Some(650_000),
        }),
        audio: Some(stereo_aac()),
        audio_bit_rate: Some(128_000),
    }
}

pub fn audio_report() -> ProbeReport {
    ProbeReport {
        duration: 180.0,
        size: 4_000_000,
        container: Some("mp3".to_string()),
        format_bit_rate: Some(192_000),
        video: None,
        audio: Some(stereo_aac()),
        audio_bit_rate: Some(192_000),
    }
}

pub fn image_report() -> ProbeReport {
    ProbeReport {
        container: Some("png_pipe".to_string()),
        video: Some(VideoStreamInfo {
            width: 800,
            height: 600,
            codec: Some("png".to_string()),
            ..VideoStreamInfo::default()
        }),
        ..ProbeReport::default()
    }
}

fn stereo_aac() -> AudioDetails {
    AudioDetails {
        sample_rate: 48_000,
        channels: 2,
        channel_layout: Some("stereo".to_string()),
        codec: Some("aac".to_string()),
        sample_format: Some("fltp".to_string()),
    }
}

#[derive(Clone)]
pub enum ProbeBehavior {
    Report(ProbeReport),
    Fail,
    Panic,
}

/// Scripted metadata probe. Clones share the call counter.
#[derive(Clone)]
pub struct FakeProbe {
    behavior: ProbeBehavior,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn new(behavior: ProbeBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reporting(report: ProbeReport) -> Self {
        Self::new(ProbeBehavior::Report(report))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataProbe for FakeProbe {
    fn probe(&self, path: &Path) -> impl Future<Output = Result<ProbeReport, AppError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.clone();
        let delay = self.delay;
        let path = path.to_path_buf();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match behavior {
                ProbeBehavior::Report(report) => Ok(report),
                ProbeBehavior::Fail => Err(AppError::tool_failed(
                    "ffprobe",
                    1,
                    format!("{}: Invalid data found when processing input", path.display()),
                )),
                ProbeBehavior::Panic => panic!("probe exploded on {}", path.display()),
            }
        }
    }
}

#[derive(Clone, Copy)]
enum ThumbnailBehavior {
    Write,
    Fail,
    /// Leaves a truncated file behind and then reports failure, like a killed ffmpeg.
    WriteThenFail,
}

/// Writes a fixed JPEG payload, or fails like ffmpeg on an undecodable file.
/// Clones share the call counter and the list of destinations.
#[derive(Clone)]
pub struct FakeThumbnailer {
    behavior: ThumbnailBehavior,
    calls: Arc<AtomicUsize>,
    dests: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeThumbnailer {
    fn new(behavior: ThumbnailBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
            dests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn ok() -> Self {
        Self::new(ThumbnailBehavior::Write)
    }

    pub fn failing() -> Self {
        Self::new(ThumbnailBehavior::Fail)
    }

    pub fn failing_after_partial_write() -> Self {
        Self::new(ThumbnailBehavior::WriteThenFail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every `dest` the coordinator asked for, in call order.
    pub fn dests(&self) -> Vec<PathBuf> {
        self.dests.lock().clone()
    }
}

impl ThumbnailGenerator for FakeThumbnailer {
    fn generate(
        &self,
        input: &Path,
        _kind: MediaKind,
        dest: &Path,
    ) -> impl Future<Output = Result<(), AppError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.dests.lock().push(dest.to_path_buf());
        let behavior = self.behavior;
        let input = input.to_path_buf();
        let dest = dest.to_path_buf();
        async move {
            let decode_error = || {
                AppError::tool_failed(
                    "ffmpeg",
                    1,
                    format!("{}: could not decode frame", input.display()),
                )
            };
            match behavior {
                ThumbnailBehavior::Write => {
                    tokio::fs::write(&dest, FAKE_JPEG).await?;
                    Ok(())
                }
                ThumbnailBehavior::Fail => Err(decode_error()),
                ThumbnailBehavior::WriteThenFail => {
                    tokio::fs::write(&dest, &FAKE_JPEG[..3]).await?;
                    Err(decode_error())
                }
            }
        }
    }
}

pub type FakeCoordinator = IngestCoordinator<FakeProbe, FakeThumbnailer>;

/// Temp workspace with a media directory and an app cache directory.
pub struct Harness {
    dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn cache(&self) -> ThumbnailCache {
        ThumbnailCache::new(self.cache_root())
    }

    /// Creates a placeholder media file; the fakes never read it.
    pub fn media(&self, name: &str) -> PathBuf {
        let media_dir = self.dir.path().join("media");
        std::fs::create_dir_all(&media_dir).expect("create media dir");
        let path = media_dir.join(name);
        std::fs::write(&path, b"not really media").expect("write media file");
        path
    }

    pub fn coordinator(
        &self,
        playlist: &Playlist,
        probe: &FakeProbe,
        thumbnailer: &FakeThumbnailer,
    ) -> FakeCoordinator {
        self.coordinator_with(playlist, probe, thumbnailer, IngestOptions::default())
    }

    pub fn coordinator_with(
        &self,
        playlist: &Playlist,
        probe: &FakeProbe,
        thumbnailer: &FakeThumbnailer,
        options: IngestOptions,
    ) -> FakeCoordinator {
        IngestCoordinator::new(
            playlist.clone(),
            self.cache(),
            probe.clone(),
            thumbnailer.clone(),
            options,
        )
    }

    pub fn cached_thumbnails(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.cache().dir()) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries.map(|e| e.expect("dir entry").path()).collect();
        files.sort();
        files
    }

    /// Leftover scratch files in the thumbnail directory.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        self.cached_thumbnails()
            .into_iter()
            .filter(|p| p.to_string_lossy().contains(".tmp."))
            .collect()
    }

    /// Puts `bytes` in the cache slot for `media` as a previous run would have.
    pub async fn seed_thumbnail(&self, media: &Path, bytes: &[u8]) -> PathBuf {
        self.cache()
            .write(&ContentId::for_path(media), bytes)
            .await
            .expect("seed thumbnail")
    }
}
