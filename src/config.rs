//! Runtime options. Every field is optional on the wire; `effective_*` supplies the default.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Env override for the application cache directory (tests/CI, portable installs).
pub const CACHE_DIR_ENV: &str = "MEDIA_PREVIEW_CACHE_DIR";
const APP_DIR_NAME: &str = "media-preview";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct IngestOptions {
    /// Thumbnail width in pixels; height follows aspect ratio. Default 320.
    pub thumbnail_width: Option<u32>,
    /// ffmpeg `-q:v` for the JPEG (2 best, 31 worst). Default 4.
    pub thumbnail_quality: Option<u32>,
    /// Where in the media to grab the frame. Default 1s. Images always use 0.
    pub thumbnail_offset_secs: Option<f64>,
    /// Kill ffprobe/ffmpeg after this long. Default: wait indefinitely.
    pub tool_timeout_secs: Option<u64>,
    /// Application cache directory; thumbnails live under `<cacheDir>/thumbnails`.
    pub cache_dir: Option<PathBuf>,
    /// Also probe metadata when a thumbnail is served from cache. Default false.
    pub probe_on_cache_hit: Option<bool>,
}

impl IngestOptions {
    pub fn effective_thumbnail_width(&self) -> u32 {
        self.thumbnail_width.unwrap_or(320).clamp(16, 4096)
    }

    pub fn effective_thumbnail_quality(&self) -> u32 {
        self.thumbnail_quality.unwrap_or(4).clamp(2, 31)
    }

    pub fn effective_thumbnail_offset_secs(&self) -> f64 {
        self.thumbnail_offset_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .unwrap_or(1.0)
    }

    pub fn effective_tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }

    pub fn effective_probe_on_cache_hit(&self) -> bool {
        self.probe_on_cache_hit.unwrap_or(false)
    }

    /// `MEDIA_PREVIEW_CACHE_DIR` env, then `cacheDir`, then the platform cache dir.
    pub fn effective_cache_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR_NAME)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    /// Drift above which a heartbeat hard-snaps visual time. Default 0.5s.
    pub snap_threshold_secs: Option<f64>,
    /// Display refresh rate driving the ticker. Default 60.
    pub refresh_hz: Option<u32>,
}

impl SyncOptions {
    pub fn effective_snap_threshold_secs(&self) -> f64 {
        self.snap_threshold_secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(0.5)
    }

    pub fn effective_frame_interval(&self) -> Duration {
        let hz = self.refresh_hz.unwrap_or(60).clamp(1, 240);
        Duration::from_secs_f64(1.0 / hz as f64)
    }
}
