//! Single-frame preview extraction via ffmpeg.

use std::path::Path;
use std::time::Duration;

use crate::config::IngestOptions;
use crate::error::AppError;
use crate::ffmpeg::discovery::get_ffmpeg_path;
use crate::ffmpeg::{build_thumbnail_args, format_args_for_display_multiline, run_tool};
use crate::media::MediaKind;

#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub quality: u32,
    pub offset_secs: f64,
    pub timeout: Option<Duration>,
}

impl ThumbnailSettings {
    pub fn from_options(options: &IngestOptions) -> Self {
        Self {
            width: options.effective_thumbnail_width(),
            quality: options.effective_thumbnail_quality(),
            offset_secs: options.effective_thumbnail_offset_secs(),
            timeout: options.effective_tool_timeout(),
        }
    }

    /// Images have exactly one frame.
    pub fn offset_for(&self, kind: MediaKind) -> f64 {
        match kind {
            MediaKind::Image => 0.0,
            MediaKind::Video | MediaKind::Audio => self.offset_secs,
        }
    }
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self::from_options(&IngestOptions::default())
    }
}

/// Removes a partially written output unless the write finished.
struct PartialOutput<'a> {
    path: &'a Path,
    done: bool,
}

impl<'a> PartialOutput<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, done: false }
    }

    fn finish(mut self) {
        self.done = true;
    }
}

impl Drop for PartialOutput<'_> {
    fn drop(&mut self) {
        if !self.done {
            let _ = std::fs::remove_file(self.path);
        }
    }
}

/// Write one scaled frame of `input` to `dest`.
///
/// `dest` is expected to be a scratch path owned by the caller (see
/// [`ThumbnailCache::temp_path`](crate::cache::ThumbnailCache::temp_path)). Unless the
/// run finishes with a frame, whatever ffmpeg wrote there is removed.
pub async fn generate_thumbnail(
    input: &Path,
    kind: MediaKind,
    dest: &Path,
    settings: &ThumbnailSettings,
) -> Result<(), AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    let output = PartialOutput::new(dest);
    let args = build_thumbnail_args(
        input,
        settings.offset_for(kind),
        settings.width,
        settings.quality,
        dest,
    );
    log::trace!(
        target: "media_preview::thumbnail",
        "thumbnail command:\n{}",
        format_args_for_display_multiline(&args)
    );

    run_tool("ffmpeg", ffmpeg, &args, settings.timeout).await?;

    // Seeking past the end of a short clip exits 0 without writing a frame.
    let written = tokio::fs::metadata(dest)
        .await
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    if !written {
        return Err(AppError::tool_failed(
            "ffmpeg",
            1,
            format!("no frame written for {}", input.display()),
        ));
    }

    output.finish();
    log::debug!(
        target: "media_preview::thumbnail",
        "thumbnail written: {} -> {}",
        input.display(),
        dest.display()
    );
    Ok(())
}
