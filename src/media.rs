//! Typed media metadata. Kind-specific fields live in a tagged variant so a
//! record never carries codec fields that do not apply to its kind.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Extensions that are always treated as still images, regardless of what ffprobe reports
/// (ffprobe describes a JPEG as a single-frame `mjpeg` video stream).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tiff", "tif", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

impl MediaKind {
    /// Image extension wins; otherwise an audio stream with no video stream is Audio;
    /// everything else (including a failed probe) is Video.
    pub fn classify(path: &Path, has_video_stream: bool, has_audio_stream: bool) -> Self {
        if is_image_path(path) {
            MediaKind::Image
        } else if has_audio_stream && !has_video_stream {
            MediaKind::Audio
        } else {
            MediaKind::Video
        }
    }

    /// Kinds that get a preview frame.
    pub fn has_thumbnail(self) -> bool {
        !matches!(self, MediaKind::Audio)
    }
}

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDetails {
    /// Hz; 0 when unknown.
    pub sample_rate: u32,
    pub channels: u32,
    /// e.g. "stereo", "5.1"
    pub channel_layout: Option<String>,
    pub codec: Option<String>,
    /// e.g. "fltp", "s16"
    pub sample_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StreamDetails {
    #[serde(rename_all = "camelCase")]
    Video {
        width: u32,
        height: u32,
        /// `None` when the stream's frame rate is unknown (e.g. `0/0`).
        fps: Option<f64>,
        codec: Option<String>,
        pixel_format: Option<String>,
        /// Profile with level appended when known, e.g. "High 41".
        profile: Option<String>,
        audio: Option<AudioDetails>,
    },
    Audio(AudioDetails),
    Image {
        width: u32,
        height: u32,
        codec: Option<String>,
    },
}

impl StreamDetails {
    pub fn kind(&self) -> MediaKind {
        match self {
            StreamDetails::Video { .. } => MediaKind::Video,
            StreamDetails::Audio(_) => MediaKind::Audio,
            StreamDetails::Image { .. } => MediaKind::Image,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    /// Seconds, never negative.
    pub duration: f64,
    /// Bytes.
    pub size: u64,
    /// Container format name as reported by ffprobe (e.g. "mov,mp4,m4a,3gp,3g2,mj2").
    pub container: Option<String>,
    /// Bits per second. Stream-level bitrate when known, else container-level.
    pub bitrate: Option<u64>,
    pub details: StreamDetails,
}

impl MediaMetadata {
    /// Zeroed record used when probing failed.
    pub fn empty(kind: MediaKind) -> Self {
        let details = match kind {
            MediaKind::Video => StreamDetails::Video {
                width: 0,
                height: 0,
                fps: None,
                codec: None,
                pixel_format: None,
                profile: None,
                audio: None,
            },
            MediaKind::Audio => StreamDetails::Audio(AudioDetails::default()),
            MediaKind::Image => StreamDetails::Image {
                width: 0,
                height: 0,
                codec: None,
            },
        };
        Self {
            duration: 0.0,
            size: 0,
            container: None,
            bitrate: None,
            details,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.details.kind()
    }

    pub fn fps(&self) -> Option<f64> {
        match &self.details {
            StreamDetails::Video { fps, .. } => *fps,
            _ => None,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.details {
            StreamDetails::Video { width, height, .. } | StreamDetails::Image { width, height, .. }
                if *width > 0 && *height > 0 =>
            {
                Some((*width, *height))
            }
            _ => None,
        }
    }
}
