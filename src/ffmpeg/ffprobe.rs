//! FFprobe-based metadata extraction for playlist ingestion.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::builder::build_probe_args;
use super::discovery::get_ffprobe_path;
use super::runner::run_tool;
use crate::error::AppError;
use crate::media::{AudioDetails, MediaKind, MediaMetadata, StreamDetails};

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    pix_fmt: Option<String>,
    #[serde(default)]
    profile: Option<String>,
    /// Integer for video streams, occasionally a string; `-99`/"unknown" when absent.
    #[serde(default)]
    level: Option<serde_json::Value>,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u32>,
    #[serde(default)]
    channel_layout: Option<String>,
    #[serde(default)]
    sample_fmt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

/// First video stream as reported by ffprobe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
    pub codec: Option<String>,
    pub pixel_format: Option<String>,
    pub profile: Option<String>,
    pub bit_rate: Option<u64>,
}

/// Raw probe result before the media kind is decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub duration: f64,
    pub size: u64,
    pub container: Option<String>,
    pub format_bit_rate: Option<u64>,
    pub video: Option<VideoStreamInfo>,
    pub audio: Option<AudioDetails>,
    pub audio_bit_rate: Option<u64>,
}

impl ProbeReport {
    pub fn classify(&self, path: &Path) -> MediaKind {
        MediaKind::classify(path, self.video.is_some(), self.audio.is_some())
    }

    /// Shape the report into the kind-specific metadata record. Stream-level
    /// bitrate wins over the container bitrate.
    pub fn into_metadata(self, kind: MediaKind) -> MediaMetadata {
        let video = self.video.unwrap_or_default();
        let stream_bit_rate = match kind {
            MediaKind::Audio => self.audio_bit_rate,
            MediaKind::Video | MediaKind::Image => video.bit_rate,
        };
        let details = match kind {
            MediaKind::Video => StreamDetails::Video {
                width: video.width,
                height: video.height,
                fps: video.fps,
                codec: video.codec,
                pixel_format: video.pixel_format,
                profile: video.profile,
                audio: self.audio,
            },
            MediaKind::Audio => StreamDetails::Audio(self.audio.unwrap_or_default()),
            MediaKind::Image => StreamDetails::Image {
                width: video.width,
                height: video.height,
                codec: video.codec,
            },
        };
        MediaMetadata {
            duration: self.duration,
            size: self.size,
            container: self.container,
            bitrate: stream_bit_rate.or(self.format_bit_rate),
            details,
        }
    }
}

/// "num/den" to frames per second. Zero or malformed denominators mean unknown.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den).filter(|fps| fps.is_finite() && *fps > 0.0)
}

fn parse_bit_rate(s: &str) -> Option<u64> {
    s.trim().parse().ok().filter(|&b| b > 0)
}

fn level_suffix(level: &serde_json::Value) -> Option<String> {
    let text = match level {
        serde_json::Value::Number(n) => n.as_i64().filter(|&l| l >= 0)?.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    (!text.is_empty() && text != "unknown").then_some(text)
}

fn layout_from_channels(channels: u32) -> Option<String> {
    match channels {
        1 => Some("mono".to_string()),
        2 => Some("stereo".to_string()),
        _ => None,
    }
}

/// Parse ffprobe JSON output into a ProbeReport.
pub fn parse_ffprobe_json(json: &str) -> Result<ProbeReport, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::parse(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let format = output.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);
    let size = format
        .and_then(|f| f.size.as_ref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    let format_bit_rate = format
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(parse_bit_rate);
    let container = format.and_then(|f| f.format_name.clone());

    let streams = output.streams.unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| VideoStreamInfo {
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            fps: s.r_frame_rate.as_deref().and_then(parse_frame_rate),
            codec: s.codec_name.clone(),
            pixel_format: s.pix_fmt.clone(),
            profile: s.profile.as_ref().map(|profile| {
                match s.level.as_ref().and_then(level_suffix) {
                    Some(level) => format!("{} {}", profile, level),
                    None => profile.clone(),
                }
            }),
            bit_rate: s.bit_rate.as_deref().and_then(parse_bit_rate),
        });
    let audio_stream = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let audio_bit_rate = audio_stream
        .and_then(|s| s.bit_rate.as_deref())
        .and_then(parse_bit_rate);
    let audio = audio_stream.map(|s| {
        let channels = s.channels.unwrap_or(0);
        AudioDetails {
            sample_rate: s
                .sample_rate
                .as_deref()
                .and_then(|r| r.trim().parse().ok())
                .unwrap_or(0),
            channels,
            channel_layout: s
                .channel_layout
                .clone()
                .filter(|l| !l.is_empty())
                .or_else(|| layout_from_channels(channels)),
            codec: s.codec_name.clone(),
            sample_format: s.sample_fmt.clone(),
        }
    });

    Ok(ProbeReport {
        duration,
        size,
        container,
        format_bit_rate,
        video,
        audio,
        audio_bit_rate,
    })
}

/// Run ffprobe on a media file and return the parsed report.
///
/// A corrupt or unreadable file is a normal outcome here: it comes back as
/// `ToolFailed` (non-zero exit) or `Parse`, never as a panic.
pub async fn probe_media(path: &Path, timeout: Option<Duration>) -> Result<ProbeReport, AppError> {
    let ffprobe = get_ffprobe_path()?;
    log::debug!(
        target: "media_preview::ffmpeg::ffprobe",
        "probe_media: path={}",
        path.display()
    );
    let output = run_tool("ffprobe", &ffprobe, build_probe_args(path), timeout).await?;
    let json = String::from_utf8(output.stdout)
        .map_err(|_| AppError::parse("ffprobe output was not valid UTF-8"))?;
    parse_ffprobe_json(&json)
}
