//! Argument lists for ffprobe/ffmpeg invocations.

use std::ffi::OsString;
use std::path::Path;

/// Fields requested from ffprobe. Anything not listed here is absent from the JSON.
const PROBE_ENTRIES: &str = "format=duration,size,bit_rate,format_name:stream=codec_type,width,height,sample_rate,r_frame_rate,codec_name,channels,channel_layout,pix_fmt,profile,level,sample_fmt,bit_rate";

/// Paths are passed through as `OsString`, so names that are not valid UTF-8 reach the
/// tool byte for byte.
pub fn build_probe_args(input: &Path) -> Vec<OsString> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        PROBE_ENTRIES.into(),
        "-print_format".into(),
        "json".into(),
        input.as_os_str().to_owned(),
    ]
}

/// Seek offset for ffmpeg's `-ss`, formatted without float noise ("1", "0.5").
fn format_offset(seconds: f64) -> String {
    let ms = (seconds.max(0.0) * 1000.0).round() as u64;
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        format!("{}.{:03}", ms / 1000, ms % 1000)
            .trim_end_matches('0')
            .to_string()
    }
}

/// Single scaled frame at `offset_secs`. `-y` gives overwrite semantics so a retry is always safe;
/// `scale=W:-1` keeps aspect ratio.
pub fn build_thumbnail_args(
    input: &Path,
    offset_secs: f64,
    width: u32,
    quality: u32,
    output: &Path,
) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-ss".into(),
        format_offset(offset_secs).into(),
        "-i".into(),
        input.as_os_str().to_owned(),
        "-vframes".into(),
        "1".into(),
        "-vf".into(),
        format!("scale={}:-1", width).into(),
        "-q:v".into(),
        quality.to_string().into(),
        output.as_os_str().to_owned(),
    ]
}

/// Multi-line, shell-ish rendering for debug logs.
pub fn format_args_for_display_multiline(args: &[OsString]) -> String {
    let mut out = String::new();
    let mut iter = args.iter().map(|a| a.to_string_lossy()).peekable();
    while let Some(arg) = iter.next() {
        if !out.is_empty() {
            out.push_str(" \\\n  ");
        }
        out.push_str(&quote(&arg));
        if arg.starts_with('-')
            && let Some(next) = iter.next_if(|next| !next.starts_with('-'))
        {
            out.push(' ');
            out.push_str(&quote(&next));
        }
    }
    out
}

fn quote(arg: &str) -> String {
    if arg.contains(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(args: &[OsString]) -> Vec<&str> {
        args.iter().map(|a| a.to_str().unwrap()).collect()
    }

    #[test]
    fn probe_args_request_json_with_stream_entries() {
        let args = build_probe_args(Path::new("/media/in.mp4"));
        let args = strs(&args);
        assert_eq!(args.last(), Some(&"/media/in.mp4"));
        let fmt = args.iter().position(|a| *a == "-print_format").unwrap();
        assert_eq!(args[fmt + 1], "json");
        assert!(args.iter().any(|a| a.contains("r_frame_rate")));
    }

    #[test]
    fn thumbnail_args_seek_scale_and_overwrite() {
        let args = build_thumbnail_args(
            Path::new("/media/in.mov"),
            1.0,
            320,
            4,
            Path::new("/cache/thumbnails/abc.jpg"),
        );
        let args = strs(&args);
        assert_eq!(args[0], "-y");
        assert_eq!(args[1..3], ["-ss", "1"]);
        assert!(args.contains(&"scale=320:-1"));
        let q = args.iter().position(|a| *a == "-q:v").unwrap();
        assert_eq!(args[q + 1], "4");
        assert_eq!(args.last(), Some(&"/cache/thumbnails/abc.jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_pass_through_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let input = Path::new(OsStr::from_bytes(b"/media/caf\xe9.mp4"));
        let output = Path::new(OsStr::from_bytes(b"/cache/\xff\xfe.tmp.jpg"));

        let probe = build_probe_args(input);
        assert_eq!(probe.last().map(|a| a.as_bytes()), Some(&b"/media/caf\xe9.mp4"[..]));

        let thumb = build_thumbnail_args(input, 0.0, 320, 4, output);
        assert!(thumb.iter().any(|a| a.as_bytes() == b"/media/caf\xe9.mp4"));
        assert_eq!(thumb.last().map(|a| a.as_bytes()), Some(&b"/cache/\xff\xfe.tmp.jpg"[..]));
    }

    #[test]
    fn offset_formatting() {
        assert_eq!(format_offset(0.0), "0");
        assert_eq!(format_offset(1.0), "1");
        assert_eq!(format_offset(2.5), "2.5");
        assert_eq!(format_offset(-3.0), "0");
    }

    #[test]
    fn display_pairs_flags_with_values() {
        let args: Vec<OsString> = ["-y", "-i", "/a b.mp4", "out.jpg"]
            .iter()
            .map(OsString::from)
            .collect();
        assert_eq!(
            format_args_for_display_multiline(&args),
            "-y \\\n  -i \"/a b.mp4\" \\\n  out.jpg"
        );
    }
}
