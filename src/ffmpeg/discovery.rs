//! Locating the ffmpeg/ffprobe binaries.
//!
//! Lookup order: `FFMPEG_PATH`, well-known install directories, the `PATH` search,
//! then a copy shipped next to the running executable. The result is cached for the
//! life of the process. ffprobe is always taken from ffmpeg's directory.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::error::AppError;

pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

const INSTALL_HINT: &str = "FFmpeg not found. Install it or set FFMPEG_PATH:\n  - macOS: brew install ffmpeg\n  - Linux: sudo apt install ffmpeg\n  - Windows: https://ffmpeg.org/download.html";

static FFMPEG: OnceLock<PathBuf> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Env,
    InstallDir,
    SearchPath,
    Bundled,
}

fn exe_name(base: &str) -> String {
    if cfg!(windows) {
        format!("{base}.exe")
    } else {
        base.to_string()
    }
}

fn install_dirs() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["/opt/homebrew/bin", "/usr/local/bin", "/opt/local/bin"]
    } else if cfg!(windows) {
        &["C:\\ffmpeg\\bin", "C:\\Program Files\\ffmpeg\\bin"]
    } else if cfg!(unix) {
        &["/usr/bin", "/usr/local/bin"]
    } else {
        &[]
    }
}

fn search_path(program: &str) -> Option<PathBuf> {
    let finder = if cfg!(windows) { "where" } else { "which" };
    let output = Command::new(finder).arg(program).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

fn next_to_current_exe(program: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(exe_name(program)))
}

fn locate_ffmpeg() -> Option<(PathBuf, Source)> {
    let from_env = std::env::var_os(FFMPEG_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_file())
        .map(|p| (p, Source::Env));

    from_env
        .or_else(|| {
            install_dirs()
                .iter()
                .map(|dir| Path::new(dir).join(exe_name("ffmpeg")))
                .find(|p| p.is_file())
                .map(|p| (p, Source::InstallDir))
        })
        .or_else(|| {
            search_path("ffmpeg")
                .filter(|p| p.is_file())
                .map(|p| (p, Source::SearchPath))
        })
        .or_else(|| {
            next_to_current_exe("ffmpeg")
                .filter(|p| p.is_file())
                .map(|p| (p, Source::Bundled))
        })
}

/// Resolved ffmpeg binary. A failed lookup is not cached, so installing ffmpeg while the
/// process runs is picked up on the next call.
pub fn get_ffmpeg_path() -> Result<&'static Path, AppError> {
    if let Some(path) = FFMPEG.get() {
        return Ok(path.as_path());
    }
    let Some((path, source)) = locate_ffmpeg() else {
        log::error!(
            target: "media_preview::ffmpeg::discovery",
            "ffmpeg not found (env, install dirs, PATH, bundled)"
        );
        return Err(AppError::ToolNotFound(INSTALL_HINT.to_string()));
    };
    log::debug!(
        target: "media_preview::ffmpeg::discovery",
        "ffmpeg resolved via {:?}: {}",
        source,
        path.display()
    );
    Ok(FFMPEG.get_or_init(|| path).as_path())
}

/// ffprobe paths to try beside `ffmpeg_path`. A target-suffixed bundle such as
/// `ffmpeg-x86_64-pc-windows-msvc.exe` pairs with the same-suffixed ffprobe first.
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let Some(dir) = ffmpeg_path.parent() else {
        return Vec::new();
    };
    let suffix = ffmpeg_path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.strip_prefix("ffmpeg"))
        .filter(|s| !s.is_empty());

    suffix
        .map(|s| dir.join(exe_name(&format!("ffprobe{s}"))))
        .into_iter()
        .chain(std::iter::once(dir.join(exe_name("ffprobe"))))
        .collect()
}

pub fn get_ffprobe_path() -> Result<PathBuf, AppError> {
    let ffmpeg = get_ffmpeg_path()?;
    ffprobe_candidates(ffmpeg)
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| {
            AppError::ToolNotFound(format!("ffprobe not found next to {}", ffmpeg.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn plain_ffmpeg_pairs_with_plain_ffprobe() {
        assert_eq!(
            ffprobe_candidates(Path::new("/usr/bin/ffmpeg")),
            vec![PathBuf::from("/usr/bin/ffprobe")]
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn suffixed_bundle_tries_suffixed_ffprobe_first() {
        assert_eq!(
            ffprobe_candidates(Path::new("/app/bin/ffmpeg-aarch64-apple-darwin")),
            vec![
                PathBuf::from("/app/bin/ffprobe-aarch64-apple-darwin"),
                PathBuf::from("/app/bin/ffprobe"),
            ]
        );
    }

    #[cfg(windows)]
    #[test]
    fn windows_candidates_keep_exe_suffix() {
        assert_eq!(
            ffprobe_candidates(Path::new("C:\\bin\\ffmpeg.exe")),
            vec![PathBuf::from("C:\\bin\\ffprobe.exe")]
        );
    }

    #[test]
    fn no_parent_means_no_candidates() {
        assert!(ffprobe_candidates(Path::new("")).is_empty());
    }

    #[test]
    fn install_dirs_are_absolute() {
        assert!(install_dirs().iter().all(|d| Path::new(d).is_absolute()));
    }
}
