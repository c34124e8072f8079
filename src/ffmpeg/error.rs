//! Map FFmpeg/ffprobe exit codes to user-friendly messages.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (resource limit),
//! 123 (hard exit), 255 (signal). -1 is used for spawn failure or a
//! process killed by a signal before reporting a code.
//! Stderr is kept as detail for debugging.

use serde::Serialize;

/// Payload for tool error events. Frontend shows summary; detail is expandable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// Maps a tool exit code to a short user-facing summary. Stderr is passed through as detail.
pub fn parse_tool_error(tool: &str, stderr: &str, exit_code: Option<i32>) -> ToolErrorPayload {
    let summary = match exit_code {
        Some(code) => match known_exit_code_summary(tool, code) {
            Some(msg) => msg,
            None => format!("{} failed (exit code {}).", tool, code),
        },
        None => first_line_truncated(stderr, 120),
    };
    let detail = stderr.trim().to_string();
    ToolErrorPayload { summary, detail }
}

fn known_exit_code_summary(tool: &str, code: i32) -> Option<String> {
    match code {
        -1 => Some(format!("{} not found or failed to start.", tool)),
        1 => Some(format!("{} failed.", tool)),
        69 => Some(format!("{} hit a resource limit.", tool)),
        123 | 255 => Some(format!("{} was stopped.", tool)),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

/// First non-empty line of stderr, truncated to `max_len` bytes (adding "…" if truncated).
fn first_line_truncated(stderr: &str, max_len: usize) -> String {
    let first = stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim())
        .unwrap_or(stderr);
    if first.len() <= max_len {
        return first.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while !first.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &first[..cut], ELLIPSIS)
}
