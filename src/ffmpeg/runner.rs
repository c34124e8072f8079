//! External tool process spawning.
//!
//! Spawns ffmpeg/ffprobe as a tokio child process and awaits completion without
//! blocking the runtime. The child is killed if the awaiting future is dropped,
//! which is how the optional timeout tears down a hung tool.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::AppError;

/// Keep only the last N bytes of stderr to avoid unbounded memory growth.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Captured output of a successful tool run.
#[derive(Debug, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

fn tail_lossy(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(MAX_STDERR_BYTES);
    String::from_utf8_lossy(&bytes[start..]).to_string()
}

/// Run `program` with `args` and wait for it to exit.
///
/// - Exit code 0 returns captured stdout/stderr.
/// - Non-zero exit (or death by signal, reported as -1) returns `ToolFailed`.
/// - When `timeout` is set and expires, the child is killed and `TimedOut` is returned.
pub async fn run_tool<I, S>(
    tool: &'static str,
    program: &Path,
    args: I,
    timeout: Option<Duration>,
) -> Result<ToolOutput, AppError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    log::debug!(
        target: "media_preview::ffmpeg::runner",
        "Spawning {}: path={}, args={:?}",
        tool,
        program.display(),
        args
    );

    let mut cmd = Command::new(program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW

    let child = cmd
        .spawn()
        .map_err(|e| AppError::tool_failed(tool, -1, format!("Failed to spawn {}: {}", tool, e)))?;

    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(res) => res,
            Err(_) => {
                log::warn!(
                    target: "media_preview::ffmpeg::runner",
                    "{} exceeded {:?}; killing",
                    tool,
                    limit
                );
                return Err(AppError::TimedOut {
                    tool,
                    secs: limit.as_secs(),
                });
            }
        },
        None => child.wait_with_output().await,
    };
    let output = waited.map_err(|e| AppError::tool_failed(tool, -1, e.to_string()))?;

    let stderr = tail_lossy(&output.stderr);
    if output.status.success() {
        log::trace!(
            target: "media_preview::ffmpeg::runner",
            "{} completed successfully",
            tool
        );
        Ok(ToolOutput {
            stdout: output.stdout,
            stderr,
        })
    } else {
        let code = output.status.code().unwrap_or(-1);
        let err_preview = stderr.lines().rev().take(3).collect::<Vec<_>>().join("; ");
        log::warn!(
            target: "media_preview::ffmpeg::runner",
            "{} failed (code={}): {}",
            tool,
            code,
            err_preview
        );
        Err(AppError::tool_failed(tool, code, stderr))
    }
}
