use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use media_preview_core::error::AppError;
use media_preview_core::ffmpeg::{parse_tool_error, probe_media};
use media_preview_core::ingest::IngestCoordinator;
use media_preview_core::playlist::{Playlist, PlaylistEvent};
use media_preview_core::sync::{PlaybackEvent, PlaybackTicker, TimeSink, TimeSynchronizer};
use media_preview_core::{IngestOptions, SyncOptions};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigureParams {
    #[serde(default)]
    ingest: Option<IngestOptions>,
    #[serde(default)]
    sync: Option<SyncOptions>,
}

#[derive(Debug, Deserialize)]
struct PathsParams {
    paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct IndexParams {
    index: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TrimAction {
    In,
    Out,
    Clear,
}

#[derive(Debug, Deserialize)]
struct TrimParams {
    index: usize,
    action: TrimAction,
    #[serde(default)]
    time: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectParams {
    input_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SeekParams {
    time: f64,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    let _ = write_json_line_shared(writer, &message);
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::ToolFailed { code, stderr, .. } if *code == -1 => RpcErrorPayload {
            summary: stderr.clone(),
            detail: stderr.clone(),
        },
        AppError::ToolFailed { tool, code, stderr } => {
            let parsed = parse_tool_error(tool, stderr, Some(*code));
            RpcErrorPayload {
                summary: parsed.summary,
                detail: parsed.detail,
            }
        }
        _ => {
            let text = err.to_string();
            RpcErrorPayload {
                summary: text.clone(),
                detail: text,
            }
        }
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::parse(format!("Invalid params payload: {}", e)))
}

fn to_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::parse(format!("Failed to serialize {}: {}", what, e)))
}

fn write_response(writer: &SharedWriter, id: u64, result: Result<Value, AppError>) {
    let written = match result {
        Ok(result) => write_json_line_shared(writer, &RpcSuccess { id, result }),
        Err(err) => {
            log::debug!(target: "media_preview::sidecar", "request {} failed: {}", id, err);
            write_json_line_shared(
                writer,
                &RpcFailure {
                    id,
                    error: parse_error_payload(&err),
                },
            )
        }
    };
    if let Err(err) = written {
        log::error!(target: "media_preview::sidecar", "failed to write response {}: {}", id, err);
    }
}

/// Failure for a line that never became a request; id 0 since none was parsed.
fn reject_line(writer: &SharedWriter, summary: &str, err: impl std::fmt::Display) {
    log::warn!(target: "media_preview::sidecar", "{}: {}", summary, err);
    let failure = RpcFailure {
        id: 0,
        error: RpcErrorPayload {
            summary: summary.to_string(),
            detail: err.to_string(),
        },
    };
    let _ = write_json_line_shared(writer, &failure);
}

fn playlist_event_name(event: &PlaylistEvent) -> &'static str {
    match event {
        PlaylistEvent::Added { .. } => "playlist.entry.added",
        PlaylistEvent::Updated { .. } => "playlist.entry.updated",
        PlaylistEvent::Removed { .. } => "playlist.entry.removed",
    }
}

fn forward_playlist_events(playlist: &Playlist, writer: SharedWriter) {
    let mut rx = playlist.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = playlist_event_name(&event);
                    match serde_json::to_value(&event) {
                        Ok(payload) => emit_rpc_event(&writer, name, payload),
                        Err(e) => log::error!(
                            target: "media_preview::sidecar",
                            "failed to serialize {}: {}",
                            name,
                            e
                        ),
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    log::warn!(target: "media_preview::sidecar", "dropped {} playlist events", n);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn make_ticker(options: &SyncOptions, writer: &SharedWriter) -> PlaybackTicker {
    let writer = Arc::clone(writer);
    let sink: TimeSink =
        Arc::new(move |t| emit_rpc_event(&writer, "playback.time", json!({ "visualTime": t })));
    PlaybackTicker::new(TimeSynchronizer::with_system_clock(options), options, sink)
}

struct Sidecar {
    writer: SharedWriter,
    playlist: Playlist,
    coordinator: Mutex<IngestCoordinator>,
    ticker: Mutex<PlaybackTicker>,
}

impl Sidecar {
    fn new(writer: SharedWriter) -> Self {
        let playlist = Playlist::new();
        let coordinator = IngestCoordinator::with_ffmpeg(playlist.clone(), IngestOptions::default());
        let ticker = make_ticker(&SyncOptions::default(), &writer);
        Self {
            writer,
            playlist,
            coordinator: Mutex::new(coordinator),
            ticker: Mutex::new(ticker),
        }
    }

    fn coordinator(&self) -> IngestCoordinator {
        self.coordinator.lock().clone()
    }

    /// Kick the ingestion sweep in the background; results arrive as playlist events.
    fn schedule_pending(&self) {
        let coordinator = self.coordinator();
        tokio::spawn(async move {
            let outcomes = coordinator.process_pending().await;
            log::debug!(
                target: "media_preview::sidecar",
                "ingestion sweep finished: {} submission(s)",
                outcomes.len()
            );
        });
    }

    fn handle(self: &Arc<Self>, request: RpcRequest) {
        let RpcRequest { id, method, params } = request;
        match method.as_str() {
            // Requests that wait on external tools answer from a task.
            "playlist.rescan" => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let outcomes = this.coordinator().rescan().await;
                    write_response(&this.writer, id, Ok(json!({ "submitted": outcomes.len() })));
                });
            }
            "media.inspect" => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let result = this.inspect(params).await;
                    write_response(&this.writer, id, result);
                });
            }
            _ => {
                let result = self.dispatch_sync(&method, params);
                write_response(&self.writer, id, result);
            }
        }
    }

    async fn inspect(&self, params: Value) -> Result<Value, AppError> {
        let parsed: InspectParams = params_from_value(params)?;
        let report = probe_media(&parsed.input_path, None).await?;
        let kind = report.classify(&parsed.input_path);
        to_value(report.into_metadata(kind), "metadata")
    }

    fn dispatch_sync(&self, method: &str, params: Value) -> Result<Value, AppError> {
        match method {
            "app.configure" => {
                let parsed: ConfigureParams = params_from_value(params)?;
                let mut result = json!({});
                if let Some(ingest) = parsed.ingest {
                    let cache_dir = ingest.effective_cache_dir();
                    *self.coordinator.lock() =
                        IngestCoordinator::with_ffmpeg(self.playlist.clone(), ingest);
                    result["cacheDir"] = json!(cache_dir.display().to_string());
                }
                if let Some(sync) = parsed.sync {
                    let mut ticker = self.ticker.lock();
                    let was_playing = ticker.is_playing();
                    let position = ticker.visual_time();
                    *ticker = make_ticker(&sync, &self.writer);
                    ticker.seek(position);
                    if was_playing {
                        ticker.play();
                    }
                }
                Ok(result)
            }
            "playlist.add" => {
                let parsed: PathsParams = params_from_value(params)?;
                let indices = self.playlist.add(parsed.paths);
                self.schedule_pending();
                Ok(json!({ "indices": indices }))
            }
            "playlist.remove" => {
                let parsed: IndexParams = params_from_value(params)?;
                let removed = self.playlist.remove(parsed.index).is_some();
                Ok(json!({ "removed": removed }))
            }
            "playlist.list" => to_value(self.playlist.snapshot(), "playlist"),
            "playlist.trim" => {
                let parsed: TrimParams = params_from_value(params)?;
                let time = || {
                    parsed
                        .time
                        .filter(|t| t.is_finite() && *t >= 0.0)
                        .ok_or_else(|| AppError::parse("trim mark requires a time"))
                };
                let updated = match parsed.action {
                    TrimAction::In => self.playlist.set_mark_in(parsed.index, time()?),
                    TrimAction::Out => self.playlist.set_mark_out(parsed.index, time()?),
                    TrimAction::Clear => self.playlist.clear_marks(parsed.index),
                };
                if !updated {
                    return Err(AppError::parse(format!("Unknown index: {}", parsed.index)));
                }
                let trim = self.playlist.get(parsed.index).map(|e| e.trim);
                to_value(trim, "trim")
            }
            "playback.heartbeat" => {
                let event: PlaybackEvent = params_from_value(params)?;
                let mut ticker = self.ticker.lock();
                ticker.on_event(event);
                Ok(json!({ "visualTime": ticker.visual_time(), "playing": ticker.is_playing() }))
            }
            "playback.seek" => {
                let parsed: SeekParams = params_from_value(params)?;
                let mut ticker = self.ticker.lock();
                ticker.seek(parsed.time);
                Ok(json!({ "visualTime": ticker.visual_time() }))
            }
            "playback.play" => {
                self.ticker.lock().play();
                Ok(json!({ "playing": true }))
            }
            "playback.pause" => {
                let mut ticker = self.ticker.lock();
                ticker.pause();
                Ok(json!({ "playing": false, "visualTime": ticker.visual_time() }))
            }
            _ => Err(AppError::parse(format!("Unknown method: {}", method))),
        }
    }
}

fn main() -> io::Result<()> {
    // stdout is the RPC channel; logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let enter = runtime.enter();

    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let sidecar = Arc::new(Sidecar::new(Arc::clone(&stdout)));
    forward_playlist_events(&sidecar.playlist, Arc::clone(&stdout));

    let cache = sidecar.coordinator().cache().clone();
    runtime.spawn(async move {
        cache.cleanup_stale_temp_files().await;
    });

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                reject_line(&stdout, "Invalid input stream", err);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                reject_line(&stdout, "Invalid request", err);
                continue;
            }
        };

        sidecar.handle(request);
    }

    log::info!(target: "media_preview::sidecar", "stdin closed, shutting down");
    sidecar.ticker.lock().pause();
    drop(enter);
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));
    Ok(())
}
