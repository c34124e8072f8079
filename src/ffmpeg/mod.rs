mod builder;
pub mod discovery;
mod error;
pub mod ffprobe;
mod runner;

pub use builder::{build_probe_args, build_thumbnail_args, format_args_for_display_multiline};
pub use error::{ToolErrorPayload, parse_tool_error};
pub use ffprobe::{ProbeReport, probe_media};
pub use runner::{ToolOutput, run_tool};
