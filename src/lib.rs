pub mod cache;
pub mod config;
pub mod content_id;
pub mod error;
pub mod ffmpeg;
pub mod ingest;
pub mod media;
pub mod playlist;
pub mod sync;
pub mod thumbnail;

pub use config::{IngestOptions, SyncOptions};
pub use ingest::{IngestCoordinator, SubmitOutcome};
pub use playlist::{IngestState, MediaEntry, Playlist, PlaylistEvent};
pub use sync::{PlaybackEvent, PlaybackStatus, PlaybackTicker, TimeSynchronizer};
