//! Shared playlist state. Every component publishes into it through whole-record merges.
//!
//! Ingestion results are published by path rather than by index: an entry removed while its
//! ingestion is in flight simply stops matching, and duplicate imports of one path share the
//! result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use tokio::sync::broadcast;

use crate::media::{MediaKind, MediaMetadata};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum IngestState {
    #[default]
    Unprocessed,
    InFlight,
    Complete,
    Failed,
}

/// Encoded JPEG preview plus where it lives in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thumbnail {
    pub path: PathBuf,
    #[serde(rename = "dataUri", serialize_with = "serialize_data_uri")]
    pub bytes: Arc<[u8]>,
}

fn serialize_data_uri<S: Serializer>(bytes: &Arc<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)))
}

/// In/out marks in seconds. When both are set, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TrimRange {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl TrimRange {
    /// Mark-in at `t`. A mark-in at or past the current mark-out drops the mark-out.
    pub fn mark_in(&mut self, t: f64) {
        if self.end.is_some_and(|end| t >= end) {
            self.end = None;
        }
        self.start = Some(t);
    }

    /// Mark-out at `t`. A mark-out at or before the current mark-in drops the mark-in.
    pub fn mark_out(&mut self, t: f64) {
        if self.start.is_some_and(|start| t <= start) {
            self.start = None;
        }
        self.end = Some(t);
    }

    pub fn clear(&mut self) {
        *self = TrimRange::default();
    }

    /// Clip length when both marks are set.
    pub fn duration(&self) -> Option<f64> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub path: PathBuf,
    pub display_name: String,
    pub kind: Option<MediaKind>,
    pub metadata: Option<MediaMetadata>,
    pub thumbnail: Option<Thumbnail>,
    pub ingest_state: IngestState,
    pub trim: TrimRange,
}

impl MediaEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        Self {
            path,
            display_name,
            kind: None,
            metadata: None,
            thumbnail: None,
            ingest_state: IngestState::Unprocessed,
            trim: TrimRange::default(),
        }
    }

    /// Images need no stream fields. Audio and video need a metadata record shaped for
    /// their kind; a record from an older pipeline version that lacks it does not count.
    pub fn has_expected_metadata(&self) -> bool {
        match self.kind {
            Some(MediaKind::Image) => true,
            Some(kind) => self.metadata.as_ref().is_some_and(|m| m.kind() == kind),
            None => false,
        }
    }

    /// What the playlist observer schedules: never-ingested entries, plus Complete entries
    /// whose metadata record is present but structurally stale. Entries restored from the
    /// thumbnail cache without metadata are left alone so they do not cycle forever.
    pub fn needs_processing(&self) -> bool {
        match self.ingest_state {
            IngestState::Unprocessed => true,
            IngestState::Complete => self.metadata.is_some() && !self.has_expected_metadata(),
            IngestState::InFlight | IngestState::Failed => false,
        }
    }
}

/// Partial update merged into every entry it targets. `None` fields leave the entry untouched.
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub ingest_state: Option<IngestState>,
    pub kind: Option<MediaKind>,
    pub metadata: Option<MediaMetadata>,
    pub thumbnail: Option<Thumbnail>,
}

impl EntryUpdate {
    pub fn state(state: IngestState) -> Self {
        Self {
            ingest_state: Some(state),
            ..Self::default()
        }
    }

    fn apply(&self, entry: &mut MediaEntry) {
        if let Some(state) = self.ingest_state {
            entry.ingest_state = state;
        }
        // Kind is set once.
        if entry.kind.is_none() {
            entry.kind = self.kind;
        }
        if let Some(metadata) = &self.metadata {
            entry.metadata = Some(metadata.clone());
        }
        if let Some(thumbnail) = &self.thumbnail {
            entry.thumbnail = Some(thumbnail.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaylistEvent {
    Added { index: usize, entry: MediaEntry },
    Updated { index: usize, entry: MediaEntry },
    Removed { index: usize, path: PathBuf },
}

/// Cloneable handle to the one playlist.
#[derive(Clone)]
pub struct Playlist {
    entries: Arc<RwLock<Vec<MediaEntry>>>,
    events: broadcast::Sender<PlaylistEvent>,
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}

impl Playlist {
    pub fn new() -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: PlaylistEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Append entries; returns their indices. Duplicate paths get their own entries.
    pub fn add<I, P>(&self, paths: I) -> Vec<usize>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let added: Vec<(usize, MediaEntry)> = {
            let mut guard = self.entries.write();
            paths
                .into_iter()
                .map(|p| {
                    let entry = MediaEntry::new(p);
                    guard.push(entry.clone());
                    (guard.len() - 1, entry)
                })
                .collect()
        };
        let indices = added.iter().map(|(i, _)| *i).collect();
        for (index, entry) in added {
            self.emit(PlaylistEvent::Added { index, entry });
        }
        indices
    }

    pub fn remove(&self, index: usize) -> Option<MediaEntry> {
        let removed = {
            let mut guard = self.entries.write();
            (index < guard.len()).then(|| guard.remove(index))
        }?;
        self.emit(PlaylistEvent::Removed {
            index,
            path: removed.path.clone(),
        });
        Some(removed)
    }

    pub fn get(&self, index: usize) -> Option<MediaEntry> {
        self.entries.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<MediaEntry> {
        self.entries.read().clone()
    }

    /// Merge `update` into every entry for `path`. Returns how many entries matched;
    /// zero means the entry was removed meanwhile and the write is dropped.
    pub fn publish(&self, path: &Path, update: &EntryUpdate) -> usize {
        let updated: Vec<(usize, MediaEntry)> = {
            let mut guard = self.entries.write();
            guard
                .iter_mut()
                .enumerate()
                .filter(|(_, e)| e.path == path)
                .map(|(i, e)| {
                    update.apply(e);
                    (i, e.clone())
                })
                .collect()
        };
        if updated.is_empty() {
            log::debug!(
                target: "media_preview::playlist",
                "publish dropped, no entry for {}",
                path.display()
            );
        }
        let count = updated.len();
        for (index, entry) in updated {
            self.emit(PlaylistEvent::Updated { index, entry });
        }
        count
    }

    /// Read-modify-write on one entry by index. Returns false for a stale index.
    pub fn modify(&self, index: usize, f: impl FnOnce(&mut MediaEntry)) -> bool {
        let entry = {
            let mut guard = self.entries.write();
            let Some(entry) = guard.get_mut(index) else {
                return false;
            };
            f(entry);
            entry.clone()
        };
        self.emit(PlaylistEvent::Updated { index, entry });
        true
    }

    pub fn set_mark_in(&self, index: usize, t: f64) -> bool {
        self.modify(index, |e| e.trim.mark_in(t))
    }

    pub fn set_mark_out(&self, index: usize, t: f64) -> bool {
        self.modify(index, |e| e.trim.mark_out(t))
    }

    pub fn clear_marks(&self, index: usize) -> bool {
        self.modify(index, |e| e.trim.clear())
    }
}
