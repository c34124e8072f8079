//! Playback time synchronizer.
//!
//! The native player reports its position a few dozen times per second at irregular
//! intervals. The display wants a value every frame. Heartbeats set an anchor; every
//! frame the visual time is projected forward from the anchor and clamped so it never
//! runs backward. A heartbeat that disagrees with the display by more than the snap
//! threshold (a seek or a stall) replaces the visual time outright.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SyncOptions;

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock advanced by hand. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Buffering,
    Finished,
    Error,
}

/// Heartbeat from the native player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    pub current_time: f64,
    pub duration: f64,
    pub status: PlaybackStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncState {
    /// Last backend-reported position, seconds.
    pub anchor_time: f64,
    pub anchor_wall_clock: Instant,
    /// Last value handed to the display.
    pub visual_time: f64,
}

pub struct TimeSynchronizer<C: Clock = SystemClock> {
    clock: C,
    state: SyncState,
    snap_threshold: f64,
}

impl TimeSynchronizer<SystemClock> {
    pub fn with_system_clock(options: &SyncOptions) -> Self {
        Self::new(SystemClock, 0.0, options)
    }
}

impl<C: Clock> TimeSynchronizer<C> {
    pub fn new(clock: C, initial_time: f64, options: &SyncOptions) -> Self {
        let now = clock.now();
        let initial_time = if initial_time.is_finite() {
            initial_time.max(0.0)
        } else {
            0.0
        };
        Self {
            clock,
            state: SyncState {
                anchor_time: initial_time,
                anchor_wall_clock: now,
                visual_time: initial_time,
            },
            snap_threshold: options.effective_snap_threshold_secs(),
        }
    }

    pub fn visual_time(&self) -> f64 {
        self.state.visual_time
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Re-anchor on a backend report. Returns the new visual time when the drift
    /// exceeded the threshold and the display was hard-snapped.
    pub fn heartbeat(&mut self, backend_time: f64) -> Option<f64> {
        if !backend_time.is_finite() {
            log::warn!(target: "media_preview::sync", "ignoring non-finite heartbeat");
            return None;
        }
        self.state.anchor_time = backend_time;
        self.state.anchor_wall_clock = self.clock.now();

        let drift = (self.state.visual_time - backend_time).abs();
        if drift > self.snap_threshold {
            log::debug!(
                target: "media_preview::sync",
                "hard snap: visual={:.3}s backend={:.3}s drift={:.3}s",
                self.state.visual_time,
                backend_time,
                drift
            );
            self.state.visual_time = backend_time;
            Some(backend_time)
        } else {
            None
        }
    }

    /// One display frame: project from the anchor, never backward.
    pub fn tick(&mut self) -> f64 {
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(self.state.anchor_wall_clock)
            .as_secs_f64();
        let projected = self.state.anchor_time + elapsed;
        self.state.visual_time = projected.max(self.state.visual_time);
        self.state.visual_time
    }

    /// Restart projection from the held visual time. Time spent paused does not count
    /// toward the next tick.
    pub fn resume(&mut self) {
        self.state.anchor_time = self.state.visual_time;
        self.state.anchor_wall_clock = self.clock.now();
    }

    /// User-initiated seek: snap immediately regardless of drift and re-anchor there.
    pub fn seek(&mut self, time: f64) -> f64 {
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        self.state = SyncState {
            anchor_time: time,
            anchor_wall_clock: self.clock.now(),
            visual_time: time,
        };
        time
    }
}

pub type TimeSink = Arc<dyn Fn(f64) + Send + Sync>;

/// Drives a synchronizer at display rate on a tokio task while playing.
///
/// The frame task exists only between `play` and `pause` and is aborted on drop.
pub struct PlaybackTicker<C: Clock = SystemClock> {
    sync: Arc<Mutex<TimeSynchronizer<C>>>,
    sink: TimeSink,
    frame_interval: Duration,
    task: Option<JoinHandle<()>>,
    duration: f64,
}

impl<C: Clock> PlaybackTicker<C> {
    pub fn new(sync: TimeSynchronizer<C>, options: &SyncOptions, sink: TimeSink) -> Self {
        Self {
            sync: Arc::new(Mutex::new(sync)),
            sink,
            frame_interval: options.effective_frame_interval(),
            task: None,
            duration: 0.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn visual_time(&self) -> f64 {
        self.sync.lock().visual_time()
    }

    /// Media duration from the last heartbeat.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Start the frame loop. Must be called inside a tokio runtime.
    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }
        self.sync.lock().resume();
        let sync = Arc::clone(&self.sync);
        let sink = Arc::clone(&self.sink);
        let frame_interval = self.frame_interval;
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(frame_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let t = sync.lock().tick();
                sink(t);
            }
        }));
        log::debug!(target: "media_preview::sync", "ticker started");
    }

    /// Stop the frame loop; visual time holds until the next heartbeat or seek.
    pub fn pause(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!(target: "media_preview::sync", "ticker stopped");
        }
    }

    pub fn seek(&mut self, time: f64) {
        let t = self.sync.lock().seek(time);
        (self.sink)(t);
    }

    /// Apply a backend heartbeat. Frames only advance while the backend says Playing;
    /// buffering, pause, end and error all hold the display.
    pub fn on_event(&mut self, event: PlaybackEvent) {
        if event.duration.is_finite() && event.duration >= 0.0 {
            self.duration = event.duration;
        }
        // Resume before anchoring so the heartbeat's position wins over the held one.
        match event.status {
            PlaybackStatus::Playing => self.play(),
            PlaybackStatus::Paused
            | PlaybackStatus::Buffering
            | PlaybackStatus::Finished
            | PlaybackStatus::Error => self.pause(),
        }
        let snapped = self.sync.lock().heartbeat(event.current_time);
        if let Some(t) = snapped {
            (self.sink)(t);
        }
    }
}

impl<C: Clock> Drop for PlaybackTicker<C> {
    fn drop(&mut self) {
        self.pause();
    }
}
