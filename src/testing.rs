//! In-memory sinks shared by the unit tests

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::encoder::{ContainerSink, ContainerStatus, FinalizeCallback, TrackSettings};
use crate::error::SinkError;
use crate::geometry::VideoOrientation;
use crate::pipeline::sender::delegate::WriterDelegate;
use crate::pipeline::types::{AudioSample, MediaKind, MediaSample, Timestamp, VideoSample};
use crate::stream::{EventKind, ListenerId, StreamClient, StreamEvent, StreamSettings};

// ── Container ───────────────────────────────────────────────────

#[derive(Default)]
struct ContainerState {
    tracks: Vec<TrackSettings>,
    samples: Vec<MediaSample>,
    status: ContainerStatus,
    session_start: Option<Timestamp>,
    video_blocked: bool,
    audio_blocked: bool,
    fail_start: bool,
    reject: Option<MediaKind>,
    last_error: Option<SinkError>,
    finalized: usize,
    cancels: usize,
    optimize_for_network: bool,
}

/// Container that keeps every appended sample in memory
///
/// Clones share state, so a test can box one clone into the writer and
/// inspect another.
#[derive(Clone, Default)]
pub struct MemoryContainer {
    state: Arc<Mutex<ContainerState>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn ContainerSink> {
        Box::new(self.clone())
    }

    /// Make `start_writing` fail
    pub fn fail_on_start(&self) {
        self.state.lock().fail_start = true;
    }

    /// Refuse `add_track` for `kind`
    pub fn reject_track(&self, kind: MediaKind) {
        self.state.lock().reject = Some(kind);
    }

    /// Simulate a write error surfacing mid-recording
    pub fn fail_now(&self, reason: &str) {
        let mut state = self.state.lock();
        state.status = ContainerStatus::Failed;
        state.last_error = Some(SinkError::Write {
            kind: MediaKind::Video,
            reason: reason.to_string(),
        });
    }

    pub fn set_ready(&self, kind: MediaKind, ready: bool) {
        let mut state = self.state.lock();
        match kind {
            MediaKind::Video => state.video_blocked = !ready,
            MediaKind::Audio => state.audio_blocked = !ready,
        }
    }

    pub fn tracks(&self) -> Vec<TrackSettings> {
        self.state.lock().tracks.clone()
    }

    pub fn video(&self) -> Vec<VideoSample> {
        self.state
            .lock()
            .samples
            .iter()
            .filter_map(|s| match s {
                MediaSample::Video(v) => Some(v.clone()),
                MediaSample::Audio(_) => None,
            })
            .collect()
    }

    pub fn audio(&self) -> Vec<AudioSample> {
        self.state
            .lock()
            .samples
            .iter()
            .filter_map(|s| match s {
                MediaSample::Audio(a) => Some(a.clone()),
                MediaSample::Video(_) => None,
            })
            .collect()
    }

    pub fn session_start(&self) -> Option<Timestamp> {
        self.state.lock().session_start
    }

    pub fn finalized(&self) -> usize {
        self.state.lock().finalized
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().cancels
    }

    pub fn optimize_for_network(&self) -> bool {
        self.state.lock().optimize_for_network
    }
}

impl ContainerSink for MemoryContainer {
    fn add_track(&mut self, settings: TrackSettings) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        if state.reject == Some(settings.kind()) {
            return Err(SinkError::TrackRejected {
                kind: settings.kind(),
                reason: "unsupported settings".into(),
            });
        }
        state.tracks.push(settings);
        Ok(())
    }

    fn is_ready_for_more_data(&self, kind: MediaKind) -> bool {
        let state = self.state.lock();
        if state.status != ContainerStatus::Writing {
            return false;
        }
        match kind {
            MediaKind::Video => !state.video_blocked,
            MediaKind::Audio => !state.audio_blocked,
        }
    }

    fn append(&mut self, sample: &MediaSample) -> bool {
        let mut state = self.state.lock();
        if state.status != ContainerStatus::Writing {
            return false;
        }
        state.samples.push(sample.clone());
        true
    }

    fn start_writing(&mut self) -> bool {
        let mut state = self.state.lock();
        if state.fail_start {
            state.status = ContainerStatus::Failed;
            state.last_error = Some(SinkError::Start("disk full".into()));
            return false;
        }
        state.status = ContainerStatus::Writing;
        true
    }

    fn start_session(&mut self, at: Timestamp) {
        self.state.lock().session_start = Some(at);
    }

    fn finalize(&mut self, on_complete: FinalizeCallback) {
        {
            let mut state = self.state.lock();
            state.finalized += 1;
            state.status = ContainerStatus::Completed;
        }
        on_complete(Ok(()));
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock();
        state.cancels += 1;
        state.status = ContainerStatus::Cancelled;
    }

    fn status(&self) -> ContainerStatus {
        self.state.lock().status
    }

    fn last_error(&self) -> Option<SinkError> {
        self.state.lock().last_error.clone()
    }

    fn set_optimize_for_network(&mut self, enabled: bool) {
        self.state.lock().optimize_for_network = enabled;
    }
}

// ── Stream client ───────────────────────────────────────────────

/// Passthrough controls recorded by [`MockStreamClient`]
#[derive(Debug, Clone, Default)]
pub struct ControlLog {
    pub zooms: Vec<(f64, bool, f64)>,
    pub video_bitrates: Vec<u32>,
    pub audio_bitrates: Vec<u32>,
    pub frame_rates: Vec<f64>,
    pub settings: Vec<StreamSettings>,
}

#[derive(Default)]
struct ClientState {
    connects: Vec<tokio::time::Instant>,
    publishes: Vec<String>,
    closes: usize,
    samples: Vec<MediaSample>,
    orientations: Vec<VideoOrientation>,
    listeners: Vec<(EventKind, ListenerId, mpsc::UnboundedSender<StreamEvent>)>,
    removed: Vec<(EventKind, ListenerId)>,
    paused: bool,
    torch: bool,
    controls: ControlLog,
}

/// Stream client that records calls and lets tests inject events
#[derive(Default)]
pub struct MockStreamClient {
    state: Mutex<ClientState>,
    next_id: AtomicU64,
}

impl MockStreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener registered for its kind
    pub fn emit(&self, event: StreamEvent) {
        let state = self.state.lock();
        for (kind, _, sink) in &state.listeners {
            if *kind == event.kind() {
                let _ = sink.send(event.clone());
            }
        }
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().connects.len()
    }

    pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
        self.state.lock().connects.clone()
    }

    pub fn publishes(&self) -> Vec<String> {
        self.state.lock().publishes.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    pub fn registered_listeners(&self) -> Vec<(EventKind, ListenerId)> {
        let mut ids: Vec<_> = self
            .state
            .lock()
            .listeners
            .iter()
            .map(|(kind, id, _)| (*kind, *id))
            .collect();
        ids.sort_by_key(|(_, id)| *id);
        ids
    }

    pub fn removed_listeners(&self) -> Vec<(EventKind, ListenerId)> {
        self.state.lock().removed.clone()
    }

    pub fn samples(&self) -> Vec<MediaSample> {
        self.state.lock().samples.clone()
    }

    pub fn video(&self) -> Vec<VideoSample> {
        self.samples()
            .into_iter()
            .filter_map(|s| match s {
                MediaSample::Video(v) => Some(v),
                MediaSample::Audio(_) => None,
            })
            .collect()
    }

    pub fn audio(&self) -> Vec<AudioSample> {
        self.samples()
            .into_iter()
            .filter_map(|s| match s {
                MediaSample::Audio(a) => Some(a),
                MediaSample::Video(_) => None,
            })
            .collect()
    }

    pub fn orientations(&self) -> Vec<VideoOrientation> {
        self.state.lock().orientations.clone()
    }

    pub fn controls(&self) -> ControlLog {
        self.state.lock().controls.clone()
    }
}

impl StreamClient for MockStreamClient {
    fn connect(&self, _uri: &str) {
        self.state.lock().connects.push(tokio::time::Instant::now());
    }

    fn close(&self) {
        self.state.lock().closes += 1;
    }

    fn publish(&self, stream_key: &str) {
        self.state.lock().publishes.push(stream_key.to_string());
    }

    fn append_sample(&self, sample: MediaSample) {
        self.state.lock().samples.push(sample);
    }

    fn set_orientation(&self, orientation: VideoOrientation) {
        self.state.lock().orientations.push(orientation);
    }

    fn configure(&self, settings: &StreamSettings) {
        self.state.lock().controls.settings.push(settings.clone());
    }

    fn add_listener(&self, kind: EventKind, sink: mpsc::UnboundedSender<StreamEvent>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.state.lock().listeners.push((kind, id, sink));
        id
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut state = self.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(k, i, _)| !(*k == kind && *i == id));
        let removed = state.listeners.len() != before;
        if removed {
            state.removed.push((kind, id));
        }
        removed
    }

    fn set_paused(&self, paused: bool) {
        self.state.lock().paused = paused;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn set_torch(&self, on: bool) {
        self.state.lock().torch = on;
    }

    fn torch(&self) -> bool {
        self.state.lock().torch
    }

    fn set_zoom_factor(&self, level: f64, ramping: bool, rate: f64) {
        self.state.lock().controls.zooms.push((level, ramping, rate));
    }

    fn set_video_bitrate(&self, bits_per_second: u32) {
        self.state.lock().controls.video_bitrates.push(bits_per_second);
    }

    fn set_audio_bitrate(&self, bits_per_second: u32) {
        self.state.lock().controls.audio_bitrates.push(bits_per_second);
    }

    fn set_frame_rate(&self, fps: f64) {
        self.state.lock().controls.frame_rates.push(fps);
    }
}

// ── Delegate ────────────────────────────────────────────────────

/// Delegate that remembers every callback
#[derive(Default)]
pub struct RecordingDelegate {
    failures: Mutex<Vec<(Option<SinkError>, String)>>,
    progress: Mutex<Vec<Duration>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failures(&self) -> Vec<(Option<SinkError>, String)> {
        self.failures.lock().clone()
    }

    pub fn progress(&self) -> Vec<Duration> {
        self.progress.lock().clone()
    }
}

impl WriterDelegate for RecordingDelegate {
    fn on_recording_failed(&self, error: Option<SinkError>, message: &str) {
        self.failures.lock().push((error, message.to_string()));
    }

    fn on_recording_progress(&self, duration: Duration) {
        self.progress.lock().push(duration);
    }
}
