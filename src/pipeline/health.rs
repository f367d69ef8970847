//! Health counters for the writer and the stream session

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for every routing decision the writer takes
///
/// Silent drops are the normal back-pressure mechanism of the container sink,
/// so they are counted here instead of being reported to the delegate.
/// All fields use atomic operations for thread-safe access.
#[derive(Debug, Default)]
pub struct WriterHealth {
    /// Video samples appended to the file container
    pub video_file_appends: AtomicU64,

    /// Video samples forwarded to the live stream
    pub video_stream_forwards: AtomicU64,

    /// Stand-by placeholder frames sent instead of live video
    pub placeholder_frames: AtomicU64,

    /// Audio samples appended to the file container
    pub audio_file_appends: AtomicU64,

    /// Audio samples forwarded to the live stream
    pub audio_stream_forwards: AtomicU64,

    /// Audio samples whose payload was zeroed because of mute
    pub silenced_audio: AtomicU64,

    /// Samples skipped because the container was not ready
    pub not_ready_drops: AtomicU64,

    /// Samples skipped because no session was running or the writer was inert
    pub inactive_drops: AtomicU64,

    /// Second attempts to anchor the session start
    pub double_starts: AtomicU64,

    /// Appends the container refused
    pub append_failures: AtomicU64,

    /// Ticks where the frame source had nothing to give
    pub missing_frames: AtomicU64,
}

impl WriterHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_video_file_append(&self) {
        self.video_file_appends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_video_stream_forward(&self, placeholder: bool) {
        self.video_stream_forwards.fetch_add(1, Ordering::Relaxed);
        if placeholder {
            self.placeholder_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_audio_file_append(&self) {
        self.audio_file_appends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_stream_forward(&self) {
        self.audio_stream_forwards.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_silenced_audio(&self) {
        self.silenced_audio.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_ready_drop(&self) {
        self.not_ready_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_inactive_drop(&self) {
        self.inactive_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_double_start(&self) {
        self.double_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_append_failure(&self) {
        self.append_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_missing_frame(&self) {
        self.missing_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn video_file_appends(&self) -> u64 {
        self.video_file_appends.load(Ordering::Relaxed)
    }

    pub fn video_stream_forwards(&self) -> u64 {
        self.video_stream_forwards.load(Ordering::Relaxed)
    }

    pub fn placeholder_frames(&self) -> u64 {
        self.placeholder_frames.load(Ordering::Relaxed)
    }

    pub fn audio_file_appends(&self) -> u64 {
        self.audio_file_appends.load(Ordering::Relaxed)
    }

    pub fn audio_stream_forwards(&self) -> u64 {
        self.audio_stream_forwards.load(Ordering::Relaxed)
    }

    pub fn silenced_audio(&self) -> u64 {
        self.silenced_audio.load(Ordering::Relaxed)
    }

    pub fn not_ready_drops(&self) -> u64 {
        self.not_ready_drops.load(Ordering::Relaxed)
    }

    pub fn inactive_drops(&self) -> u64 {
        self.inactive_drops.load(Ordering::Relaxed)
    }

    pub fn double_starts(&self) -> u64 {
        self.double_starts.load(Ordering::Relaxed)
    }

    pub fn append_failures(&self) -> u64 {
        self.append_failures.load(Ordering::Relaxed)
    }

    pub fn missing_frames(&self) -> u64 {
        self.missing_frames.load(Ordering::Relaxed)
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            video_file_appends: self.video_file_appends(),
            video_stream_forwards: self.video_stream_forwards(),
            placeholder_frames: self.placeholder_frames(),
            audio_file_appends: self.audio_file_appends(),
            audio_stream_forwards: self.audio_stream_forwards(),
            silenced_audio: self.silenced_audio(),
            not_ready_drops: self.not_ready_drops(),
            inactive_drops: self.inactive_drops(),
            double_starts: self.double_starts(),
            append_failures: self.append_failures(),
            missing_frames: self.missing_frames(),
        }
    }
}

/// Snapshot of writer metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub video_file_appends: u64,
    pub video_stream_forwards: u64,
    pub placeholder_frames: u64,
    pub audio_file_appends: u64,
    pub audio_stream_forwards: u64,
    pub silenced_audio: u64,
    pub not_ready_drops: u64,
    pub inactive_drops: u64,
    pub double_starts: u64,
    pub append_failures: u64,
    pub missing_frames: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: video {} file / {} stream ({} placeholder), audio {} file / {} stream ({} silenced), {} not ready, {} inactive, {} double starts, {} append failures, {} missing frames",
            self.video_file_appends,
            self.video_stream_forwards,
            self.placeholder_frames,
            self.audio_file_appends,
            self.audio_stream_forwards,
            self.silenced_audio,
            self.not_ready_drops,
            self.inactive_drops,
            self.double_starts,
            self.append_failures,
            self.missing_frames
        )
    }
}

/// Counters for the live connection
#[derive(Debug, Default)]
pub struct StreamHealth {
    /// Reconnects scheduled after a failed or closed connection
    pub retries: AtomicU64,

    /// Reconnects triggered by an I/O error
    pub io_error_reconnects: AtomicU64,

    /// Times the retry budget ran out
    pub retries_exhausted: AtomicU64,

    /// Successful connections
    pub connects: AtomicU64,
}

impl StreamHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_io_error_reconnect(&self) {
        self.io_error_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retries_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn io_error_reconnects(&self) -> u64 {
        self.io_error_reconnects.load(Ordering::Relaxed)
    }

    pub fn retries_exhausted(&self) -> u64 {
        self.retries_exhausted.load(Ordering::Relaxed)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for StreamHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stream: {} connects, {} retries, {} io-error reconnects, {} gave up",
            self.connects(),
            self.retries(),
            self.io_error_reconnects(),
            self.retries_exhausted()
        )
    }
}
