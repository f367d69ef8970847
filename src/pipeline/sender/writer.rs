//! Dual-sink writer
//!
//! Routes each timestamped sample to the file container, the live stream, or
//! both, according to the [`OutputMode`] fixed at construction. The file path
//! owns the session anchor and the duration bookkeeping; the stream path only
//! ever receives copies rotated for the landscape stream.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

use super::delegate::WriterDelegate;
use crate::capture::RecordStreamBuffers;
use crate::encoder::{ContainerSink, ContainerStatus, FinalizeCallback, TrackSettings};
use crate::error::SinkError;
use crate::geometry::{self, DeviceOrientation, OrientationPolicy};
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::health::WriterHealth;
use crate::pipeline::state::{RecordingSession, WriterStatus};
use crate::pipeline::types::{AudioSample, MediaKind, Timestamp, VideoSample};
use crate::stream::StreamSession;

/// Which sinks a writer feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    FileOnly,
    StreamOnly,
    Both,
}

impl OutputMode {
    pub fn uses_file(&self) -> bool {
        matches!(self, OutputMode::FileOnly | OutputMode::Both)
    }

    pub fn uses_stream(&self) -> bool {
        matches!(self, OutputMode::StreamOnly | OutputMode::Both)
    }
}

/// Immutable writer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Lay the file out for progressive download
    pub optimize_for_network: bool,
    pub audio_enabled: bool,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// Device orientations that may rotate the file track
    pub allowed_orientations: Vec<DeviceOrientation>,
    pub output_mode: OutputMode,
    pub orientation_policy: OrientationPolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("recording.mp4"),
            width: 720,
            height: 1280,
            optimize_for_network: false,
            audio_enabled: true,
            audio_sample_rate: 48_000,
            audio_channels: 2,
            allowed_orientations: vec![
                DeviceOrientation::Portrait,
                DeviceOrientation::LandscapeLeft,
                DeviceOrientation::LandscapeRight,
            ],
            output_mode: OutputMode::FileOnly,
            orientation_policy: OrientationPolicy::Auto,
        }
    }
}

/// Operator toggles shared between the writer and whoever drives it
#[derive(Debug, Clone, Default)]
pub struct WriterControls {
    standby: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
}

impl WriterControls {
    pub fn set_standby(&self, on: bool) {
        self.standby.store(on, Ordering::Relaxed);
    }

    pub fn standby(&self) -> bool {
        self.standby.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }
}

/// Writes one recording take to a container and/or a live stream
///
/// Driven from the video and audio stages behind a mutex; no method awaits.
pub struct DualSinkWriter {
    config: WriterConfig,
    container: Option<Box<dyn ContainerSink>>,
    stream: Option<Arc<StreamSession>>,
    delegate: Arc<dyn WriterDelegate>,
    session: RecordingSession,
    health: Arc<WriterHealth>,
    controls: WriterControls,
    rotation_degrees: f64,

    placeholder: Option<FrameBuffer>,
    /// Placeholder scaled to the last live frame size and rotated for the stream
    placeholder_cache: Option<((u32, u32), FrameBuffer)>,

    audio_paused: bool,
    audio_capture: Option<CancellationToken>,
    cancelled: bool,
    ended: bool,
}

impl DualSinkWriter {
    /// Build a writer and its tracks
    ///
    /// `open` creates the container at the configured output path. If it
    /// fails the delegate is told and the writer stays inert. When the mode
    /// streams, `stream` starts publishing right away; this needs a Tokio
    /// runtime.
    pub fn new<F>(
        config: WriterConfig,
        open: F,
        stream: Option<Arc<StreamSession>>,
        delegate: Arc<dyn WriterDelegate>,
        orientation: DeviceOrientation,
    ) -> Self
    where
        F: FnOnce(&Path) -> Result<Box<dyn ContainerSink>, SinkError>,
    {
        let rotation_degrees = geometry::file_rotation_angle(
            orientation,
            &config.allowed_orientations,
            config.orientation_policy,
        );

        let mut writer = Self {
            config,
            container: None,
            stream,
            delegate,
            session: RecordingSession::new(),
            health: Arc::new(WriterHealth::new()),
            controls: WriterControls::default(),
            rotation_degrees,
            placeholder: None,
            placeholder_cache: None,
            audio_paused: false,
            audio_capture: None,
            cancelled: false,
            ended: false,
        };

        match open(writer.config.output.as_path()) {
            Ok(container) => writer.container = Some(container),
            Err(e) => {
                error!("Writer: {}", e);
                writer
                    .delegate
                    .on_recording_failed(Some(e), "Could not allocate the output container");
                return writer;
            }
        }
        writer.add_tracks();

        if writer.config.output_mode.uses_stream() {
            match &writer.stream {
                Some(stream) => stream.start_publish(),
                None => warn!(
                    "Writer: {:?} mode without a stream session, stream path disabled",
                    writer.config.output_mode
                ),
            }
        }

        info!(
            "Writer: {:?} to {} ({}x{}, rotation {}°, audio {})",
            writer.config.output_mode,
            writer.config.output.display(),
            writer.config.width,
            writer.config.height,
            writer.rotation_degrees,
            if writer.config.audio_enabled { "on" } else { "off" }
        );
        writer
    }

    fn add_tracks(&mut self) {
        let Some(container) = self.container.as_mut() else {
            return;
        };
        container.set_optimize_for_network(self.config.optimize_for_network);

        let mut tracks = vec![TrackSettings::Video {
            width: self.config.width,
            height: self.config.height,
            rotation_degrees: self.rotation_degrees,
            real_time: true,
        }];
        if self.config.audio_enabled {
            tracks.push(TrackSettings::Audio {
                sample_rate: self.config.audio_sample_rate,
                channels: self.config.audio_channels,
                real_time: true,
            });
        }

        for track in tracks {
            let kind = track.kind();
            if let Err(e) = container.add_track(track) {
                error!("Writer: {}", e);
                self.session.transition(WriterStatus::Failed);
                let message = format!("Could not add the {} track", kind);
                self.delegate.on_recording_failed(Some(e), &message);
            }
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn status(&self) -> WriterStatus {
        self.session.status
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn health(&self) -> &Arc<WriterHealth> {
        &self.health
    }

    pub fn controls(&self) -> WriterControls {
        self.controls.clone()
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Rotation applied to the file track, in degrees
    pub fn rotation_degrees(&self) -> f64 {
        self.rotation_degrees
    }

    /// Whether a container was allocated at construction
    pub fn is_active(&self) -> bool {
        self.container.is_some()
    }

    // ── Operator toggles ────────────────────────────────────────

    pub fn set_standby(&self, on: bool) {
        self.controls.set_standby(on);
    }

    pub fn set_muted(&self, muted: bool) {
        self.controls.set_muted(muted);
    }

    /// Image shown on the stream while stand-by is on
    pub fn set_placeholder(&mut self, frame: Option<FrameBuffer>) {
        self.placeholder = frame;
        self.placeholder_cache = None;
    }

    /// Stop accepting audio until [`DualSinkWriter::resume`]
    pub fn pause(&mut self) {
        self.audio_paused = true;
    }

    pub fn resume(&mut self) {
        self.audio_paused = false;
    }

    /// Hand over the token that stops the audio capture feeding this writer
    pub fn attach_audio_capture(&mut self, token: CancellationToken) {
        self.audio_capture = Some(token);
    }

    // ── Video ───────────────────────────────────────────────────

    /// Insert a single frame; the stream copy is derived here if needed
    pub fn insert(&mut self, frame: FrameBuffer, time: Timestamp) {
        self.insert_buffers(RecordStreamBuffers::record_only(frame), time);
    }

    /// Insert a frame with its precomputed stream copy
    pub fn insert_buffers(&mut self, buffers: RecordStreamBuffers, time: Timestamp) {
        if self.container.is_none() {
            self.health.record_inactive_drop();
            return;
        }

        match self.session.status {
            WriterStatus::Idle => {
                if !self.begin_session(time) {
                    return;
                }
            }
            WriterStatus::Writing => {}
            WriterStatus::Failed => {
                self.report_file_failure("Video session failed while recording");
                self.forward_video(&buffers, time);
                return;
            }
            WriterStatus::Finished => {
                self.health.record_inactive_drop();
                return;
            }
        }

        if self.container_status() == ContainerStatus::Failed {
            self.session.transition(WriterStatus::Failed);
            self.report_file_failure("Video session failed while recording");
            self.forward_video(&buffers, time);
            return;
        }

        if !self.container_ready(MediaKind::Video) {
            self.health.record_not_ready_drop();
            return;
        }

        self.append_file_video(&buffers.record, time);
        self.forward_video(&buffers, time);

        let duration = self.session.advance(time);
        self.delegate.on_recording_progress(duration);
    }

    /// Anchor the session at `time`; false if the sample must not be processed
    fn begin_session(&mut self, time: Timestamp) -> bool {
        if self.session.starting_time.is_some() {
            // Anchored once already; this take was cancelled
            self.health.record_double_start();
            debug!("Writer: ignoring sample at {} for an already anchored session", time);
            return false;
        }
        self.session.starting_time = Some(time);

        let Some(container) = self.container.as_mut() else {
            return false;
        };
        if container.start_writing() {
            container.start_session(time);
            self.session.transition(WriterStatus::Writing);
            self.session.current_duration = std::time::Duration::ZERO;
            info!("Writer: session started at {}", time);
            true
        } else {
            let err = container.last_error();
            self.session.current_duration = std::time::Duration::ZERO;
            self.session.transition(WriterStatus::Failed);
            error!("Writer: could not start the container session: {:?}", err);
            self.delegate
                .on_recording_failed(err, "An error occurred while starting the video session");
            false
        }
    }

    fn append_file_video(&mut self, frame: &FrameBuffer, time: Timestamp) {
        if !self.config.output_mode.uses_file() || self.controls.standby() {
            return;
        }
        let Some(container) = self.container.as_mut() else {
            return;
        };
        if container.append(&VideoSample::new(frame.clone(), time).into()) {
            self.health.record_video_file_append();
        } else {
            self.health.record_append_failure();
            debug!("Writer: container refused video sample at {}", time);
        }
    }

    /// Send the stream copy, or the placeholder while stand-by is on
    fn forward_video(&mut self, buffers: &RecordStreamBuffers, time: Timestamp) {
        if !self.config.output_mode.uses_stream() {
            return;
        }
        let Some(stream) = self.stream.clone() else {
            return;
        };

        let standby = self.controls.standby();
        let frame = if standby {
            match self.placeholder_for(&buffers.record) {
                Some(frame) => frame,
                None => {
                    self.health.record_missing_frame();
                    return;
                }
            }
        } else {
            match &buffers.stream {
                Some(frame) => frame.clone(),
                None => buffers.record.rotated_left(),
            }
        };

        stream.append_video(VideoSample::new(frame, time));
        self.health.record_video_stream_forward(standby);
    }

    fn placeholder_for(&mut self, live: &FrameBuffer) -> Option<FrameBuffer> {
        let placeholder = self.placeholder.as_ref()?;
        let size = (live.width(), live.height());
        if let Some((cached, frame)) = &self.placeholder_cache {
            if *cached == size {
                return Some(frame.clone());
            }
        }
        let frame = placeholder.resized(size.0, size.1).rotated_left();
        self.placeholder_cache = Some((size, frame.clone()));
        Some(frame)
    }

    // ── Audio ───────────────────────────────────────────────────

    /// Route an audio sample; muted audio is zero-filled rather than dropped
    pub fn append_audio(&mut self, sample: AudioSample) {
        if !self.config.audio_enabled
            || self.audio_paused
            || self.container.is_none()
            || !self.session.status.is_writing()
        {
            self.health.record_inactive_drop();
            return;
        }

        let sample = if self.controls.muted() {
            self.health.record_silenced_audio();
            sample.silenced()
        } else {
            sample
        };

        if self.config.output_mode.uses_file() && !self.controls.standby() {
            if self.container_ready(MediaKind::Audio) {
                if let Some(container) = self.container.as_mut() {
                    if container.append(&sample.clone().into()) {
                        self.health.record_audio_file_append();
                    } else {
                        self.health.record_append_failure();
                    }
                }
            } else {
                self.health.record_not_ready_drop();
            }
        }

        if self.config.output_mode.uses_stream() {
            if let Some(stream) = &self.stream {
                stream.append_audio(sample);
                self.health.record_audio_stream_forward();
            }
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Stop every path and flush the file
    ///
    /// `on_complete` runs once the container is flushed, or right away when
    /// there is nothing to flush.
    pub fn end(&mut self, on_complete: FinalizeCallback) {
        if self.ended {
            on_complete(Ok(()));
            return;
        }
        self.ended = true;
        self.stop_audio_capture();

        if self.config.output_mode.uses_stream() {
            if let Some(stream) = &self.stream {
                stream.stop_publish();
            }
        }

        let was_writing = self.session.status.is_writing();
        if was_writing {
            self.session.transition(WriterStatus::Finished);
        }

        let Some(container) = self.container.as_mut() else {
            on_complete(Ok(()));
            return;
        };

        if self.config.output_mode.uses_file() && container.status() == ContainerStatus::Writing {
            info!("Writer: finalizing after {:?}", self.session.current_duration);
            container.finalize(on_complete);
            return;
        }

        // Nothing worth keeping: stream-only, never started, or failed
        let result = match self.session.status {
            WriterStatus::Failed => Err(container
                .last_error()
                .unwrap_or_else(|| SinkError::Finalize("recording failed".into()))),
            _ => Ok(()),
        };
        container.cancel();
        on_complete(result);
    }

    /// Abandon the take without flushing; idempotent
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.stop_audio_capture();

        if self.session.status.is_writing() {
            self.session.transition(WriterStatus::Idle);
        }
        self.session.current_duration = std::time::Duration::ZERO;

        if let Some(container) = self.container.as_mut() {
            container.cancel();
        }
        info!("Writer: cancelled");
    }

    fn stop_audio_capture(&mut self) {
        if let Some(token) = self.audio_capture.take() {
            token.cancel();
        }
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn container_status(&self) -> ContainerStatus {
        self.container
            .as_ref()
            .map(|c| c.status())
            .unwrap_or_default()
    }

    fn container_ready(&self, kind: MediaKind) -> bool {
        self.container
            .as_ref()
            .is_some_and(|c| c.is_ready_for_more_data(kind))
    }

    fn report_file_failure(&self, message: &str) {
        let err = self.container.as_ref().and_then(|c| c.last_error());
        error!("Writer: {} ({:?})", message, err);
        self.delegate.on_recording_failed(err, message);
    }
}

impl Drop for DualSinkWriter {
    fn drop(&mut self) {
        self.stop_audio_capture();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::PixelFormat;
    use crate::pipeline::types::{AudioFormat, TIMESCALE};
    use crate::pipeline::state::ConnectionState;
    use crate::stream::{StatusCode, StreamEvent, StreamSessionConfig};
    use crate::testing::{MemoryContainer, MockStreamClient, RecordingDelegate};
    use std::time::Duration;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    struct Harness {
        writer: DualSinkWriter,
        file: MemoryContainer,
        client: Arc<MockStreamClient>,
        stream: Arc<StreamSession>,
        delegate: Arc<RecordingDelegate>,
    }

    fn config(mode: OutputMode) -> WriterConfig {
        WriterConfig {
            width: 4,
            height: 8,
            output_mode: mode,
            ..WriterConfig::default()
        }
    }

    fn harness_with(config: WriterConfig, file: MemoryContainer) -> Harness {
        let client = Arc::new(MockStreamClient::new());
        let stream = Arc::new(StreamSession::new(
            client.clone(),
            StreamSessionConfig::new("rtmp://live.example/app", "key"),
        ));
        let delegate = RecordingDelegate::new();
        let boxed = file.boxed();
        let writer = DualSinkWriter::new(
            config,
            move |_| Ok(boxed),
            Some(stream.clone()),
            delegate.clone(),
            DeviceOrientation::Portrait,
        );
        Harness {
            writer,
            file,
            client,
            stream,
            delegate,
        }
    }

    fn harness(mode: OutputMode) -> Harness {
        harness_with(config(mode), MemoryContainer::new())
    }

    fn frame(pixel: [u8; 4]) -> FrameBuffer {
        FrameBuffer::filled(4, 8, PixelFormat::Rgba8, pixel)
    }

    fn at(seconds: f64) -> Timestamp {
        Timestamp::from_seconds(seconds, TIMESCALE)
    }

    fn audio(seconds: f64) -> AudioSample {
        let format = AudioFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        AudioSample::from_f32(&[0.25; 64], format, at(seconds))
    }

    #[tokio::test]
    async fn test_both_mode_routes_to_each_sink() {
        let mut h = harness(OutputMode::Both);

        for (i, t) in [0.0, 0.033, 0.066].into_iter().enumerate() {
            h.writer.insert(frame(RED), at(t));
            h.writer.append_audio(audio(t + 0.001 * i as f64));
        }

        let file = h.file.video();
        assert_eq!(file.len(), 3);
        assert!(file.iter().all(|s| s.frame.width() == 4 && s.frame.height() == 8));

        let streamed = h.client.video();
        assert_eq!(streamed.len(), 3);
        assert!(streamed.iter().all(|s| s.frame.width() == 8 && s.frame.height() == 4));
        assert_eq!(streamed[2].pts, at(0.066));

        assert_eq!(h.file.audio().len(), 3);
        assert_eq!(h.client.audio().len(), 3);

        let duration = h.writer.session().current_duration;
        assert!((duration.as_secs_f64() - 0.066).abs() < 1e-6);
        assert_eq!(h.writer.status(), WriterStatus::Writing);
        assert_eq!(h.file.session_start(), Some(at(0.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_keeps_recording_after_stream_gives_up() {
        let mut h = harness(OutputMode::Both);
        assert!(h.stream.is_publishing());
        h.writer.insert(frame(RED), at(0.0));

        let max_retries = 2;
        for _ in 0..=max_retries {
            h.client.emit(StreamEvent::Status(StatusCode::ConnectFailed));
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        assert_eq!(h.stream.health().retries_exhausted(), 1);
        assert_eq!(h.stream.state(), ConnectionState::Disconnected);

        for t in [1.0, 2.0, 3.0] {
            h.writer.insert(frame(RED), at(t));
            assert_eq!(h.writer.session().current_duration, Duration::from_secs_f64(t));
        }
        assert_eq!(h.file.video().len(), 4);
        assert_eq!(h.writer.status(), WriterStatus::Writing);
        assert!(h.delegate.failures().is_empty());
    }

    #[tokio::test]
    async fn test_stream_only_standby_switches_to_placeholder() {
        let mut h = harness(OutputMode::StreamOnly);
        h.writer.set_placeholder(Some(frame(BLUE)));

        h.writer.insert(frame(RED), at(0.0));
        h.writer.set_standby(true);
        h.writer.insert(frame(RED), at(0.033));
        h.writer.insert(frame(RED), at(0.066));

        let streamed = h.client.video();
        assert_eq!(streamed.len(), 3);
        assert_eq!(streamed[0].frame.pixel(0, 0), Some(RED));
        for sample in &streamed[1..] {
            assert_eq!(sample.frame.width(), 8);
            assert_eq!(sample.frame.height(), 4);
            assert_eq!(sample.frame.pixel(0, 0), Some(BLUE));
        }
        assert!(h.file.video().is_empty());
        assert_eq!(h.writer.health().placeholder_frames(), 2);
    }

    #[tokio::test]
    async fn test_file_only_standby_suppresses_file() {
        let mut h = harness(OutputMode::FileOnly);
        h.writer.set_placeholder(Some(frame(BLUE)));

        h.writer.insert(frame(RED), at(0.0));
        h.writer.set_standby(true);
        h.writer.insert(frame(RED), at(0.5));
        h.writer.append_audio(audio(0.5));
        h.writer.insert(frame(RED), at(1.0));
        h.writer.set_standby(false);
        h.writer.insert(frame(RED), at(1.5));

        assert_eq!(h.file.video().len(), 2);
        assert!(h.file.audio().is_empty());
        assert!(h.client.samples().is_empty());
        assert_eq!(h.writer.health().placeholder_frames(), 0);
        // Duration keeps counting through stand-by
        assert_eq!(h.writer.session().current_duration, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_duration_tracks_first_sample() {
        let mut h = harness(OutputMode::FileOnly);
        let times = [2.0, 2.1, 2.25, 3.0];
        for t in times {
            h.writer.insert(frame(RED), at(t));
            let expected = at(t).saturating_duration_since(at(times[0]));
            assert_eq!(h.writer.session().current_duration, expected);
        }
        assert_eq!(
            h.delegate.progress(),
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(250),
                Duration::from_secs(1)
            ]
        );
    }

    #[tokio::test]
    async fn test_not_ready_sink_is_skipped_and_counted() {
        let mut h = harness(OutputMode::Both);
        h.writer.insert(frame(RED), at(0.0));
        h.file.set_ready(MediaKind::Video, false);
        h.writer.insert(frame(RED), at(0.1));

        assert_eq!(h.file.video().len(), 1);
        assert_eq!(h.client.video().len(), 1);
        assert_eq!(h.writer.health().not_ready_drops(), 1);
        assert_eq!(h.writer.session().current_duration, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_muted_audio_is_zero_filled() {
        let mut h = harness(OutputMode::Both);
        h.writer.insert(frame(RED), at(0.0));
        h.writer.set_muted(true);
        h.writer.append_audio(audio(0.01));

        let file = h.file.audio();
        let streamed = h.client.audio();
        assert_eq!(file.len(), 1);
        assert_eq!(streamed.len(), 1);
        assert!(file[0].is_silent());
        assert!(streamed[0].is_silent());
        assert_eq!(file[0].frames(), 32);
        assert_eq!(h.writer.health().silenced_audio(), 1);
    }

    #[tokio::test]
    async fn test_audio_waits_for_session_and_config() {
        let mut h = harness(OutputMode::FileOnly);
        h.writer.append_audio(audio(0.0));
        assert!(h.file.audio().is_empty());

        let mut quiet = harness_with(
            WriterConfig {
                audio_enabled: false,
                ..config(OutputMode::FileOnly)
            },
            MemoryContainer::new(),
        );
        quiet.writer.insert(frame(RED), at(0.0));
        quiet.writer.append_audio(audio(0.01));
        assert!(quiet.file.audio().is_empty());
        assert_eq!(quiet.file.tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_stops_audio_until_resume() {
        let mut h = harness(OutputMode::FileOnly);
        h.writer.insert(frame(RED), at(0.0));
        h.writer.pause();
        h.writer.append_audio(audio(0.01));
        h.writer.insert(frame(RED), at(0.033));
        h.writer.append_audio(audio(0.04));
        h.writer.resume();
        h.writer.append_audio(audio(0.05));

        assert_eq!(h.file.audio().len(), 1);
        assert_eq!(h.file.video().len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut h = harness(OutputMode::FileOnly);
        let token = CancellationToken::new();
        h.writer.attach_audio_capture(token.clone());
        h.writer.insert(frame(RED), at(0.0));
        h.writer.insert(frame(RED), at(0.5));

        h.writer.cancel();
        assert!(token.is_cancelled());
        assert_eq!(h.writer.status(), WriterStatus::Idle);
        assert_eq!(h.writer.session().current_duration, Duration::ZERO);
        assert_eq!(h.file.cancels(), 1);

        h.writer.cancel();
        assert_eq!(h.file.cancels(), 1);
        assert_eq!(h.writer.status(), WriterStatus::Idle);
        assert!(h.delegate.failures().is_empty());
    }

    #[tokio::test]
    async fn test_restart_after_cancel_counts_double_start() {
        let mut h = harness(OutputMode::FileOnly);
        h.writer.insert(frame(RED), at(0.0));
        h.writer.cancel();
        h.writer.insert(frame(RED), at(1.0));

        assert_eq!(h.writer.health().double_starts(), 1);
        assert_eq!(h.file.video().len(), 1);
        assert_eq!(h.writer.status(), WriterStatus::Idle);
        assert!(h.delegate.failures().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_reports_and_skips_sample() {
        let file = MemoryContainer::new();
        file.fail_on_start();
        let mut h = harness_with(config(OutputMode::FileOnly), file);

        h.writer.insert(frame(RED), at(0.0));
        assert_eq!(h.writer.status(), WriterStatus::Failed);
        assert!(h.file.video().is_empty());

        let failures = h.delegate.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, Some(SinkError::Start("disk full".into())));
    }

    #[tokio::test]
    async fn test_mid_recording_failure_keeps_stream_alive() {
        let mut h = harness(OutputMode::Both);
        h.writer.insert(frame(RED), at(0.0));
        h.file.fail_now("i/o error");
        h.writer.insert(frame(RED), at(0.033));
        h.writer.insert(frame(RED), at(0.066));

        assert_eq!(h.writer.status(), WriterStatus::Failed);
        assert_eq!(h.file.video().len(), 1);
        assert_eq!(h.client.video().len(), 3);
        // Every insert after the failure is reported
        assert_eq!(h.delegate.failures().len(), 2);
    }

    #[tokio::test]
    async fn test_open_failure_leaves_writer_inert() {
        let delegate = RecordingDelegate::new();
        let mut writer = DualSinkWriter::new(
            config(OutputMode::FileOnly),
            |path| {
                Err(SinkError::Open {
                    path: path.to_path_buf(),
                    reason: "read-only".into(),
                })
            },
            None,
            delegate.clone(),
            DeviceOrientation::Portrait,
        );
        writer.insert(frame(RED), at(0.0));

        assert!(!writer.is_active());
        assert_eq!(writer.status(), WriterStatus::Idle);
        assert_eq!(delegate.failures().len(), 1);
        assert_eq!(writer.health().inactive_drops(), 1);
    }

    #[tokio::test]
    async fn test_rejected_track_fails_writer() {
        let file = MemoryContainer::new();
        file.reject_track(MediaKind::Audio);
        let h = harness_with(config(OutputMode::FileOnly), file);

        assert_eq!(h.writer.status(), WriterStatus::Failed);
        let failures = h.delegate.failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0].0,
            Some(SinkError::TrackRejected {
                kind: MediaKind::Audio,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_file_rotation_follows_policy() {
        let landscape = |policy| {
            let cfg = WriterConfig {
                orientation_policy: policy,
                ..config(OutputMode::FileOnly)
            };
            let file = MemoryContainer::new();
            let boxed = file.boxed();
            let writer = DualSinkWriter::new(
                cfg,
                move |_| Ok(boxed),
                None,
                RecordingDelegate::new(),
                DeviceOrientation::LandscapeLeft,
            );
            (writer.rotation_degrees(), file.tracks())
        };

        let (auto, tracks) = landscape(OrientationPolicy::Auto);
        assert_eq!(auto, -90.0);
        assert!(matches!(
            tracks[0],
            TrackSettings::Video {
                rotation_degrees,
                ..
            } if rotation_degrees == -90.0
        ));
        assert_eq!(landscape(OrientationPolicy::AlwaysPortrait).0, 0.0);
    }

    #[tokio::test]
    async fn test_end_finalizes_and_stops_stream() {
        let mut h = harness(OutputMode::Both);
        h.writer.insert(frame(RED), at(0.0));

        let (tx, rx) = tokio::sync::oneshot::channel();
        h.writer.end(Box::new(move |result| {
            let _ = tx.send(result);
        }));

        assert_eq!(rx.await.ok(), Some(Ok(())));
        assert_eq!(h.file.finalized(), 1);
        assert_eq!(h.client.close_count(), 1);
        assert_eq!(h.writer.status(), WriterStatus::Finished);

        h.writer.insert(frame(RED), at(0.1));
        assert_eq!(h.file.video().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_only_end_discards_container() {
        let mut h = harness(OutputMode::StreamOnly);
        h.writer.insert(frame(RED), at(0.0));

        let (tx, rx) = tokio::sync::oneshot::channel();
        h.writer.end(Box::new(move |result| {
            let _ = tx.send(result);
        }));

        assert_eq!(rx.await.ok(), Some(Ok(())));
        assert_eq!(h.file.finalized(), 0);
        assert_eq!(h.file.cancels(), 1);
        assert_eq!(h.client.close_count(), 1);
    }
}
