//! Recording pipeline coordinator
//!
//! Wires the frame adapter, the writer and the optional stream session
//! together and owns the stage tasks.

use anyhow::{Context, Result};
use log::{info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SharedWriter;
use super::audio_stage::AudioStage;
use super::capture_stage::CaptureStage;
use super::delegate::{ChannelDelegate, WriterEvent};
use super::writer::{DualSinkWriter, WriterConfig, WriterControls};
use crate::capture::{FrameAdapter, FrameSource};
use crate::config::CaptureConfig;
use crate::encoder::ContainerSink;
use crate::error::SinkError;
use crate::geometry::DeviceOrientation;
use crate::pipeline::clock::MediaClock;
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::health::WriterHealth;
use crate::pipeline::stage::spawn_stage;
use crate::pipeline::state::WriterStatus;
use crate::pipeline::types::{AudioFormat, AudioSample};
use crate::stream::StreamSession;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// A running audio source: its format, its buffers and the token that stops it
pub struct AudioInput {
    pub format: AudioFormat,
    pub samples: mpsc::Receiver<AudioSample>,
    pub cancel: CancellationToken,
}

/// Coordinates one recording: Capture → Writer → {File, Stream}
pub struct Recorder {
    clock: MediaClock,
    adapter: Arc<FrameAdapter>,
    writer: SharedWriter,
    controls: WriterControls,
    health: Arc<WriterHealth>,
    stream: Option<Arc<StreamSession>>,
    events: Option<mpsc::UnboundedReceiver<WriterEvent>>,
    audio: Option<mpsc::Receiver<AudioSample>>,
    fps: u32,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Recorder {
    /// Build the writer and its stages; nothing runs until [`Recorder::start`]
    ///
    /// The writer's audio track follows `audio`'s format; without an audio
    /// input the writer records video only. When the writer streams, the
    /// session is configured and starts publishing here.
    pub fn new<F>(
        source: Arc<dyn FrameSource>,
        mut writer_config: WriterConfig,
        capture: &CaptureConfig,
        clock: MediaClock,
        open: F,
        stream: Option<Arc<StreamSession>>,
        audio: Option<AudioInput>,
    ) -> Self
    where
        F: FnOnce(&Path) -> Result<Box<dyn ContainerSink>, SinkError>,
    {
        let (samples, audio_cancel) = match audio {
            Some(input) => {
                writer_config.audio_sample_rate = input.format.sample_rate;
                writer_config.audio_channels = input.format.channels;
                (Some(input.samples), Some(input.cancel))
            }
            None => {
                if writer_config.audio_enabled {
                    info!("Recorder: no audio input, recording video only");
                }
                writer_config.audio_enabled = false;
                (None, None)
            }
        };

        let streaming = writer_config.output_mode.uses_stream();
        if streaming {
            if let Some(stream) = &stream {
                stream.configure();
                stream.on_device_orientation_changed(capture.device_orientation);
            }
        }

        let adapter = Arc::new(
            FrameAdapter::new(source, capture.content_mode, clock.clone())
                .with_stream_buffer(streaming),
        );

        let (delegate, events) = ChannelDelegate::new();
        let mut writer = DualSinkWriter::new(
            writer_config,
            open,
            stream.clone(),
            Arc::new(delegate),
            capture.device_orientation,
        );
        if let Some(token) = audio_cancel {
            writer.attach_audio_capture(token);
        }
        if let Some(path) = &capture.standby_image {
            match FrameBuffer::from_image_file(path) {
                Ok(frame) => writer.set_placeholder(Some(frame)),
                Err(e) => warn!("Recorder: no stand-by image: {}", e),
            }
        }

        let controls = writer.controls();
        let health = writer.health().clone();

        Self {
            clock,
            adapter,
            writer: Arc::new(Mutex::new(writer)),
            controls,
            health,
            stream,
            events: Some(events),
            audio: samples,
            fps: capture.fps,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Start the capture and audio stages
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        let capture = CaptureStage::new(
            self.adapter.clone(),
            self.clock.clone(),
            self.writer.clone(),
            self.fps,
            self.cancel.child_token(),
        );
        self.tasks.push(spawn_stage(capture));

        if let Some(samples) = self.audio.take() {
            let audio = AudioStage::new(
                samples,
                self.clock.clone(),
                self.writer.clone(),
                self.cancel.child_token(),
            );
            self.tasks.push(spawn_stage(audio));
        }

        // Log health metrics periodically
        let health = self.health.clone();
        let stream_health = self.stream.as_ref().map(|s| s.health().clone());
        let cancel = self.cancel.child_token();
        self.tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        info!("Recorder: {}", health.summary());
                        if let Some(stream) = &stream_health {
                            info!("Recorder: {}", stream);
                        }
                    }
                }
            }
        }));

        info!("Recorder: started");
    }

    /// Stop the stages, end the writer and wait for the file to be flushed
    pub async fn stop(&mut self) -> Result<()> {
        self.shutdown_stages().await;

        let (tx, rx) = oneshot::channel();
        self.writer.lock().end(Box::new(move |result| {
            let _ = tx.send(result);
        }));
        let result = rx.await.context("writer dropped the completion callback")?;

        info!("Recorder: {}", self.health.summary());
        result.context("failed to finalize recording")
    }

    /// Abandon the recording without flushing
    pub async fn cancel(&mut self) {
        self.shutdown_stages().await;
        self.writer.lock().cancel();
        if let Some(stream) = &self.stream {
            stream.stop_publish();
        }
        info!("Recorder: cancelled");
    }

    async fn shutdown_stages(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Recorder: stage task failed: {}", e);
            }
        }
    }

    // ── Controls ────────────────────────────────────────────────

    pub fn set_standby(&self, on: bool) {
        self.controls.set_standby(on);
    }

    pub fn set_muted(&self, muted: bool) {
        self.controls.set_muted(muted);
    }

    pub fn set_placeholder(&self, frame: Option<FrameBuffer>) {
        self.writer.lock().set_placeholder(frame);
    }

    pub fn on_device_orientation_changed(&self, orientation: DeviceOrientation) {
        if let Some(stream) = &self.stream {
            stream.on_device_orientation_changed(orientation);
        }
    }

    /// Writer notifications; can be taken once
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<WriterEvent>> {
        self.events.take()
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn status(&self) -> WriterStatus {
        self.writer.lock().status()
    }

    pub fn current_duration(&self) -> Duration {
        self.writer.lock().session().current_duration
    }

    pub fn health(&self) -> &Arc<WriterHealth> {
        &self.health
    }

    pub fn stream(&self) -> Option<&Arc<StreamSession>> {
        self.stream.as_ref()
    }

    pub fn clock(&self) -> &MediaClock {
        &self.clock
    }
}
