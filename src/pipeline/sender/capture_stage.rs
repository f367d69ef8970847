//! Video stage for the recording pipeline
//!
//! Ticks at the configured frame rate, snapshots the active surface and hands
//! the record/stream buffers to the writer.

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SharedWriter;
use crate::capture::FrameAdapter;
use crate::pipeline::PipelineStage;
use crate::pipeline::clock::MediaClock;

/// Capture stage: the only caller of `insert_buffers`
pub struct CaptureStage {
    adapter: Arc<FrameAdapter>,
    clock: MediaClock,
    writer: SharedWriter,
    fps: u32,
    cancel: CancellationToken,
    frames: u64,
}

impl CaptureStage {
    pub fn new(
        adapter: Arc<FrameAdapter>,
        clock: MediaClock,
        writer: SharedWriter,
        fps: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            clock,
            writer,
            fps,
            cancel,
            frames: 0,
        }
    }

    /// Frames handed to the writer so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn capture_once(&mut self) {
        let at = self.clock.now_seconds();
        let Some(buffers) = self.adapter.buffers() else {
            self.writer.lock().health().record_missing_frame();
            return;
        };
        let time = self.clock.timestamp(at);
        self.writer.lock().insert_buffers(buffers, time);
        self.frames += 1;
    }
}

#[async_trait]
impl PipelineStage for CaptureStage {
    async fn run(&mut self) -> Result<()> {
        if self.fps == 0 {
            bail!("frame rate must be positive");
        }

        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / self.fps as f64));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "CaptureStage: {} at {} fps ({:?})",
            self.adapter.source_name(),
            self.fps,
            self.adapter.content_mode()
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => self.capture_once(),
            }
        }

        debug!("CaptureStage: {} frames captured", self.frames);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CaptureStage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SceneSurface, ScreenInfo, SerializedRenderer, TestPatternRenderer};
    use crate::geometry::{ContentFitMode, DeviceOrientation, Size};
    use crate::pipeline::sender::writer::{DualSinkWriter, OutputMode, WriterConfig};
    use crate::pipeline::stage::spawn_stage;
    use crate::testing::{MemoryContainer, RecordingDelegate};
    use parking_lot::Mutex;

    fn writer(file: &MemoryContainer) -> SharedWriter {
        let boxed = file.boxed();
        let config = WriterConfig {
            width: 8,
            height: 16,
            audio_enabled: false,
            output_mode: OutputMode::FileOnly,
            ..WriterConfig::default()
        };
        Arc::new(Mutex::new(DualSinkWriter::new(
            config,
            move |_| Ok(boxed),
            None,
            RecordingDelegate::new(),
            DeviceOrientation::Portrait,
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_feeds_writer_until_cancelled() {
        let clock = MediaClock::new();
        let screen = ScreenInfo::new(Size::new(8, 16), Size::new(8, 16));
        let surface = SceneSurface::new(
            SerializedRenderer::new(Arc::new(TestPatternRenderer::new())),
            screen,
            clock.clone(),
        );
        let adapter = Arc::new(
            FrameAdapter::new(Arc::new(surface), ContentFitMode::Auto, clock.clone())
                .with_stream_buffer(false),
        );

        let file = MemoryContainer::new();
        let cancel = CancellationToken::new();
        let stage = CaptureStage::new(adapter, clock, writer(&file), 30, cancel.clone());
        let handle = spawn_stage(stage);

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.ok();

        let frames = file.video();
        assert!(frames.len() >= 3, "got {} frames", frames.len());
        assert!(frames.windows(2).all(|w| w[0].pts <= w[1].pts));
        assert!(frames.iter().all(|f| f.frame.width() == 8 && f.frame.height() == 16));
    }

    #[tokio::test]
    async fn test_zero_fps_is_rejected() {
        let clock = MediaClock::new();
        let screen = ScreenInfo::new(Size::new(8, 16), Size::new(8, 16));
        let surface = SceneSurface::new(
            SerializedRenderer::new(Arc::new(TestPatternRenderer::new())),
            screen,
            clock.clone(),
        );
        let adapter = Arc::new(FrameAdapter::new(
            Arc::new(surface),
            ContentFitMode::Auto,
            clock.clone(),
        ));
        let file = MemoryContainer::new();
        let mut stage = CaptureStage::new(adapter, clock, writer(&file), 0, CancellationToken::new());

        assert!(stage.run().await.is_err());
        assert_eq!(stage.frames(), 0);
    }
}
