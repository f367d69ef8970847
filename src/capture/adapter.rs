//! Frame adapter: turns the active surface into record and stream buffers

use std::sync::Arc;

use super::traits::{FrameSource, Renderer};
use crate::geometry::{self, ContentFitMode, Size};
use crate::pipeline::clock::MediaClock;
use crate::pipeline::frame::FrameBuffer;

/// Buffers derived from one captured frame
///
/// `record` keeps the frame as sized for the file; `stream` is the same frame
/// rotated 90 degrees counter-clockwise for the landscape live stream.
#[derive(Debug, Clone)]
pub struct RecordStreamBuffers {
    pub record: FrameBuffer,
    pub stream: Option<FrameBuffer>,
}

impl RecordStreamBuffers {
    /// Record buffer only; the writer rotates it itself if it streams
    pub fn record_only(record: FrameBuffer) -> Self {
        Self {
            record,
            stream: None,
        }
    }
}

/// Reads frames from a [`FrameSource`] and normalizes their geometry
///
/// Snapshots go through the surface's [`SerializedRenderer`](super::SerializedRenderer), so callers
/// sharing a renderer never render at the same time.
pub struct FrameAdapter {
    source: Arc<dyn FrameSource>,
    mode: ContentFitMode,
    clock: MediaClock,
    produce_stream: bool,
}

impl FrameAdapter {
    pub fn new(source: Arc<dyn FrameSource>, mode: ContentFitMode, clock: MediaClock) -> Self {
        Self {
            source,
            mode,
            clock,
            produce_stream: true,
        }
    }

    /// Skip the rotated stream copy when nothing streams
    pub fn with_stream_buffer(mut self, produce: bool) -> Self {
        self.produce_stream = produce;
        self
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn content_mode(&self) -> ContentFitMode {
        self.mode
    }

    /// Current raw frame of the surface
    pub fn raw_buffer(&self) -> Option<FrameBuffer> {
        self.source.current_frame()
    }

    /// Output size for the current frame under the content-fit mode
    pub fn buffer_size(&self) -> Option<Size> {
        let raw = self.source.raw_size()?;
        Some(self.target_size_for(raw))
    }

    /// Raw frame size normalized to portrait
    pub fn buffer_size_fill(&self) -> Option<Size> {
        Some(self.source.raw_size()?.portrait())
    }

    /// Snapshot the surface into record and stream buffers
    ///
    /// Surfaces with a renderer are rendered once, at the target size.
    /// Returns `None` when the surface has no frame yet or the renderer could
    /// not produce one; callers skip the tick.
    pub fn buffers(&self) -> Option<RecordStreamBuffers> {
        let record = match self.source.renderer() {
            Some(renderer) => {
                let size = self.target_size_for(self.source.raw_size()?);
                renderer.snapshot(self.clock.now_seconds(), size)?
            }
            None => self.raw_buffer()?,
        };

        let stream = self.produce_stream.then(|| record.rotated_left());
        Some(RecordStreamBuffers { record, stream })
    }

    fn target_size_for(&self, raw: Size) -> Size {
        geometry::target_size(
            self.mode,
            raw,
            self.source.display_bounds(),
            self.source.native_bounds(),
            self.source.is_notch_device(),
        )
    }
}
