//! Traits for frame acquisition

use parking_lot::Mutex;
use std::sync::Arc;

use crate::geometry::Size;
use crate::pipeline::frame::FrameBuffer;

/// Something that can draw the current scene into a new buffer
pub trait Renderer: Send + Sync {
    /// Render the scene as it looks at render time `at` (seconds) into a buffer of `size`
    fn snapshot(&self, at: f64, size: Size) -> Option<FrameBuffer>;
}

/// Renderer handle whose snapshots are mutually exclusive
///
/// Surfaces and adapters sharing one renderer must share one
/// `SerializedRenderer`; every snapshot goes through its lock.
pub struct SerializedRenderer {
    inner: Arc<dyn Renderer>,
    lock: Mutex<()>,
}

impl SerializedRenderer {
    pub fn new(inner: Arc<dyn Renderer>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            lock: Mutex::new(()),
        })
    }
}

impl Renderer for SerializedRenderer {
    fn snapshot(&self, at: f64, size: Size) -> Option<FrameBuffer> {
        let _guard = self.lock.lock();
        self.inner.snapshot(at, size)
    }
}

/// Live camera image feed
pub trait CameraFeed: Send + Sync {
    /// Latest completed camera image, `None` before the first one arrives
    fn current_frame(&self) -> Option<FrameBuffer>;
}

/// A rendering surface the pipeline can read frames from
pub trait FrameSource: Send + Sync {
    /// Get the name of this surface for logging
    fn name(&self) -> &'static str;

    /// Most recent completed buffer, `None` if no frame is available yet
    fn current_frame(&self) -> Option<FrameBuffer>;

    /// Size of the on-screen surface
    fn display_bounds(&self) -> Size;

    /// Full native resolution of the screen
    fn native_bounds(&self) -> Size;

    fn is_notch_device(&self) -> bool {
        false
    }

    /// Size of the raw frame, without rendering when the surface can avoid it
    fn raw_size(&self) -> Option<Size> {
        self.current_frame()
            .map(|frame| Size::new(frame.width(), frame.height()))
    }

    /// Renderer able to snapshot composited frames, if the surface has one
    fn renderer(&self) -> Option<Arc<SerializedRenderer>> {
        None
    }
}
