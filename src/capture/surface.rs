//! Frame source implementations, one per kind of rendering surface

use parking_lot::Mutex;
use std::sync::Arc;

use super::traits::{CameraFeed, FrameSource, Renderer, SerializedRenderer};
use crate::geometry::Size;
use crate::pipeline::clock::MediaClock;
use crate::pipeline::frame::FrameBuffer;

/// Screen geometry a surface is displayed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    /// On-screen bounds of the surface
    pub display: Size,
    /// Native resolution of the whole screen
    pub native: Size,
    pub is_notch: bool,
}

impl ScreenInfo {
    pub fn new(display: Size, native: Size) -> Self {
        Self {
            display,
            native,
            is_notch: false,
        }
    }

    pub fn with_notch(mut self, is_notch: bool) -> Self {
        self.is_notch = is_notch;
        self
    }
}

/// Latest-frame holder fed by a producer thread
///
/// Producers call [`FrameSlot::publish`] whenever a frame completes; readers
/// always get the most recent one.
#[derive(Default)]
pub struct FrameSlot {
    latest: Mutex<Option<FrameBuffer>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: FrameBuffer) {
        *self.latest.lock() = Some(frame);
    }

    pub fn clear(&self) {
        *self.latest.lock() = None;
    }
}

impl CameraFeed for FrameSlot {
    fn current_frame(&self) -> Option<FrameBuffer> {
        self.latest.lock().clone()
    }
}

/// Camera feed composited with a 3D scene
pub struct ArSceneSurface {
    feed: Arc<dyn CameraFeed>,
    renderer: Arc<SerializedRenderer>,
    screen: ScreenInfo,
}

impl ArSceneSurface {
    pub fn new(
        feed: Arc<dyn CameraFeed>,
        renderer: Arc<SerializedRenderer>,
        screen: ScreenInfo,
    ) -> Self {
        Self {
            feed,
            renderer,
            screen,
        }
    }
}

impl FrameSource for ArSceneSurface {
    fn name(&self) -> &'static str {
        "ArSceneSurface"
    }

    fn current_frame(&self) -> Option<FrameBuffer> {
        self.feed.current_frame()
    }

    fn display_bounds(&self) -> Size {
        self.screen.display
    }

    fn native_bounds(&self) -> Size {
        self.screen.native
    }

    fn is_notch_device(&self) -> bool {
        self.screen.is_notch
    }

    fn renderer(&self) -> Option<Arc<SerializedRenderer>> {
        Some(self.renderer.clone())
    }
}

/// Camera feed with 2D sprites; frames are taken as captured
pub struct ArSpriteSurface {
    feed: Arc<dyn CameraFeed>,
    screen: ScreenInfo,
}

impl ArSpriteSurface {
    pub fn new(feed: Arc<dyn CameraFeed>, screen: ScreenInfo) -> Self {
        Self { feed, screen }
    }
}

impl FrameSource for ArSpriteSurface {
    fn name(&self) -> &'static str {
        "ArSpriteSurface"
    }

    fn current_frame(&self) -> Option<FrameBuffer> {
        self.feed.current_frame()
    }

    fn display_bounds(&self) -> Size {
        self.screen.display
    }

    fn native_bounds(&self) -> Size {
        self.screen.native
    }

    fn is_notch_device(&self) -> bool {
        self.screen.is_notch
    }
}

/// Pure 3D scene without a camera feed
///
/// The current frame is a render of the scene at the display size.
pub struct SceneSurface {
    renderer: Arc<SerializedRenderer>,
    screen: ScreenInfo,
    clock: MediaClock,
}

impl SceneSurface {
    pub fn new(renderer: Arc<SerializedRenderer>, screen: ScreenInfo, clock: MediaClock) -> Self {
        Self {
            renderer,
            screen,
            clock,
        }
    }
}

impl FrameSource for SceneSurface {
    fn name(&self) -> &'static str {
        "SceneSurface"
    }

    fn current_frame(&self) -> Option<FrameBuffer> {
        self.renderer
            .snapshot(self.clock.now_seconds(), self.screen.display)
    }

    fn display_bounds(&self) -> Size {
        self.screen.display
    }

    fn native_bounds(&self) -> Size {
        self.screen.native
    }

    fn is_notch_device(&self) -> bool {
        self.screen.is_notch
    }

    // the raw frame is always rendered at the display size
    fn raw_size(&self) -> Option<Size> {
        (!self.screen.display.is_empty()).then_some(self.screen.display)
    }

    fn renderer(&self) -> Option<Arc<SerializedRenderer>> {
        Some(self.renderer.clone())
    }
}
