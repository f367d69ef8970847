//! Frame and audio acquisition
//!
//! A [`FrameSource`] wraps whichever surface is active (camera plus 3D scene,
//! camera plus sprites, or a pure scene). The [`FrameAdapter`] reads it,
//! applies the content-fit policy and derives the record and stream buffers.

pub mod adapter;
pub mod audio;
pub mod pattern;
pub mod surface;
mod traits;

pub use adapter::{FrameAdapter, RecordStreamBuffers};
pub use pattern::TestPatternRenderer;
pub use surface::{ArSceneSurface, ArSpriteSurface, FrameSlot, SceneSurface, ScreenInfo};
pub use traits::{CameraFeed, FrameSource, Renderer, SerializedRenderer};
