//! Orientation and sizing helpers
//!
//! Pure functions: no state, no I/O. The writer uses them to pick the file
//! track rotation, the frame adapter to pick snapshot sizes, and the stream
//! session to translate device orientation into the stream's orientation tag.

use serde::{Deserialize, Serialize};

/// Physical orientation reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrientation {
    #[default]
    Unknown,
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    FaceUp,
    FaceDown,
}

impl DeviceOrientation {
    pub const ALL: [DeviceOrientation; 7] = [
        DeviceOrientation::Unknown,
        DeviceOrientation::Portrait,
        DeviceOrientation::PortraitUpsideDown,
        DeviceOrientation::LandscapeLeft,
        DeviceOrientation::LandscapeRight,
        DeviceOrientation::FaceUp,
        DeviceOrientation::FaceDown,
    ];

    pub fn is_landscape(&self) -> bool {
        matches!(
            self,
            DeviceOrientation::LandscapeLeft | DeviceOrientation::LandscapeRight
        )
    }
}

/// How the file track is rotated relative to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationPolicy {
    /// Follow the device orientation
    #[default]
    Auto,
    AlwaysPortrait,
    AlwaysLandscape,
}

/// How the captured frame is fitted to the output size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFitMode {
    /// Full screen on notch displays, raw camera size elsewhere
    #[default]
    Auto,
    AspectFit,
    AspectFill,
    ViewAspectRatio,
}

/// Orientation tag carried by the live stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

/// Integer pixel size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Same size with width and height swapped
    pub fn transposed(&self) -> Self {
        Self::new(self.height, self.width)
    }

    /// Normalize so that width <= height
    pub fn portrait(&self) -> Self {
        if self.is_landscape() {
            self.transposed()
        } else {
            *self
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rotation in degrees implied by the device orientation alone
///
/// Positive angles rotate clockwise. Orientations with no landscape meaning
/// (flat or upside down) keep the previous angle, which starts at zero.
pub fn detected_angle(orientation: DeviceOrientation) -> f64 {
    match orientation {
        DeviceOrientation::LandscapeLeft => -90.0,
        DeviceOrientation::LandscapeRight => 90.0,
        _ => 0.0,
    }
}

/// Rotation in degrees applied to the file track
///
/// Computed once when the writer is built. Orientations outside `allowed`
/// never rotate, whatever the policy.
pub fn file_rotation_angle(
    current: DeviceOrientation,
    allowed: &[DeviceOrientation],
    policy: OrientationPolicy,
) -> f64 {
    let angle = if allowed.contains(&current) {
        detected_angle(current)
    } else {
        0.0
    };

    match policy {
        OrientationPolicy::AlwaysLandscape => {
            if angle == 90.0 || angle == -90.0 {
                angle
            } else {
                -90.0
            }
        }
        OrientationPolicy::AlwaysPortrait => 0.0,
        OrientationPolicy::Auto => angle,
    }
}

/// Largest size with the aspect ratio of `aspect` that fits inside `bounds`
pub fn fit_inside(aspect: Size, bounds: Size) -> Size {
    if aspect.is_empty() || bounds.is_empty() {
        return bounds;
    }
    let scale = f64::min(
        bounds.width as f64 / aspect.width as f64,
        bounds.height as f64 / aspect.height as f64,
    );
    Size::new(
        (aspect.width as f64 * scale) as u32,
        (aspect.height as f64 * scale) as u32,
    )
}

/// Output size for a captured frame, normalized so width <= height
///
/// `raw` is the captured buffer, `display` the on-screen surface bounds and
/// `native` the full native screen resolution.
pub fn target_size(
    mode: ContentFitMode,
    raw: Size,
    display: Size,
    native: Size,
    is_notch: bool,
) -> Size {
    let auto = || if is_notch { native } else { raw };

    let size = match mode {
        ContentFitMode::Auto => auto(),
        ContentFitMode::AspectFit => raw,
        ContentFitMode::AspectFill => native,
        ContentFitMode::ViewAspectRatio if !display.is_empty() => fit_inside(display, raw),
        ContentFitMode::ViewAspectRatio => auto(),
    };

    size.portrait()
}

/// Stream orientation tag for a device orientation, `None` when it should not change
///
/// The camera's landscape sides are mirrored relative to the device's.
pub fn stream_orientation(device: DeviceOrientation) -> Option<VideoOrientation> {
    match device {
        DeviceOrientation::Portrait => Some(VideoOrientation::Portrait),
        DeviceOrientation::PortraitUpsideDown => Some(VideoOrientation::PortraitUpsideDown),
        DeviceOrientation::LandscapeLeft => Some(VideoOrientation::LandscapeRight),
        DeviceOrientation::LandscapeRight => Some(VideoOrientation::LandscapeLeft),
        DeviceOrientation::Unknown | DeviceOrientation::FaceUp | DeviceOrientation::FaceDown => {
            None
        }
    }
}
