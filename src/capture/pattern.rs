//! Synthetic test pattern used when no real surface is attached

use image::{Rgba, RgbaImage};

use super::traits::Renderer;
use crate::geometry::Size;
use crate::pipeline::frame::FrameBuffer;

const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 192, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [192, 0, 0, 255],
    [0, 0, 192, 255],
];

/// Colour bars with a white marker sweeping across once per `period` seconds
pub struct TestPatternRenderer {
    period: f64,
}

impl TestPatternRenderer {
    pub fn new() -> Self {
        Self { period: 2.0 }
    }

    pub fn with_period(mut self, seconds: f64) -> Self {
        if seconds > 0.0 {
            self.period = seconds;
        }
        self
    }

    fn marker_column(&self, at: f64, width: u32) -> u32 {
        let phase = (at / self.period).fract().abs();
        ((phase * width as f64) as u32).min(width.saturating_sub(1))
    }
}

impl Default for TestPatternRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TestPatternRenderer {
    fn snapshot(&self, at: f64, size: Size) -> Option<FrameBuffer> {
        if size.is_empty() {
            return None;
        }
        let marker = self.marker_column(at, size.width);
        let marker_width = (size.width / 64).max(1);
        let image = RgbaImage::from_fn(size.width, size.height, |x, y| {
            if x >= marker && x < marker + marker_width {
                return Rgba([255, 255, 255, 255]);
            }
            // Lower quarter stays black so motion is easy to spot
            if y > size.height * 3 / 4 {
                return Rgba([16, 16, 16, 255]);
            }
            let bar = (x as usize * BARS.len()) / size.width as usize;
            Rgba(BARS[bar.min(BARS.len() - 1)])
        });
        Some(FrameBuffer::from_rgba_image(image))
    }
}
