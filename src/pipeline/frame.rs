//! Immutable pixel buffers

use bytes::Bytes;
use image::{ImageBuffer, Rgba, RgbaImage, imageops};
use std::path::Path;

use crate::error::FrameError;

/// Packed 8-bit, four channel pixel layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Name understood by FFmpeg's pixel format lookup
    pub const fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgba8 => "rgba",
            PixelFormat::Bgra8 => "bgra",
        }
    }
}

/// Handle to a tightly packed pixel buffer
///
/// Cloning is cheap: the pixel data is shared. A buffer is never modified once
/// built; transforms such as [`FrameBuffer::rotated_left`] allocate a new one.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Bytes,
}

impl FrameBuffer {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, FrameError> {
        let data = data.into();
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A buffer where every pixel holds `pixel`
    pub fn filled(width: u32, height: u32, format: PixelFormat, pixel: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let data: Vec<u8> = pixel.iter().copied().cycle().take(count * 4).collect();
        Self {
            width,
            height,
            format,
            data: Bytes::from(data),
        }
    }

    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            data: Bytes::from(image.into_raw()),
        }
    }

    /// Load a still image (png/jpeg) as an RGBA buffer
    pub fn from_image_file(path: impl AsRef<Path>) -> Result<Self, FrameError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|source| FrameError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let frame = Self::from_rgba_image(image.to_rgba8());
        if frame.width == 0 || frame.height == 0 {
            return Err(FrameError::Empty {
                width: frame.width,
                height: frame.height,
            });
        }
        Ok(frame)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// The pixel at (x, y) in the buffer's own channel order
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Copy rotated 90 degrees counter-clockwise; width and height swap
    pub fn rotated_left(&self) -> FrameBuffer {
        self.map_image(|view| imageops::rotate270(view))
    }

    /// Copy rotated 90 degrees clockwise; width and height swap
    pub fn rotated_right(&self) -> FrameBuffer {
        self.map_image(|view| imageops::rotate90(view))
    }

    /// Copy scaled to exactly `width` x `height`
    pub fn resized(&self, width: u32, height: u32) -> FrameBuffer {
        if width == self.width && height == self.height {
            return self.clone();
        }
        self.map_image(|view| imageops::resize(view, width, height, imageops::FilterType::Triangle))
    }

    // Channel order is irrelevant to geometric transforms, so BGRA data is
    // viewed as RGBA and handed back with its original format tag.
    fn map_image<F>(&self, transform: F) -> FrameBuffer
    where
        F: FnOnce(&ImageBuffer<Rgba<u8>, &[u8]>) -> RgbaImage,
    {
        let out = match ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(self.width, self.height, &self.data[..])
        {
            Some(view) => transform(&view),
            // Length is validated on construction
            None => return self.clone(),
        };
        let (width, height) = out.dimensions();
        FrameBuffer {
            width,
            height,
            format: self.format,
            data: Bytes::from(out.into_raw()),
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("size", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 3x2 buffer whose red channel is the pixel index
    fn indexed_frame() -> FrameBuffer {
        let mut data = Vec::new();
        for i in 0..6u8 {
            data.extend_from_slice(&[i, 0, 0, 255]);
        }
        FrameBuffer::new(3, 2, PixelFormat::Rgba8, data).unwrap()
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = FrameBuffer::new(2, 2, PixelFormat::Bgra8, vec![0u8; 15]).unwrap_err();
        assert!(matches!(err, FrameError::SizeMismatch { expected: 16, .. }));
        assert!(FrameBuffer::new(0, 2, PixelFormat::Bgra8, Vec::new()).is_err());
    }

    #[test]
    fn test_rotate_left_swaps_dimensions() {
        let frame = indexed_frame();
        let rotated = frame.rotated_left();
        assert_eq!((rotated.width(), rotated.height()), (2, 3));

        // 0 1 2        2 5
        // 3 4 5   ->   1 4
        //              0 3
        assert_eq!(rotated.pixel(0, 0).unwrap()[0], 2);
        assert_eq!(rotated.pixel(1, 0).unwrap()[0], 5);
        assert_eq!(rotated.pixel(0, 2).unwrap()[0], 0);
        assert_eq!(rotated.pixel(1, 2).unwrap()[0], 3);

        // source untouched
        assert_eq!(frame.pixel(0, 0).unwrap()[0], 0);
        assert_eq!(frame.width(), 3);
    }

    #[test]
    fn test_rotations_cancel_out() {
        let frame = indexed_frame();
        assert_eq!(frame.rotated_left().rotated_right(), frame);
    }

    #[test]
    fn test_format_tag_survives_rotation() {
        let frame = FrameBuffer::filled(4, 2, PixelFormat::Bgra8, [1, 2, 3, 4]);
        let rotated = frame.rotated_left();
        assert_eq!(rotated.format(), PixelFormat::Bgra8);
        assert_eq!(rotated.pixel(1, 3), Some([1, 2, 3, 4]));
    }

    #[test]
    fn test_load_placeholder_from_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brb.png");
        RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let frame = FrameBuffer::from_image_file(&path).unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 4));
        assert_eq!(frame.pixel(7, 3), Some([10, 20, 30, 255]));
        assert!(FrameBuffer::from_image_file(dir.path().join("missing.png")).is_err());
    }
}
