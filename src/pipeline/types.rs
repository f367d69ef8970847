//! Core types for the pipeline system

use bytes::Bytes;
use std::cmp::Ordering;
use std::time::Duration;

use super::frame::FrameBuffer;

/// Timescale used for every timestamp produced by the pipeline (microseconds)
pub const TIMESCALE: i32 = 1_000_000;

/// Rational media time: `value / scale` seconds
///
/// Two timestamps with different scales compare by the instant they denote,
/// so `1/2` equals `500_000/1_000_000`.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    pub value: i64,
    pub scale: i32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp {
        value: 0,
        scale: TIMESCALE,
    };

    /// Create a timestamp from a raw value and a positive scale
    pub const fn new(value: i64, scale: i32) -> Self {
        debug_assert!(scale > 0);
        Self { value, scale }
    }

    /// Create a timestamp from microseconds
    pub const fn from_micros(micros: i64) -> Self {
        Self::new(micros, TIMESCALE)
    }

    /// Create a timestamp from seconds, rounded to the nearest tick of `scale`
    pub fn from_seconds(seconds: f64, scale: i32) -> Self {
        Self::new((seconds * scale as f64).round() as i64, scale)
    }

    /// Create a timestamp from a duration (microsecond precision)
    pub fn from_duration(duration: Duration) -> Self {
        Self::from_micros(duration.as_micros() as i64)
    }

    /// Value in seconds
    pub fn seconds(&self) -> f64 {
        self.value as f64 / self.scale as f64
    }

    /// Express the same instant in another scale, rounding to the nearest tick
    pub fn rescale(&self, scale: i32) -> Self {
        if scale == self.scale {
            return *self;
        }
        let num = self.value as i128 * scale as i128;
        let den = self.scale as i128;
        let half = den / 2;
        let value = if num >= 0 {
            (num + half) / den
        } else {
            (num - half) / den
        };
        Self::new(value as i64, scale)
    }

    /// Microseconds since the clock base
    pub fn as_micros(&self) -> i64 {
        self.rescale(TIMESCALE).value
    }

    /// Convert to duration, clamping negative values to zero
    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.nanos().max(0) as u64)
    }

    /// Elapsed time since `earlier`, or `None` if `earlier` is later than `self`
    pub fn checked_duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        let diff = self.nanos() - earlier.nanos();
        (diff >= 0).then(|| Duration::from_nanos(diff as u64))
    }

    /// Elapsed time since `earlier`, zero if `earlier` is later than `self`
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        self.checked_duration_since(earlier).unwrap_or_default()
    }

    fn nanos(&self) -> i128 {
        self.value as i128 * 1_000_000_000 / self.scale as i128
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.value as i128 * other.scale as i128;
        let rhs = other.value as i128 * self.scale as i128;
        lhs.cmp(&rhs)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.seconds())
    }
}

/// Kind of media data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Video frame data
    Video,
    /// Audio sample data
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "Video"),
            MediaKind::Audio => write!(f, "Audio"),
        }
    }
}

/// A video frame stamped with its presentation time
#[derive(Debug, Clone)]
pub struct VideoSample {
    pub frame: FrameBuffer,
    pub pts: Timestamp,
}

impl VideoSample {
    pub fn new(frame: FrameBuffer, pts: Timestamp) -> Self {
        Self { frame, pts }
    }
}

/// Layout of the PCM payload carried by an [`AudioSample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Interleaved 32-bit float PCM, native endian, stamped with its media time
#[derive(Clone)]
pub struct AudioSample {
    pub data: Bytes,
    pub format: AudioFormat,
    pub pts: Timestamp,
}

impl AudioSample {
    /// Build a sample from interleaved f32 PCM
    pub fn from_f32(samples: &[f32], format: AudioFormat, pts: Timestamp) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 4);
        for s in samples {
            data.extend_from_slice(&s.to_ne_bytes());
        }
        Self {
            data: Bytes::from(data),
            format,
            pts,
        }
    }

    /// Number of frames (one value per channel) in this sample
    pub fn frames(&self) -> usize {
        let channels = self.format.channels.max(1) as usize;
        self.data.len() / 4 / channels
    }

    /// Duration covered by the payload
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.format.sample_rate as f64)
    }

    /// Same timing and layout with every value zeroed
    pub fn silenced(&self) -> Self {
        Self {
            data: Bytes::from(vec![0u8; self.data.len()]),
            format: self.format,
            pts: self.pts,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }

    /// Decode the payload back into f32 values
    pub fn to_f32(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

impl std::fmt::Debug for AudioSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSample")
            .field("pts", &self.pts)
            .field("sample_rate", &self.format.sample_rate)
            .field("channels", &self.format.channels)
            .field("frames", &self.frames())
            .finish()
    }
}

/// Either kind of sample, as accepted by the sinks
#[derive(Debug, Clone)]
pub enum MediaSample {
    Video(VideoSample),
    Audio(AudioSample),
}

impl MediaSample {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaSample::Video(_) => MediaKind::Video,
            MediaSample::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn pts(&self) -> Timestamp {
        match self {
            MediaSample::Video(v) => v.pts,
            MediaSample::Audio(a) => a.pts,
        }
    }
}

impl From<VideoSample> for MediaSample {
    fn from(sample: VideoSample) -> Self {
        MediaSample::Video(sample)
    }
}

impl From<AudioSample> for MediaSample {
    fn from(sample: AudioSample) -> Self {
        MediaSample::Audio(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_compares_across_scales() {
        let half = Timestamp::new(1, 2);
        let micros = Timestamp::from_micros(500_000);
        assert_eq!(half, micros);
        assert!(Timestamp::new(1, 3) < half);
        assert_eq!(half.rescale(TIMESCALE).value, 500_000);
    }

    #[test]
    fn test_timestamp_durations() {
        let start = Timestamp::from_seconds(1.0, TIMESCALE);
        let later = Timestamp::from_seconds(1.25, TIMESCALE);
        assert_eq!(
            later.saturating_duration_since(start),
            Duration::from_millis(250)
        );
        assert_eq!(start.saturating_duration_since(later), Duration::ZERO);
        assert!(start.checked_duration_since(later).is_none());
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let ts = Timestamp::new(2, 3);
        assert_eq!(ts.rescale(10).value, 7);
        assert_eq!(Timestamp::new(-2, 3).rescale(10).value, -7);
    }

    #[test]
    fn test_audio_silenced_keeps_layout() {
        let format = AudioFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        let sample = AudioSample::from_f32(&[0.5, -0.5, 0.25, 0.1], format, Timestamp::ZERO);
        assert_eq!(sample.frames(), 2);
        assert!(!sample.is_silent());

        let silent = sample.silenced();
        assert!(silent.is_silent());
        assert_eq!(silent.data.len(), sample.data.len());
        assert_eq!(silent.pts, sample.pts);
        assert_eq!(silent.to_f32(), vec![0.0; 4]);
    }
}
