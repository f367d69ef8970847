//! Media clock shared by the video and audio paths

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::types::{TIMESCALE, Timestamp};

/// Monotonic render clock and timestamp normalizer
///
/// Render surfaces report time as seconds on a monotonic clock. The media
/// clock turns those values into [`Timestamp`]s on the pipeline timescale so
/// video and audio samples land on the same axis. Samples that already carry
/// a media timestamp (microphone buffers) go through
/// [`MediaClock::native_timestamp`].
///
/// Built on `tokio::time::Instant`, so a paused runtime controls it.
///
/// The clock holds no session state: the first-sample anchor lives in the
/// writer's recording session.
#[derive(Clone)]
pub struct MediaClock {
    /// Base instant when the clock started
    base: Arc<Instant>,
}

impl MediaClock {
    /// Create a new media clock starting now
    pub fn new() -> Self {
        Self {
            base: Arc::new(Instant::now()),
        }
    }

    /// Create a new media clock with a specific base instant
    pub fn with_base(base: Instant) -> Self {
        Self {
            base: Arc::new(base),
        }
    }

    /// Get the base instant
    pub fn base(&self) -> Instant {
        *self.base
    }

    /// Monotonic render time in seconds since the clock base
    pub fn now_seconds(&self) -> f64 {
        self.base.elapsed().as_secs_f64()
    }

    /// Current time as a pipeline timestamp
    pub fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.base.elapsed().as_micros() as i64)
    }

    /// Time of `instant` relative to the clock base (zero if earlier)
    pub fn timestamp_from_instant(&self, instant: Instant) -> Timestamp {
        Timestamp::from_duration(instant.saturating_duration_since(*self.base))
    }

    /// Convert a render time in seconds into a pipeline timestamp
    pub fn timestamp(&self, render_time_seconds: f64) -> Timestamp {
        Timestamp::from_seconds(render_time_seconds, TIMESCALE)
    }

    /// Normalize a timestamp the sample already carries
    pub fn native_timestamp(&self, ts: Timestamp) -> Timestamp {
        ts.rescale(TIMESCALE)
    }

    /// Elapsed time since the clock started
    pub fn elapsed(&self) -> Duration {
        self.base.elapsed()
    }
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MediaClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}
