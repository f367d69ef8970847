//! Container sink abstraction
//!
//! The writer talks to the file container only through [`ContainerSink`].
//! [`FfmpegContainer`] is the production implementation; tests use an
//! in-memory one.

mod ffmpeg;

pub use ffmpeg::FfmpegContainer;

use crate::error::SinkError;
use crate::pipeline::types::{MediaKind, MediaSample, Timestamp};

/// Invoked once the container has been flushed (or failed to)
pub type FinalizeCallback = Box<dyn FnOnce(Result<(), SinkError>) + Send + 'static>;

/// Write status of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerStatus {
    /// Tracks may still be added; writing has not started
    #[default]
    Unknown,
    Writing,
    Completed,
    Failed,
    Cancelled,
}

/// Parameters of a track added before writing starts
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSettings {
    Video {
        width: u32,
        height: u32,
        /// Clockwise rotation applied to every frame of the track
        rotation_degrees: f64,
        real_time: bool,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
        real_time: bool,
    },
}

impl TrackSettings {
    pub fn kind(&self) -> MediaKind {
        match self {
            TrackSettings::Video { .. } => MediaKind::Video,
            TrackSettings::Audio { .. } => MediaKind::Audio,
        }
    }
}

/// A media container on local storage
pub trait ContainerSink: Send {
    /// Add a track; only valid before [`ContainerSink::start_writing`]
    fn add_track(&mut self, settings: TrackSettings) -> Result<(), SinkError>;

    /// Whether a sample of `kind` can be appended right now
    fn is_ready_for_more_data(&self, kind: MediaKind) -> bool;

    /// Append a sample to its track; false if the container refused it
    fn append(&mut self, sample: &MediaSample) -> bool;

    /// Open the container for writing; false on failure (see `last_error`)
    fn start_writing(&mut self) -> bool;

    /// Anchor the timeline: samples at `at` land at time zero
    fn start_session(&mut self, at: Timestamp);

    /// Flush and close asynchronously, then call `on_complete`
    fn finalize(&mut self, on_complete: FinalizeCallback);

    /// Abandon the container without flushing
    fn cancel(&mut self);

    fn status(&self) -> ContainerStatus;

    fn last_error(&self) -> Option<SinkError>;

    /// Lay the file out for progressive playback
    fn set_optimize_for_network(&mut self, _enabled: bool) {}
}
