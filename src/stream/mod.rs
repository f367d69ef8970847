//! Live stream plumbing
//!
//! The network protocol itself lives behind [`StreamClient`]; this module
//! owns the connection lifecycle around it ([`StreamSession`]).

mod session;

pub use session::{StreamSession, StreamSessionConfig};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::geometry::{Size, VideoOrientation};
use crate::pipeline::types::MediaSample;

/// Status codes reported by the protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    ConnectSuccess,
    ConnectFailed,
    ConnectClosed,
    /// Anything the session does not react to (publish start, bandwidth notices)
    Other(String),
}

/// Asynchronous notification from the protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Status(StatusCode),
    IoError(String),
}

/// Which notifications a listener subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    IoError,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Status(_) => EventKind::Status,
            StreamEvent::IoError(_) => EventKind::IoError,
        }
    }
}

/// Handle returned when registering a listener
///
/// Removing a listener requires the same handle; handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Video encoder profile requested from the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum H264Profile {
    Baseline,
    Main,
    #[default]
    High,
}

/// Encoding settings applied to the outgoing stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub orientation: VideoOrientation,
    pub size: Size,
    pub profile: H264Profile,
    /// Video bitrate in bits per second
    pub video_bitrate: u32,
    pub frame_rate: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            orientation: VideoOrientation::Portrait,
            size: Size::new(1920, 1080),
            profile: H264Profile::High,
            video_bitrate: 3_000_000,
            frame_rate: 30.0,
        }
    }
}

/// Protocol client for a live media server (RTMP or similar)
///
/// Implementations deliver events to registered listeners from any thread.
pub trait StreamClient: Send + Sync {
    fn connect(&self, uri: &str);

    fn close(&self);

    fn publish(&self, stream_key: &str);

    fn append_sample(&self, sample: MediaSample);

    fn set_orientation(&self, orientation: VideoOrientation);

    fn configure(&self, settings: &StreamSettings);

    fn add_listener(&self, kind: EventKind, sink: mpsc::UnboundedSender<StreamEvent>) -> ListenerId;

    /// Returns false if `id` was not registered for `kind`
    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool;

    fn set_paused(&self, paused: bool);

    fn is_paused(&self) -> bool;

    fn set_torch(&self, on: bool);

    fn torch(&self) -> bool;

    fn set_zoom_factor(&self, level: f64, ramping: bool, rate: f64);

    fn set_video_bitrate(&self, bits_per_second: u32);

    fn set_audio_bitrate(&self, bits_per_second: u32);

    fn set_frame_rate(&self, fps: f64);
}
