//! Pipeline abstraction layer for dualcast
//!
//! This module separates the concerns of one recording:
//! - Control: writer and connection state machines
//! - Timing: the media clock shared by video and audio
//! - Media: frames, samples and the stages that move them
//! - Health: counters for every silent drop
//!
//! # Architecture
//!
//! - Each stage runs in its own async task
//! - Stages implement the `PipelineStage` trait
//! - The `Recorder` chains stages together and manages their lifecycle
//! - `MediaClock` puts video and audio on one timescale

pub mod clock;
pub mod frame;
pub mod health;
pub mod sender;
pub mod stage;
pub mod state;
pub mod types;

pub use clock::MediaClock;
pub use frame::{FrameBuffer, PixelFormat};
pub use health::{HealthSummary, StreamHealth, WriterHealth};
pub use stage::PipelineStage;
pub use state::{ConnectionState, RecordingSession, WriterStatus};
pub use types::{AudioFormat, AudioSample, MediaKind, MediaSample, TIMESCALE, Timestamp, VideoSample};
