//! Recording pipeline components
//!
//! This module contains the sender-side pipeline stages:
//! - CaptureStage: snapshots the active surface at the frame rate
//! - AudioStage: drains microphone buffers
//! - DualSinkWriter: routes samples to the file and the live stream
//!
//! The recording pipeline flow:
//! ```text
//! Surface → FrameAdapter → CaptureStage ─┐
//!                                        ├→ DualSinkWriter → {Container, StreamSession}
//! Microphone ─────────────→ AudioStage ──┘
//! ```

pub mod audio_stage;
pub mod capture_stage;
pub mod coordinator;
pub mod delegate;
pub mod writer;

pub use audio_stage::AudioStage;
pub use capture_stage::CaptureStage;
pub use coordinator::{AudioInput, Recorder};
pub use delegate::{ChannelDelegate, WriterDelegate, WriterEvent};
pub use writer::{DualSinkWriter, OutputMode, WriterConfig, WriterControls};

/// Writer shared by the video and audio stages
pub type SharedWriter = std::sync::Arc<parking_lot::Mutex<DualSinkWriter>>;
