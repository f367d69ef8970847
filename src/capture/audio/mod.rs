//! Audio capture module
//!
//! Microphone input through cpal on every platform.

mod capture;

pub use capture::MicrophoneCapture;
