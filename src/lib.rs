//! dualcast: capture rendered frames and write them to a file and a live
//! stream at the same time.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{ConfigError, FrameError, SinkError};
pub use pipeline::sender::{DualSinkWriter, OutputMode, Recorder, WriterConfig};
pub use stream::{StreamClient, StreamSession, StreamSessionConfig};
