//! Error types shared across the pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::types::MediaKind;

/// Errors raised while building or transforming a frame buffer
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("buffer of {actual} bytes does not match {width}x{height} ({expected} bytes expected)")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("frame has zero area ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("failed to load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Errors surfaced by a container sink
///
/// Clone is required because the sink keeps its last error around for
/// `last_error()` while the writer forwards a copy to its delegate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("cannot open container at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("{kind} track rejected: {reason}")]
    TrackRejected { kind: MediaKind, reason: String },

    #[error("container failed to start writing: {0}")]
    Start(String),

    #[error("failed to write {kind} sample: {reason}")]
    Write { kind: MediaKind, reason: String },

    #[error("failed to finalize container: {0}")]
    Finalize(String),

    #[error("container was cancelled")]
    Cancelled,
}

/// Errors raised while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration directory available on this platform")]
    NoConfigDir,

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
