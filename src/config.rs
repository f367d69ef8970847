//! Configuration management for dualcast

use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::geometry::{ContentFitMode, DeviceOrientation, Size, VideoOrientation};
use crate::pipeline::sender::writer::WriterConfig;
use crate::stream::{H264Profile, StreamSessionConfig, StreamSettings};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File writer settings
    #[serde(default)]
    pub writer: WriterConfig,

    /// Live stream settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Frame acquisition settings
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Server URI, e.g. rtmp://live.example.com/app
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub stream_key: String,

    /// Reconnect attempts after a failed or closed connection
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First reconnect delay (ms); doubles on every retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_video_bitrate")]
    pub video_bitrate_kbps: u32,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    #[serde(default)]
    pub profile: H264Profile,

    #[serde(default)]
    pub orientation: VideoOrientation,

    // Tables last so the TOML output stays valid
    #[serde(default = "default_stream_size")]
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default)]
    pub content_mode: ContentFitMode,

    /// Orientation of the device when recording starts
    #[serde(default = "default_device_orientation")]
    pub device_orientation: DeviceOrientation,

    /// Image shown on the stream while stand-by is on
    #[serde(default)]
    pub standby_image: Option<PathBuf>,

    /// On-screen surface size
    #[serde(default = "default_display_size")]
    pub display: Size,

    /// Full native screen resolution
    #[serde(default = "default_display_size")]
    pub native: Size,
}

// Default value functions
fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_video_bitrate() -> u32 {
    3000
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_stream_size() -> Size {
    Size::new(1920, 1080)
}

fn default_fps() -> u32 {
    30
}

fn default_device_orientation() -> DeviceOrientation {
    DeviceOrientation::Portrait
}

fn default_display_size() -> Size {
    Size::new(720, 1280)
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            stream_key: String::new(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_ms(),
            video_bitrate_kbps: default_video_bitrate(),
            frame_rate: default_frame_rate(),
            profile: H264Profile::default(),
            orientation: VideoOrientation::default(),
            size: default_stream_size(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            content_mode: ContentFitMode::default(),
            device_orientation: default_device_orientation(),
            standby_image: None,
            display: default_display_size(),
            native: default_display_size(),
        }
    }
}

impl StreamConfig {
    /// Session settings derived from this table
    pub fn session_config(&self) -> StreamSessionConfig {
        StreamSessionConfig {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            settings: StreamSettings {
                orientation: self.orientation,
                size: self.size,
                profile: self.profile,
                video_bitrate: self.video_bitrate_kbps.saturating_mul(1000),
                frame_rate: self.frame_rate,
            },
            ..StreamSessionConfig::new(self.url.clone(), self.stream_key.clone())
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the platform config directory
    ///
    /// A missing file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
                path: config_path.clone(),
                source,
            })?;

            let mut config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?;

            config.config_path = Some(config_path);
            config.validate()?;
            Ok(config)
        } else {
            info!("Creating default config at {}", config_path.display());
            let config = Config {
                config_path: Some(config_path),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf, ConfigError> {
        let proj_dirs = directories::ProjectDirs::from("dev", "dualcast", "dualcast")
            .ok_or(ConfigError::NoConfigDir)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.fps == 0 || self.capture.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "capture.fps must be within 1..=120, got {}",
                self.capture.fps
            )));
        }
        if self.writer.width == 0 || self.writer.height == 0 {
            return Err(ConfigError::Invalid("writer size must not be empty".into()));
        }
        if self.writer.audio_channels == 0 {
            return Err(ConfigError::Invalid("writer.audio_channels must be positive".into()));
        }
        if self.writer.output_mode.uses_stream() && self.stream.url.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "writer.output_mode = {:?} needs stream.url",
                self.writer.output_mode
            )));
        }
        if self.stream.frame_rate <= 0.0 {
            return Err(ConfigError::Invalid("stream.frame_rate must be positive".into()));
        }
        Ok(())
    }
}
