use ac_ffmpeg::codec::audio::frame::get_sample_format;
use ac_ffmpeg::codec::audio::{AudioEncoder, AudioFrameMut, ChannelLayout};
use ac_ffmpeg::codec::video::scaler::VideoFrameScaler;
use ac_ffmpeg::codec::video::{self, VideoEncoder, VideoFrameMut};
use ac_ffmpeg::codec::{CodecParameters, Encoder};
use ac_ffmpeg::format::io::IO;
use ac_ffmpeg::format::muxer::{Muxer, OutputFormat};
use ac_ffmpeg::time::{TimeBase, Timestamp as FfTimestamp};
use log::{debug, error, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::{ContainerSink, ContainerStatus, FinalizeCallback, TrackSettings};
use crate::error::SinkError;
use crate::pipeline::frame::FrameBuffer;
use crate::pipeline::types::{
    AudioFormat, AudioSample, MediaKind, MediaSample, TIMESCALE, Timestamp, VideoSample,
};

/// Encoder fallback chain: try hardware encoders first, then software.
///
/// Tuned for recording: constant quality where the encoder supports it, a
/// keyframe every two seconds at 30 fps, no B-frames so timestamps from the
/// render clock can be used as-is.
const ENCODER_CHAIN: &[(&str, &[(&str, &str)])] = &[
    (
        "h264_nvenc",
        &[
            ("preset", "p4"),
            ("rc", "vbr"),
            ("b", "6000000"),
            ("maxrate", "9000000"),
            ("g", "60"),
            ("bf", "0"),
        ],
    ),
    (
        "h264_qsv",
        &[("preset", "medium"), ("b", "6000000"), ("g", "60"), ("bf", "0")],
    ),
    (
        "h264_amf",
        &[
            ("usage", "transcoding"),
            ("quality", "balanced"),
            ("b", "6000000"),
            ("g", "60"),
            ("bf", "0"),
        ],
    ),
    (
        "libx264",
        &[
            ("profile", "high"),
            ("preset", "veryfast"),
            ("crf", "20"),
            ("keyint", "60"),
            ("bframes", "0"),
            ("threads", "0"),
        ],
    ),
];

/// Extra options for encoders feeding a live source
const REAL_TIME_OPTIONS: &[(&str, &str)] = &[("tune", "zerolatency")];

const AUDIO_CODEC: &str = "libopus";
const AUDIO_BITRATE: &str = "128000";
const AUDIO_SAMPLE_RATES: &[u32] = &[8_000, 12_000, 16_000, 24_000, 48_000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    None,
    Clockwise,
    CounterClockwise,
}

impl Rotation {
    fn from_degrees(degrees: f64) -> Self {
        let quarter = (degrees / 90.0).round() as i64;
        match quarter.rem_euclid(4) {
            1 => Rotation::Clockwise,
            3 => Rotation::CounterClockwise,
            2 => {
                warn!("180 degree track rotation is not supported, ignoring");
                Rotation::None
            }
            _ => Rotation::None,
        }
    }

    fn apply(&self, frame: &FrameBuffer) -> FrameBuffer {
        match self {
            Rotation::None => frame.clone(),
            Rotation::Clockwise => frame.rotated_right(),
            Rotation::CounterClockwise => frame.rotated_left(),
        }
    }

    fn swaps_axes(&self) -> bool {
        !matches!(self, Rotation::None)
    }
}

struct VideoTrack {
    encoder: VideoEncoder,
    codec_name: String,
    scaler: Option<(crate::pipeline::frame::PixelFormat, VideoFrameScaler)>,
    width: usize,
    height: usize,
    rotation: Rotation,
    stream_index: usize,
}

struct AudioTrack {
    encoder: AudioEncoder,
    format: AudioFormat,
    samples_per_frame: usize,
    pending: Vec<f32>,
    next_pts: Option<i64>,
    stream_index: usize,
}

/// MP4 (or any FFmpeg-guessable format) container on local storage
///
/// The muxer does not expose a display matrix, so track rotation is applied
/// to the pixels before encoding and the stored frames are upright.
pub struct FfmpegContainer {
    path: PathBuf,
    file: Option<File>,
    output_format: Option<OutputFormat>,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
    muxer: Option<Muxer<File>>,
    session_start: Option<Timestamp>,
    status: ContainerStatus,
    last_error: Option<SinkError>,
    optimize_for_network: bool,
}

unsafe impl Send for FfmpegContainer {}

impl FfmpegContainer {
    /// Create the output file and pick the container format from its extension
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |reason: String| SinkError::Open {
            path: path.clone(),
            reason,
        };

        let name = path
            .to_str()
            .ok_or_else(|| open_err("path is not valid UTF-8".into()))?;
        let output_format = OutputFormat::guess_from_file_name(name)
            .ok_or_else(|| open_err("unknown container extension".into()))?;
        let file = File::create(&path).map_err(|e| open_err(e.to_string()))?;

        info!("Container opened at {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
            output_format: Some(output_format),
            video: None,
            audio: None,
            muxer: None,
            session_start: None,
            status: ContainerStatus::Unknown,
            last_error: None,
            optimize_for_network: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an audio track in `format` can be added
    pub fn supports_audio(format: AudioFormat) -> bool {
        AUDIO_SAMPLE_RATES.contains(&format.sample_rate) && (1..=2).contains(&format.channels)
    }

    fn try_create_video_encoder(
        w: usize,
        h: usize,
        real_time: bool,
    ) -> Result<(VideoEncoder, String), String> {
        let time_base = TimeBase::new(1, TIMESCALE);
        let pixel_format = video::frame::get_pixel_format("nv12");

        for (codec, options) in ENCODER_CHAIN {
            let mut builder = match VideoEncoder::builder(codec) {
                Ok(b) => b,
                Err(e) => {
                    debug!("Encoder {} not available, skipping: {}", codec, e);
                    continue;
                }
            };
            builder = builder
                .pixel_format(pixel_format)
                .width(w)
                .height(h)
                .time_base(time_base)
                .set_option("flags", "+global_header");
            for (k, v) in *options {
                builder = builder.set_option(k, v);
            }
            if real_time && *codec == "libx264" {
                for (k, v) in REAL_TIME_OPTIONS {
                    builder = builder.set_option(k, v);
                }
            }
            match builder.build() {
                Ok(enc) => return Ok((enc, codec.to_string())),
                Err(e) => {
                    debug!("Encoder {} failed to initialize: {}", codec, e);
                    continue;
                }
            }
        }
        Err("no H.264 encoder available, install FFmpeg with at least libx264 support".into())
    }

    fn add_video_track(&mut self, width: u32, height: u32, rotation_degrees: f64, real_time: bool) -> Result<(), String> {
        if self.video.is_some() {
            return Err("video track already added".into());
        }
        let rotation = Rotation::from_degrees(rotation_degrees);
        let (w, h) = if rotation.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        };
        let w = make_even(w as usize);
        let h = make_even(h as usize);
        if w == 0 || h == 0 {
            return Err(format!("invalid video size {}x{}", width, height));
        }

        let (encoder, codec_name) = Self::try_create_video_encoder(w, h, real_time)?;
        info!(
            "Video track {}x{} using {} (rotation {:?})",
            w, h, codec_name, rotation
        );
        self.video = Some(VideoTrack {
            encoder,
            codec_name,
            scaler: None,
            width: w,
            height: h,
            rotation,
            stream_index: 0,
        });
        Ok(())
    }

    fn add_audio_track(&mut self, sample_rate: u32, channels: u16) -> Result<(), String> {
        if self.audio.is_some() {
            return Err("audio track already added".into());
        }
        if !AUDIO_SAMPLE_RATES.contains(&sample_rate) {
            return Err(format!("{} does not encode at {} Hz", AUDIO_CODEC, sample_rate));
        }
        let layout = ChannelLayout::from_channels(channels as u32)
            .ok_or_else(|| format!("unsupported channel count {}", channels))?;
        let encoder = AudioEncoder::builder(AUDIO_CODEC)
            .map_err(|e| e.to_string())?
            .sample_rate(sample_rate)
            .channel_layout(layout)
            .sample_format(get_sample_format("flt"))
            .set_option("b", AUDIO_BITRATE)
            .build()
            .map_err(|e| e.to_string())?;
        let samples_per_frame = encoder
            .samples_per_frame()
            .ok_or_else(|| format!("{} reports no frame size", AUDIO_CODEC))?;

        info!(
            "Audio track {} Hz x{} using {} ({} samples per frame)",
            sample_rate, channels, AUDIO_CODEC, samples_per_frame
        );
        self.audio = Some(AudioTrack {
            encoder,
            format: AudioFormat {
                sample_rate,
                channels,
            },
            samples_per_frame,
            pending: Vec::new(),
            next_pts: None,
            stream_index: 0,
        });
        Ok(())
    }

    fn build_muxer(&mut self) -> Result<(), String> {
        let file = self.file.take().ok_or("output file already consumed")?;
        let format = self
            .output_format
            .take()
            .ok_or("output format already consumed")?;

        let mut builder = Muxer::builder();
        if let Some(track) = self.video.as_mut() {
            let params: CodecParameters = track.encoder.codec_parameters().into();
            track.stream_index = builder.add_stream(&params).map_err(|e| e.to_string())?;
        }
        if let Some(track) = self.audio.as_mut() {
            let params: CodecParameters = track.encoder.codec_parameters().into();
            track.stream_index = builder.add_stream(&params).map_err(|e| e.to_string())?;
        }
        if self.optimize_for_network {
            builder = builder.set_option("movflags", "+faststart");
        }

        let io = IO::from_seekable_write_stream(file);
        let muxer = builder
            .interleaved(true)
            .build(io, format)
            .map_err(|e| e.to_string())?;
        self.muxer = Some(muxer);
        Ok(())
    }

    fn write_video(&mut self, sample: &VideoSample) -> Result<(), String> {
        let start = self.session_start.ok_or("session not started")?;
        let track = self.video.as_mut().ok_or("no video track")?;
        let muxer = self.muxer.as_mut().ok_or("container not writing")?;

        let mut frame = track.rotation.apply(&sample.frame);
        if frame.width() as usize != track.width || frame.height() as usize != track.height {
            frame = frame.resized(track.width as u32, track.height as u32);
        }

        let time_base = TimeBase::new(1, TIMESCALE);
        let pts = FfTimestamp::new(
            sample.pts.as_micros() - start.as_micros(),
            time_base,
        );

        let source_format = video::frame::get_pixel_format(frame.format().ffmpeg_name());
        let mut source = VideoFrameMut::black(source_format, track.width, track.height)
            .with_time_base(time_base);
        copy_packed_rows(&frame, &mut source);
        let source = source.with_pts(pts).freeze();

        let rebuild = !matches!(&track.scaler, Some((fmt, _)) if *fmt == frame.format());
        if rebuild {
            let scaler = VideoFrameScaler::builder()
                .source_pixel_format(source_format)
                .source_width(track.width)
                .source_height(track.height)
                .target_pixel_format(video::frame::get_pixel_format("nv12"))
                .target_width(track.width)
                .target_height(track.height)
                .build()
                .map_err(|e| e.to_string())?;
            track.scaler = Some((frame.format(), scaler));
        }
        let Some((_, scaler)) = track.scaler.as_mut() else {
            return Err("scaler unavailable".into());
        };
        let scaled = scaler.scale(&source).map_err(|e| e.to_string())?.with_pts(pts);

        track.encoder.push(scaled).map_err(|e| e.to_string())?;
        while let Some(packet) = track.encoder.take().map_err(|e| e.to_string())? {
            muxer
                .push(packet.with_stream_index(track.stream_index))
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn write_audio(&mut self, sample: &AudioSample) -> Result<(), String> {
        let start = self.session_start.ok_or("session not started")?;
        let track = self.audio.as_mut().ok_or("no audio track")?;
        let muxer = self.muxer.as_mut().ok_or("container not writing")?;

        if sample.format != track.format {
            return Err(format!(
                "audio format {:?} does not match track {:?}",
                sample.format, track.format
            ));
        }
        if sample.pts < start {
            debug!("Dropping audio captured before the session start");
            return Ok(());
        }

        if track.next_pts.is_none() {
            let offset = Timestamp::from_micros(sample.pts.as_micros() - start.as_micros());
            track.next_pts = Some(offset.rescale(track.format.sample_rate as i32).value);
        }
        track.pending.extend(sample.to_f32());
        track.encode_pending(muxer, false)
    }

    fn fail(&mut self, error: SinkError) {
        error!("Container {}: {}", self.path.display(), error);
        self.status = ContainerStatus::Failed;
        self.last_error = Some(error);
    }
}

impl AudioTrack {
    /// Encode whole frames from `pending`; with `drain` the tail is padded with silence
    fn encode_pending(&mut self, muxer: &mut Muxer<File>, drain: bool) -> Result<(), String> {
        let channels = self.format.channels.max(1) as usize;
        let frame_len = self.samples_per_frame * channels;
        if drain && !self.pending.is_empty() {
            let padded = self.pending.len().div_ceil(frame_len) * frame_len;
            self.pending.resize(padded, 0.0);
        }

        let time_base = TimeBase::new(1, self.format.sample_rate as i32);
        while self.pending.len() >= frame_len {
            let chunk: Vec<f32> = self.pending.drain(..frame_len).collect();
            let params = self.encoder.codec_parameters();
            let mut frame = AudioFrameMut::silence(
                params.channel_layout(),
                params.sample_format(),
                params.sample_rate(),
                self.samples_per_frame,
            );
            {
                let mut planes = frame.planes_mut();
                let data = planes[0].data_mut();
                for (dst, value) in data.chunks_exact_mut(4).zip(chunk.iter()) {
                    dst.copy_from_slice(&value.to_ne_bytes());
                }
            }
            let pts = self.next_pts.unwrap_or(0);
            self.next_pts = Some(pts + self.samples_per_frame as i64);
            let frame = frame
                .with_time_base(time_base)
                .with_pts(FfTimestamp::new(pts, time_base))
                .freeze();

            self.encoder.push(frame).map_err(|e| e.to_string())?;
            while let Some(packet) = self.encoder.take().map_err(|e| e.to_string())? {
                muxer
                    .push(packet.with_stream_index(self.stream_index))
                    .map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }
}

/// Everything needed to close the file, moved to a background thread
struct PendingFlush {
    muxer: Muxer<File>,
    video: Option<VideoTrack>,
    audio: Option<AudioTrack>,
}

unsafe impl Send for PendingFlush {}

impl PendingFlush {
    fn run(mut self) -> Result<(), String> {
        if let Some(mut track) = self.audio.take() {
            track.encode_pending(&mut self.muxer, true)?;
            track.encoder.flush().map_err(|e| e.to_string())?;
            while let Some(packet) = track.encoder.take().map_err(|e| e.to_string())? {
                self.muxer
                    .push(packet.with_stream_index(track.stream_index))
                    .map_err(|e| e.to_string())?;
            }
        }
        if let Some(mut track) = self.video.take() {
            track.encoder.flush().map_err(|e| e.to_string())?;
            while let Some(packet) = track.encoder.take().map_err(|e| e.to_string())? {
                self.muxer
                    .push(packet.with_stream_index(track.stream_index))
                    .map_err(|e| e.to_string())?;
            }
            debug!("Flushed {} encoder", track.codec_name);
        }
        self.muxer.flush().map_err(|e| e.to_string())?;
        self.muxer.close().map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl ContainerSink for FfmpegContainer {
    fn add_track(&mut self, settings: TrackSettings) -> Result<(), SinkError> {
        let kind = settings.kind();
        if self.status != ContainerStatus::Unknown {
            return Err(SinkError::TrackRejected {
                kind,
                reason: "container already started".into(),
            });
        }
        let result = match settings {
            TrackSettings::Video {
                width,
                height,
                rotation_degrees,
                real_time,
            } => self.add_video_track(width, height, rotation_degrees, real_time),
            TrackSettings::Audio {
                sample_rate,
                channels,
                ..
            } => self.add_audio_track(sample_rate, channels),
        };
        result.map_err(|reason| SinkError::TrackRejected { kind, reason })
    }

    fn is_ready_for_more_data(&self, kind: MediaKind) -> bool {
        if self.status != ContainerStatus::Writing {
            return false;
        }
        match kind {
            MediaKind::Video => self.video.is_some(),
            MediaKind::Audio => self.audio.is_some(),
        }
    }

    fn append(&mut self, sample: &MediaSample) -> bool {
        if self.status != ContainerStatus::Writing {
            return false;
        }
        let result = match sample {
            MediaSample::Video(video) => self.write_video(video),
            MediaSample::Audio(audio) => self.write_audio(audio),
        };
        match result {
            Ok(()) => true,
            Err(reason) => {
                self.fail(SinkError::Write {
                    kind: sample.kind(),
                    reason,
                });
                false
            }
        }
    }

    fn start_writing(&mut self) -> bool {
        if self.status != ContainerStatus::Unknown {
            return self.status == ContainerStatus::Writing;
        }
        match self.build_muxer() {
            Ok(()) => {
                self.status = ContainerStatus::Writing;
                true
            }
            Err(reason) => {
                self.fail(SinkError::Start(reason));
                false
            }
        }
    }

    fn start_session(&mut self, at: Timestamp) {
        self.session_start = Some(at);
    }

    fn finalize(&mut self, on_complete: FinalizeCallback) {
        if self.status != ContainerStatus::Writing {
            let err = self
                .last_error
                .clone()
                .unwrap_or_else(|| SinkError::Finalize(format!("container is {:?}", self.status)));
            on_complete(Err(err));
            return;
        }
        let Some(muxer) = self.muxer.take() else {
            on_complete(Err(SinkError::Finalize("muxer missing".into())));
            return;
        };

        self.status = ContainerStatus::Completed;
        let flush = PendingFlush {
            muxer,
            video: self.video.take(),
            audio: self.audio.take(),
        };
        let path = self.path.clone();
        std::thread::spawn(move || {
            let result = flush.run().map_err(SinkError::Finalize);
            match &result {
                Ok(()) => info!("Container finalized at {}", path.display()),
                Err(e) => error!("Container {}: {}", path.display(), e),
            }
            on_complete(result);
        });
    }

    fn cancel(&mut self) {
        if matches!(
            self.status,
            ContainerStatus::Cancelled | ContainerStatus::Completed
        ) {
            return;
        }
        self.muxer = None;
        self.video = None;
        self.audio = None;
        self.file = None;
        self.status = ContainerStatus::Cancelled;
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove {}: {}", self.path.display(), e);
        }
        info!("Container at {} cancelled", self.path.display());
    }

    fn status(&self) -> ContainerStatus {
        self.status
    }

    fn last_error(&self) -> Option<SinkError> {
        self.last_error.clone()
    }

    fn set_optimize_for_network(&mut self, enabled: bool) {
        self.optimize_for_network = enabled;
    }
}

fn make_even(v: usize) -> usize {
    if v.is_multiple_of(2) { v } else { v + 1 }
}

/// Copy tightly packed 4-byte pixels into a frame whose rows may be padded
fn copy_packed_rows(frame: &FrameBuffer, target: &mut VideoFrameMut) {
    let row_bytes = frame.width() as usize * frame.format().bytes_per_pixel();
    let rows = frame.height() as usize;
    let mut planes = target.planes_mut();
    let plane = &mut planes[0];
    let line_size = plane.line_size();
    let data = plane.data_mut();
    let src = frame.data();

    if line_size == row_bytes && data.len() >= rows * row_bytes {
        data[..rows * row_bytes].copy_from_slice(&src[..rows * row_bytes]);
        return;
    }
    for r in 0..rows {
        let dst_start = r * line_size;
        if dst_start + row_bytes > data.len() {
            break;
        }
        data[dst_start..dst_start + row_bytes]
            .copy_from_slice(&src[r * row_bytes..(r + 1) * row_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(0.0), Rotation::None);
        assert_eq!(Rotation::from_degrees(90.0), Rotation::Clockwise);
        assert_eq!(Rotation::from_degrees(-90.0), Rotation::CounterClockwise);
        assert_eq!(Rotation::from_degrees(270.0), Rotation::CounterClockwise);
        assert!(Rotation::from_degrees(-90.0).swaps_axes());
    }

    #[test]
    fn test_make_even() {
        assert_eq!(make_even(1080), 1080);
        assert_eq!(make_even(1081), 1082);
    }

    #[test]
    fn test_supported_audio_formats() {
        let at = |sample_rate, channels| AudioFormat {
            sample_rate,
            channels,
        };
        assert!(FfmpegContainer::supports_audio(at(48_000, 2)));
        assert!(FfmpegContainer::supports_audio(at(16_000, 1)));
        assert!(!FfmpegContainer::supports_audio(at(44_100, 2)));
        assert!(!FfmpegContainer::supports_audio(at(48_000, 6)));
    }

    #[test]
    fn test_open_rejects_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("out.mp4");
        assert!(matches!(
            FfmpegContainer::open(&missing),
            Err(SinkError::Open { .. })
        ));
    }

    #[test]
    fn test_cancel_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.mp4");
        let mut container = FfmpegContainer::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(container.status(), ContainerStatus::Unknown);
        assert!(!container.is_ready_for_more_data(MediaKind::Video));

        container.cancel();
        container.cancel();
        assert_eq!(container.status(), ContainerStatus::Cancelled);
        assert!(!path.exists());
    }
}
