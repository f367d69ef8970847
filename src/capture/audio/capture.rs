//! Microphone capture
//!
//! Reads the default input device with cpal and hands interleaved f32 PCM to
//! the pipeline, stamped on the shared media clock.

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use log::{error, info, warn};
use std::thread;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::pipeline::clock::MediaClock;
use crate::pipeline::types::{AudioFormat, AudioSample};

/// Capacity of the channel between the device callback and the audio stage
const CHANNEL_CAPACITY: usize = 256;

struct Forwarder {
    clock: MediaClock,
    format: AudioFormat,
    sender: mpsc::Sender<AudioSample>,
}

impl Forwarder {
    fn write_input_data<T>(&self, input: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        let samples: Vec<f32> = input.iter().map(|s| s.to_sample::<f32>()).collect();
        let sample = AudioSample::from_f32(&samples, self.format, self.clock.now());
        if self.sender.try_send(sample).is_err() {
            warn!("Audio stage lagging, dropping microphone buffer");
        }
    }
}

/// Microphone capture session
pub struct MicrophoneCapture;

impl MicrophoneCapture {
    /// Starts capture and returns the device format with a Tokio channel of
    /// PCM samples.
    ///
    /// The channel closes when the `CancellationToken` is cancelled.
    pub fn start(
        cancel: CancellationToken,
        clock: MediaClock,
    ) -> Result<(AudioFormat, mpsc::Receiver<AudioSample>)> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow!("No default input device found"))?;

        let config = device
            .default_input_config()
            .map_err(|e| anyhow!("Failed to get default input config: {}", e))?;

        // cpal opens inputs in shared mode, other apps keep the microphone
        info!("Audio capture config: {:?}", config);

        let format = AudioFormat {
            sample_rate: config.sample_rate(),
            channels: config.channels(),
        };
        let sample_format = config.sample_format();
        let (tx, rx) = mpsc::channel::<AudioSample>(CHANNEL_CAPACITY);

        // cpal streams are not Send: build, play and drop on one thread
        let handle = tokio::runtime::Handle::current();
        thread::spawn(move || {
            let forwarder = Forwarder {
                clock,
                format,
                sender: tx,
            };
            let stream = match Self::build_stream(&device, config.into(), sample_format, forwarder) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to open microphone: {}", e);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                error!("Failed to start microphone: {}", e);
                return;
            }
            info!("Audio capture started");

            handle.block_on(cancel.cancelled());

            if let Err(e) = stream.pause() {
                warn!("Failed to pause microphone: {}", e);
            }
            info!("Audio capture stopped");
        });

        Ok((format, rx))
    }

    fn build_stream(
        device: &cpal::Device,
        config: cpal::StreamConfig,
        sample_format: SampleFormat,
        forwarder: Forwarder,
    ) -> Result<cpal::Stream> {
        match sample_format {
            SampleFormat::I8 => Self::build_typed::<i8>(device, config, forwarder),
            SampleFormat::I16 => Self::build_typed::<i16>(device, config, forwarder),
            SampleFormat::I32 => Self::build_typed::<i32>(device, config, forwarder),
            SampleFormat::F32 => Self::build_typed::<f32>(device, config, forwarder),
            other => Err(anyhow!("Unsupported sample format: {:?}", other)),
        }
    }

    fn build_typed<T>(
        device: &cpal::Device,
        config: cpal::StreamConfig,
        forwarder: Forwarder,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let err_fn = |err| error!("Audio stream error: {}", err);
        let stream = device.build_input_stream(
            &config,
            move |data: &[T], _: &cpal::InputCallbackInfo| forwarder.write_input_data(data),
            err_fn,
            None,
        )?;
        Ok(stream)
    }
}
