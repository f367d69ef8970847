//! Audio stage: drains microphone buffers into the writer

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::SharedWriter;
use crate::pipeline::PipelineStage;
use crate::pipeline::clock::MediaClock;
use crate::pipeline::types::AudioSample;

pub struct AudioStage {
    input_rx: Option<mpsc::Receiver<AudioSample>>,
    clock: MediaClock,
    writer: SharedWriter,
    cancel: CancellationToken,
}

impl AudioStage {
    pub fn new(
        input_rx: mpsc::Receiver<AudioSample>,
        clock: MediaClock,
        writer: SharedWriter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            input_rx: Some(input_rx),
            clock,
            writer,
            cancel,
        }
    }
}

#[async_trait]
impl PipelineStage for AudioStage {
    async fn run(&mut self) -> Result<()> {
        let mut input_rx = self
            .input_rx
            .take()
            .ok_or_else(|| anyhow!("AudioStage: no input channel"))?;

        let mut count = 0u64;
        loop {
            let sample = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sample = input_rx.recv() => match sample {
                    Some(sample) => sample,
                    None => break,
                },
            };

            let pts = self.clock.native_timestamp(sample.pts);
            self.writer.lock().append_audio(AudioSample { pts, ..sample });
            count += 1;
        }

        debug!("AudioStage: {} buffers processed", count);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "AudioStage"
    }
}
