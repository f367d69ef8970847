//! Pipeline stage trait
//!
//! Each stage owns one serial context of the pipeline (video capture, audio
//! append) and runs in its own task until cancelled.

use anyhow::Result;
use async_trait::async_trait;

/// Trait for pipeline stages that move samples into the writer
#[async_trait]
pub trait PipelineStage: Send {
    /// Run the stage, processing data until shutdown signal
    async fn run(&mut self) -> Result<()>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;

    /// Gracefully shutdown the stage
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drive a stage to completion on the runtime, logging how it ended
pub fn spawn_stage<S>(mut stage: S) -> tokio::task::JoinHandle<()>
where
    S: PipelineStage + 'static,
{
    tokio::spawn(async move {
        let name = stage.name();
        log::debug!("{}: started", name);
        if let Err(e) = stage.run().await {
            log::error!("{}: {:#}", name, e);
        }
        if let Err(e) = stage.shutdown().await {
            log::warn!("{}: shutdown failed: {:#}", name, e);
        }
        log::debug!("{}: stopped", name);
    })
}
