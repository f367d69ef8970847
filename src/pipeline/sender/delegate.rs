//! Writer notifications

use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::SinkError;

/// Receives asynchronous writer notifications
///
/// Called from the writer's append path, so implementations must not block.
pub trait WriterDelegate: Send + Sync {
    /// The file path failed; `error` is the container's last error if it has one
    fn on_recording_failed(&self, error: Option<SinkError>, message: &str);

    /// Elapsed recording time after a routed video sample
    fn on_recording_progress(&self, _duration: Duration) {}
}

/// Notification emitted by [`ChannelDelegate`]
#[derive(Debug, Clone, PartialEq)]
pub enum WriterEvent {
    Failed {
        error: Option<SinkError>,
        message: String,
    },
    Progress(Duration),
}

/// Delegate that forwards every notification into a channel
pub struct ChannelDelegate {
    tx: mpsc::UnboundedSender<WriterEvent>,
}

impl ChannelDelegate {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WriterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WriterDelegate for ChannelDelegate {
    fn on_recording_failed(&self, error: Option<SinkError>, message: &str) {
        // The receiver may already be gone during shutdown
        let _ = self.tx.send(WriterEvent::Failed {
            error,
            message: message.to_string(),
        });
    }

    fn on_recording_progress(&self, duration: Duration) {
        let _ = self.tx.send(WriterEvent::Progress(duration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delegate_forwards_in_order() {
        let (delegate, mut rx) = ChannelDelegate::new();
        delegate.on_recording_progress(Duration::from_millis(33));
        delegate.on_recording_failed(Some(SinkError::Cancelled), "stopped");

        assert_eq!(
            rx.try_recv().ok(),
            Some(WriterEvent::Progress(Duration::from_millis(33)))
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(WriterEvent::Failed {
                error: Some(SinkError::Cancelled),
                message: "stopped".into()
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (delegate, rx) = ChannelDelegate::new();
        drop(rx);
        delegate.on_recording_progress(Duration::ZERO);
    }
}
