//! Live connection lifecycle with bounded reconnect

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{EventKind, ListenerId, StatusCode, StreamClient, StreamEvent, StreamSettings};
use crate::geometry::{self, DeviceOrientation};
use crate::pipeline::health::StreamHealth;
use crate::pipeline::state::ConnectionState;
use crate::pipeline::types::{AudioSample, VideoSample};

/// Zoom ramp speed used for interactive zoom changes
const ZOOM_RAMP_RATE: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct StreamSessionConfig {
    pub uri: String,
    pub stream_key: String,
    /// Reconnect attempts allowed between two successful connects
    ///
    /// The bound is exclusive: with 2, the session retries after 1s and 2s,
    /// and the next failure gives up instead of waiting 4s.
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub backoff_base: Duration,
    pub settings: StreamSettings,
}

impl StreamSessionConfig {
    pub fn new(uri: impl Into<String>, stream_key: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            stream_key: stream_key.into(),
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
            settings: StreamSettings::default(),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    listeners: Vec<(EventKind, ListenerId)>,
    _task: JoinHandle<()>,
}

/// Owns the connection to the media server
///
/// Status events are handled on one task in arrival order. Once publishing,
/// that task is the only writer of the connection state and the retry
/// counter; everything else only reads them.
pub struct StreamSession {
    client: Arc<dyn StreamClient>,
    config: StreamSessionConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    retry_count: Arc<AtomicU32>,
    health: Arc<StreamHealth>,
    running: Mutex<Option<Running>>,
}

impl StreamSession {
    pub fn new(client: Arc<dyn StreamClient>, config: StreamSessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            client,
            config,
            state: Arc::new(state),
            retry_count: Arc::new(AtomicU32::new(0)),
            health: Arc::new(StreamHealth::new()),
            running: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> &Arc<StreamHealth> {
        &self.health
    }

    pub fn is_publishing(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Push the initial encoding settings to the client
    pub fn configure(&self) {
        let settings = &self.config.settings;
        info!(
            "StreamSession: {} {:?} at {} bps, {} fps",
            settings.size, settings.profile, settings.video_bitrate, settings.frame_rate
        );
        self.client.configure(settings);
    }

    /// Register for status events and connect
    ///
    /// Must be called from within a Tokio runtime. Calling it again while
    /// publishing does nothing.
    pub fn start_publish(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            debug!("StreamSession: already publishing");
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let listeners = vec![
            (
                EventKind::Status,
                self.client.add_listener(EventKind::Status, tx.clone()),
            ),
            (
                EventKind::IoError,
                self.client.add_listener(EventKind::IoError, tx),
            ),
        ];

        let events = EventLoop {
            client: self.client.clone(),
            uri: self.config.uri.clone(),
            stream_key: self.config.stream_key.clone(),
            max_retries: self.config.max_retries,
            backoff_base: self.config.backoff_base,
            state: self.state.clone(),
            retry_count: self.retry_count.clone(),
            health: self.health.clone(),
        };

        info!("StreamSession: connecting to {}", self.config.uri);
        events.set_state(ConnectionState::Connecting);
        self.client.connect(&self.config.uri);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(events.run(rx, cancel.clone()));
        *running = Some(Running {
            cancel,
            listeners,
            _task: task,
        });
    }

    /// Close the connection and deregister the listeners added by `start_publish`
    pub fn stop_publish(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.cancel.cancel();
        self.client.close();
        for (kind, id) in running.listeners {
            if !self.client.remove_listener(kind, id) {
                warn!("StreamSession: listener {:?} for {:?} was already gone", id, kind);
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
        info!("StreamSession: stopped publishing");
    }

    // ── Samples ─────────────────────────────────────────────────

    pub fn append_video(&self, sample: VideoSample) {
        self.client.append_sample(sample.into());
    }

    pub fn append_audio(&self, sample: AudioSample) {
        self.client.append_sample(sample.into());
    }

    // ── Controls ────────────────────────────────────────────────

    pub fn pause_publish(&self) {
        let paused = !self.client.is_paused();
        self.client.set_paused(paused);
        info!("StreamSession: {}", if paused { "paused" } else { "resumed" });
    }

    pub fn toggle_torch(&self) {
        self.client.set_torch(!self.client.torch());
    }

    pub fn change_zoom_level(&self, level: f64) {
        self.client.set_zoom_factor(level, true, ZOOM_RAMP_RATE);
    }

    /// Video bitrate in kbit/s
    pub fn change_video_rate(&self, kbps: u32) {
        self.client.set_video_bitrate(kbps.saturating_mul(1000));
    }

    /// Audio bitrate in kbit/s
    pub fn change_audio_rate(&self, kbps: u32) {
        self.client.set_audio_bitrate(kbps.saturating_mul(1000));
    }

    pub fn change_frame_rate(&self, fps: f64) {
        self.client.set_frame_rate(fps);
    }

    /// Update the stream's orientation tag after the device rotated
    pub fn on_device_orientation_changed(&self, orientation: DeviceOrientation) {
        if let Some(tag) = geometry::stream_orientation(orientation) {
            debug!("StreamSession: orientation tag {:?}", tag);
            self.client.set_orientation(tag);
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

/// State owned by the event-handling task
struct EventLoop {
    client: Arc<dyn StreamClient>,
    uri: String,
    stream_key: String,
    max_retries: u32,
    backoff_base: Duration,
    state: Arc<watch::Sender<ConnectionState>>,
    retry_count: Arc<AtomicU32>,
    health: Arc<StreamHealth>,
}

impl EventLoop {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<StreamEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event, &cancel).await;
        }
        debug!("StreamSession: event loop stopped");
    }

    async fn handle(&self, event: StreamEvent, cancel: &CancellationToken) {
        match event {
            StreamEvent::Status(StatusCode::ConnectSuccess) => {
                self.retry_count.store(0, Ordering::Relaxed);
                self.set_state(ConnectionState::Connected);
                self.health.record_connect();
                info!("StreamSession: connected, publishing");
                self.client.publish(&self.stream_key);
            }
            StreamEvent::Status(code @ (StatusCode::ConnectFailed | StatusCode::ConnectClosed)) => {
                self.set_state(if code == StatusCode::ConnectFailed {
                    ConnectionState::Failed
                } else {
                    ConnectionState::Disconnected
                });

                let retry = self.retry_count.load(Ordering::Relaxed);
                if retry >= self.max_retries {
                    warn!(
                        "StreamSession: {:?} after {} retries, giving up",
                        code, retry
                    );
                    self.health.record_retries_exhausted();
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }

                let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(retry));
                info!(
                    "StreamSession: {:?}, reconnecting in {:?} ({}/{})",
                    code,
                    delay,
                    retry + 1,
                    self.max_retries
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                self.set_state(ConnectionState::Connecting);
                self.client.connect(&self.uri);
                self.retry_count.store(retry + 1, Ordering::Relaxed);
                self.health.record_retry();
            }
            StreamEvent::Status(StatusCode::Other(code)) => {
                debug!("StreamSession: status {}", code);
            }
            StreamEvent::IoError(reason) => {
                warn!("StreamSession: i/o error ({}), reconnecting", reason);
                self.health.record_io_error_reconnect();
                self.set_state(ConnectionState::Connecting);
                self.client.connect(&self.uri);
            }
        }
    }

    fn set_state(&self, target: ConnectionState) {
        let current = *self.state.borrow();
        if !current.can_transition_to(&target) {
            debug!("StreamSession: unexpected transition {} -> {}", current, target);
        }
        self.state.send_replace(target);
    }
}
