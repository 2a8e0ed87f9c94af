//! The single control channel between the client and the device controller.
//!
//! A [`Channel`] owns the connection. Socket I/O runs in a background task;
//! the session talks to it through two bounded queues and receives events one
//! at a time through [`Channel::dispatch`], on its own task, so handlers never
//! run concurrently with each other or with command dispatch.
//!
//! Both queues are bounded by the configured capacity. A full incoming queue
//! never stops outgoing frames: the I/O task holds back what it has read and
//! stops reading the socket until the session dispatches, so a session
//! blocked in [`Channel::send`] cannot deadlock against it.
//!
//! A failed channel stays failed. Reconnecting means opening a new channel.

pub mod websocket;

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use url::Url;

/// Endpoint path of the control channel on the device controller.
pub const CHANNEL_PATH: &str = "/api";

const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unsupported page scheme `{0}`, expected http or https")]
    UnsupportedScheme(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Connection failed: {0}")]
    Failed(String),
    #[error("Channel is {0}")]
    NotOpen(ChannelStatus),
    #[error("Channel I/O task has gone away")]
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Open,
    /// Terminal. Carries the error that ended the channel.
    Failed(String),
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Open => f.write_str("open"),
            ChannelStatus::Failed(reason) => write!(f, "failed ({})", reason),
            ChannelStatus::Closed => f.write_str("closed"),
        }
    }
}

/// What the I/O task reports to the channel owner.
#[derive(Debug)]
pub enum ChannelEvent {
    Message(String),
    Error(ChannelError),
    Closed,
}

#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(String),
    Close,
}

/// Receives channel events. Exactly one method is called per event.
pub trait ChannelHandler {
    fn on_message(&mut self, frame: &str);

    fn on_error(&mut self, error: &ChannelError);

    fn on_closed(&mut self) {}
}

/// Derive the control channel URL from the page origin, matching the page's
/// transport security: `http` becomes `ws`, `https` becomes `wss`.
pub fn channel_url(origin: &str, path: &str) -> Result<Url, ChannelError> {
    let mut url = Url::parse(origin)?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::UnsupportedScheme(url.scheme().to_string()))?;
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

pub struct Channel {
    endpoint: String,
    outgoing: mpsc::Sender<Outbound>,
    incoming: mpsc::Receiver<ChannelEvent>,
    status: ChannelStatus,
    io_task: Option<JoinHandle<()>>,
}

impl Channel {
    /// Connect to the device controller's WebSocket endpoint.
    pub async fn open(url: &Url, queue_capacity: usize) -> Result<Self, ChannelError> {
        tracing::info!("Opening control channel to {}", url);
        let (outgoing, incoming, io_task) = websocket::connect(url, queue_capacity).await?;
        Ok(Self {
            endpoint: url.to_string(),
            outgoing,
            incoming,
            status: ChannelStatus::Open,
            io_task: Some(io_task),
        })
    }

    /// An in-process channel whose far end is driven through the returned
    /// [`ChannelPeer`].
    pub fn memory(queue_capacity: usize) -> (Self, ChannelPeer) {
        let (outgoing, peer_rx) = mpsc::channel(queue_capacity);
        let (peer_tx, incoming) = mpsc::channel(queue_capacity);
        let channel = Self {
            endpoint: "memory".to_string(),
            outgoing,
            incoming,
            status: ChannelStatus::Open,
            io_task: None,
        };
        let peer = ChannelPeer {
            sent: peer_rx,
            events: peer_tx,
            closed: false,
        };
        (channel, peer)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status(&self) -> &ChannelStatus {
        &self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == ChannelStatus::Open
    }

    pub async fn send(&mut self, frame: String) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen(self.status.clone()));
        }
        tracing::debug!("Channel TX: {}", frame);
        if self.outgoing.send(Outbound::Frame(frame)).await.is_err() {
            self.status = ChannelStatus::Failed(ChannelError::Disconnected.to_string());
            return Err(ChannelError::Disconnected);
        }
        Ok(())
    }

    /// Wait for the next event and hand it to `handler`.
    ///
    /// Returns `false` once the channel has failed or closed; no further
    /// events will be delivered after that.
    pub async fn dispatch<H: ChannelHandler + ?Sized>(&mut self, handler: &mut H) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.incoming.recv().await {
            Some(event) => self.deliver(event, handler),
            None => self.deliver(ChannelEvent::Error(ChannelError::Disconnected), handler),
        }
    }

    /// Deliver events that are already queued without waiting for more.
    /// Returns how many were delivered.
    pub fn dispatch_pending<H: ChannelHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let mut delivered = 0;
        while self.is_open() {
            match self.incoming.try_recv() {
                Ok(event) => {
                    delivered += 1;
                    self.deliver(event, handler);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    delivered += 1;
                    self.deliver(ChannelEvent::Error(ChannelError::Disconnected), handler);
                }
            }
        }
        delivered
    }

    fn deliver<H: ChannelHandler + ?Sized>(&mut self, event: ChannelEvent, handler: &mut H) -> bool {
        match event {
            ChannelEvent::Message(frame) => {
                tracing::debug!("Channel RX: {}", frame);
                handler.on_message(&frame);
                true
            }
            ChannelEvent::Error(error) => {
                tracing::error!("Control channel to {} failed: {}", self.endpoint, error);
                self.status = ChannelStatus::Failed(error.to_string());
                self.stop_io();
                handler.on_error(&error);
                false
            }
            ChannelEvent::Closed => {
                tracing::info!("Control channel to {} closed by remote", self.endpoint);
                self.status = ChannelStatus::Closed;
                self.stop_io();
                handler.on_closed();
                false
            }
        }
    }

    /// Close the channel. Idempotent; a failed channel stays failed.
    pub async fn close(&mut self) {
        if self.is_open() {
            tracing::info!("Closing control channel to {}", self.endpoint);
            self.status = ChannelStatus::Closed;
            let close = self.outgoing.send(Outbound::Close);
            if tokio::time::timeout(CLOSE_GRACE, close).await.is_err() {
                tracing::warn!("Outgoing queue to {} stayed full, dropping close", self.endpoint);
            }
        }
        if let Some(mut task) = self.io_task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                tracing::warn!("Control channel I/O task did not finish, aborting");
                task.abort();
            }
        }
    }

    fn stop_io(&mut self) {
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.stop_io();
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status)
            .finish()
    }
}

/// The device end of an in-process [`Channel`].
#[derive(Debug)]
pub struct ChannelPeer {
    sent: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<ChannelEvent>,
    closed: bool,
}

impl ChannelPeer {
    /// Push a text frame to the client.
    pub async fn push(&self, frame: impl Into<String>) -> Result<(), ChannelError> {
        self.deliver(ChannelEvent::Message(frame.into())).await
    }

    /// Make the client's channel fail with `reason`.
    pub async fn fail(&self, reason: impl Into<String>) -> Result<(), ChannelError> {
        self.deliver(ChannelEvent::Error(ChannelError::Failed(reason.into()))).await
    }

    pub async fn hang_up(&self) -> Result<(), ChannelError> {
        self.deliver(ChannelEvent::Closed).await
    }

    async fn deliver(&self, event: ChannelEvent) -> Result<(), ChannelError> {
        self.events
            .send(event)
            .await
            .map_err(|_| ChannelError::Disconnected)
    }

    /// Next frame the client sent, without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        match self.sent.try_recv() {
            Ok(outbound) => self.unwrap_frame(outbound),
            Err(_) => None,
        }
    }

    /// Wait for the next frame the client sends. `None` once the client
    /// closed or dropped its channel.
    pub async fn next_sent(&mut self) -> Option<String> {
        let outbound = self.sent.recv().await?;
        self.unwrap_frame(outbound)
    }

    /// Whether the client closed the channel.
    pub fn client_closed(&self) -> bool {
        self.closed
    }

    fn unwrap_frame(&mut self, outbound: Outbound) -> Option<String> {
        match outbound {
            Outbound::Frame(frame) => Some(frame),
            Outbound::Close => {
                self.closed = true;
                None
            }
        }
    }
}
