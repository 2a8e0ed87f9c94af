// src/session.rs - One client session: channel, mirror, gate and sink
//!
//! Outgoing: intent → [`gate::check`] → [`protocol::encode`] → [`Channel::send`].
//! Incoming: [`Channel::dispatch`] → [`protocol::decode`] → [`DeviceMirror::apply`].
//!
//! A session is driven from a single task. Events are only applied while the
//! caller is inside [`Session::next_event`], [`Session::drain_pending`] or a
//! method that calls them, so the mirror needs no locking. Permissions are
//! always checked against the mirror as it is at the moment of sending.

use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::channel::{Channel, ChannelError, ChannelHandler, ChannelStatus};
use crate::config::ClientConfig;
use crate::device::DeviceSnapshot;
use crate::gate::{self, CommandRejected, CommandSet};
use crate::ingest::{self, DocumentSource, IngestError};
use crate::mirror::DeviceMirror;
use crate::notify::{Notification, PresentationSink};
use crate::protocol::{self, CommandTag, OutgoingCommand};
use crate::upload::{self, UploadError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Rejected(#[from] CommandRejected),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub max_document_bytes: u64,
    pub upload_url: Option<Url>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_document_bytes: ClientConfig::default().client.max_document_bytes,
            upload_url: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_document_bytes: config.client.max_document_bytes,
            upload_url: config.upload_url().ok(),
        }
    }
}

pub struct Session<S: PresentationSink> {
    id: Uuid,
    channel: Channel,
    mirror: DeviceMirror,
    sink: S,
    options: SessionOptions,
    dropped_frames: u64,
}

/// Feeds channel events into the mirror. Borrows the session's parts so the
/// channel can be driven while they are mutated.
struct MirrorFeed<'a, S: PresentationSink> {
    session_id: Uuid,
    mirror: &'a mut DeviceMirror,
    sink: &'a mut S,
    dropped_frames: &'a mut u64,
}

impl<S: PresentationSink> ChannelHandler for MirrorFeed<'_, S> {
    fn on_message(&mut self, frame: &str) {
        if let Err(e) = self.mirror.apply_frame(frame, &mut *self.sink) {
            *self.dropped_frames += 1;
            tracing::warn!(session = %self.session_id, "Dropping device frame: {}", e);
        }
    }

    fn on_error(&mut self, error: &ChannelError) {
        self.sink.notify(Notification::channel_failed(error.to_string()));
    }

    fn on_closed(&mut self) {
        tracing::info!(session = %self.session_id, "Device ended the session");
    }
}

impl<S: PresentationSink> Session<S> {
    /// Open the control channel described by `config`. A connection failure
    /// is reported to `sink` before it is returned.
    pub async fn connect(config: &ClientConfig, mut sink: S) -> Result<Self, SessionError> {
        let opened = match config.channel_url() {
            Ok(url) => Channel::open(&url, config.client.queue_capacity).await,
            Err(e) => Err(e),
        };
        match opened {
            Ok(channel) => Ok(Self::new(channel, sink, SessionOptions::from_config(config))),
            Err(e) => {
                sink.notify(Notification::channel_failed(e.to_string()));
                Err(e.into())
            }
        }
    }

    pub fn new(channel: Channel, sink: S, options: SessionOptions) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(session = %id, "Session started on {}", channel.endpoint());
        Self {
            id,
            channel,
            mirror: DeviceMirror::new(),
            sink,
            options,
            dropped_frames: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        self.mirror.current()
    }

    pub fn mirror(&self) -> &DeviceMirror {
        &self.mirror
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn channel_status(&self) -> &ChannelStatus {
        self.channel.status()
    }

    /// Frames received from the device that failed to decode or apply.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn permitted(&self) -> CommandSet {
        gate::permitted(self.mirror.current())
    }

    /// Gate-check, encode and send one command.
    pub async fn send(&mut self, command: OutgoingCommand) -> Result<(), SessionError> {
        if let Err(rejected) = gate::check(self.mirror.current(), &command) {
            tracing::debug!(session = %self.id, "{}", rejected);
            return Err(rejected.into());
        }
        let frame = protocol::encode(&command);
        tracing::info!(session = %self.id, "Sending {}", command.tag());
        self.channel.send(frame).await?;
        Ok(())
    }

    /// Wait for one channel event and apply it. Returns `false` when the
    /// channel has ended.
    pub async fn next_event(&mut self) -> bool {
        let mut feed = MirrorFeed {
            session_id: self.id,
            mirror: &mut self.mirror,
            sink: &mut self.sink,
            dropped_frames: &mut self.dropped_frames,
        };
        self.channel.dispatch(&mut feed).await
    }

    /// Apply every event that has already arrived, without waiting.
    pub fn drain_pending(&mut self) -> usize {
        let mut feed = MirrorFeed {
            session_id: self.id,
            mirror: &mut self.mirror,
            sink: &mut self.sink,
            dropped_frames: &mut self.dropped_frames,
        };
        self.channel.dispatch_pending(&mut feed)
    }

    /// Process events until the first `state` event has been applied.
    pub async fn wait_for_sync(&mut self) -> Result<&DeviceSnapshot, SessionError> {
        while !self.mirror.is_synced() {
            if !self.next_event().await {
                return Err(ChannelError::NotOpen(self.channel.status().clone()).into());
            }
        }
        Ok(self.mirror.current())
    }

    /// Process events until the channel ends. A channel that failed, rather
    /// than closed, is an error.
    pub async fn run(&mut self) -> Result<(), SessionError> {
        while self.next_event().await {}
        let status = self.channel.status();
        tracing::info!(session = %self.id, "Session ended: channel {}", status);
        match status {
            ChannelStatus::Failed(_) => Err(ChannelError::NotOpen(status.clone()).into()),
            _ => Ok(()),
        }
    }

    /// Read `source` completely and send it as `set-document`.
    ///
    /// The read is a suspension point, so events that arrived meanwhile are
    /// applied before the command is checked.
    pub async fn ingest<D: DocumentSource + ?Sized>(&mut self, source: &D) -> Result<(), SessionError> {
        let document = ingest::read_document(source, self.options.max_document_bytes).await?;
        self.drain_pending();
        tracing::info!(session = %self.id, "Ingested '{}' ({} bytes)", source.name(), document.len());
        self.send(OutgoingCommand::SetDocument { document }).await
    }

    /// Send a document through the HTTP upload endpoint instead of the
    /// channel. Subject to the same gate as `set-document`.
    pub async fn upload<D: DocumentSource + ?Sized>(
        &mut self,
        client: &reqwest::Client,
        source: &D,
    ) -> Result<(), SessionError> {
        let url = self
            .options
            .upload_url
            .clone()
            .ok_or(UploadError::NotConfigured)?;
        let document = ingest::read_document(source, self.options.max_document_bytes).await?;
        self.drain_pending();
        let snapshot = self.mirror.current();
        if !gate::is_permitted(snapshot.state, CommandTag::SetDocument) {
            return Err(CommandRejected {
                command: CommandTag::SetDocument,
                state: snapshot.state,
            }
            .into());
        }
        upload::upload_document(client, url, source.name(), document).await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        self.channel.close().await;
    }
}
