//! Boundary between the synchronization core and whatever presents it.
//!
//! The core never renders anything itself. Documents pushed by the device,
//! user-visible notifications and snapshot changes are handed to a
//! [`PresentationSink`].

use chrono::{DateTime, Utc};
use std::fmt;

use crate::device::DeviceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The session cannot continue; the user must act (reload, reconnect).
    Blocking,
    /// Shown to the user, session continues.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// The control channel failed and will not be retried.
    ChannelFailed { reason: String },
    /// Text of an `error` event, verbatim.
    DeviceError { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub raised_at: DateTime<Utc>,
}

impl Notification {
    pub fn channel_failed(reason: impl Into<String>) -> Self {
        Self::now(NotificationKind::ChannelFailed { reason: reason.into() })
    }

    pub fn device_error(text: impl Into<String>) -> Self {
        Self::now(NotificationKind::DeviceError { text: text.into() })
    }

    fn now(kind: NotificationKind) -> Self {
        Self { kind, raised_at: Utc::now() }
    }

    pub fn severity(&self) -> Severity {
        match self.kind {
            NotificationKind::ChannelFailed { .. } => Severity::Blocking,
            NotificationKind::DeviceError { .. } => Severity::Warning,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NotificationKind::ChannelFailed { reason } => {
                write!(f, "Connection to the plotter lost: {}", reason)
            }
            NotificationKind::DeviceError { text } => f.write_str(text),
        }
    }
}

pub trait PresentationSink {
    /// A document pushed by the device with `new-document`.
    fn show_document(&mut self, document: &str);

    fn notify(&mut self, notification: Notification);

    /// Called after the mirror swapped in a new snapshot.
    fn snapshot_changed(&mut self, _previous: &DeviceSnapshot, _current: &DeviceSnapshot) {}
}

/// Sink that only logs; useful for headless embedders.
#[derive(Debug, Default)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn show_document(&mut self, document: &str) {
        tracing::info!("Device pushed a new document ({} bytes)", document.len());
    }

    fn notify(&mut self, notification: Notification) {
        match notification.severity() {
            Severity::Blocking => tracing::error!("{}", notification),
            Severity::Warning => tracing::warn!("{}", notification),
        }
    }

    fn snapshot_changed(&mut self, previous: &DeviceSnapshot, current: &DeviceSnapshot) {
        if previous.state != current.state {
            tracing::info!("Device state {} -> {}", previous.state, current.state);
        }
    }
}

/// Sink that keeps everything it is given, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub documents: Vec<String>,
    pub notifications: Vec<Notification>,
    pub snapshots: Vec<DeviceSnapshot>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_errors(&self) -> Vec<&str> {
        self.notifications
            .iter()
            .filter_map(|n| match &n.kind {
                NotificationKind::DeviceError { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_blocking(&self) -> bool {
        self.notifications
            .iter()
            .any(|n| n.severity() == Severity::Blocking)
    }
}

impl PresentationSink for RecordingSink {
    fn show_document(&mut self, document: &str) {
        self.documents.push(document.to_string());
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    fn snapshot_changed(&mut self, _previous: &DeviceSnapshot, current: &DeviceSnapshot) {
        self.snapshots.push(current.clone());
    }
}
