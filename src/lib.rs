// src/lib.rs - Client-side synchronization core for a remotely controlled pen plotter
pub mod channel;
pub mod config;
pub mod device;
pub mod display;
pub mod gate;
pub mod ingest;
pub mod mirror;
pub mod notify;
pub mod protocol;
pub mod session;
pub mod sim;
pub mod upload;

// Re-exports for the common entry points
pub use crate::channel::{Channel, ChannelError, ChannelPeer, ChannelStatus};
pub use crate::config::{load_config, ClientConfig};
pub use crate::device::{DeviceSnapshot, DeviceState, PenPosition};
pub use crate::gate::{permitted, CommandRejected, CommandSet};
pub use crate::mirror::DeviceMirror;
pub use crate::notify::{Notification, PresentationSink};
pub use crate::protocol::{decode, encode, CommandTag, DecodeError, IncomingEvent, OutgoingCommand};
pub use crate::session::{Session, SessionError, SessionOptions};
