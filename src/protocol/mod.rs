//! JSON text-frame protocol spoken over the control channel.
//!
//! Every frame is an object whose `type` field names the variant. Client
//! commands live in [`commands`], device events in [`events`].

pub mod commands;
pub mod events;

pub use commands::{decode_command, encode, CommandTag, OutgoingCommand, UnknownCommand};
pub use events::{decode, encode_event, DecodeError, IncomingEvent, StateUpdate};
