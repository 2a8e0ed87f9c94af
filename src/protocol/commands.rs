// src/protocol/commands.rs - Client-to-device commands
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A user intent addressed to the device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutgoingCommand {
    ManualPenUp,
    ManualPenDown,
    ResumePlotting,
    PausePlotting,
    CancelPlotting,
    SetDocument { document: String },
}

impl OutgoingCommand {
    pub fn tag(&self) -> CommandTag {
        match self {
            OutgoingCommand::ManualPenUp => CommandTag::ManualPenUp,
            OutgoingCommand::ManualPenDown => CommandTag::ManualPenDown,
            OutgoingCommand::ResumePlotting => CommandTag::ResumePlotting,
            OutgoingCommand::PausePlotting => CommandTag::PausePlotting,
            OutgoingCommand::CancelPlotting => CommandTag::CancelPlotting,
            OutgoingCommand::SetDocument { .. } => CommandTag::SetDocument,
        }
    }
}

/// The payload-free name of a command, as it appears in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandTag {
    ManualPenUp,
    ManualPenDown,
    ResumePlotting,
    PausePlotting,
    CancelPlotting,
    SetDocument,
}

impl CommandTag {
    pub const ALL: [CommandTag; 6] = [
        CommandTag::ManualPenUp,
        CommandTag::ManualPenDown,
        CommandTag::ResumePlotting,
        CommandTag::PausePlotting,
        CommandTag::CancelPlotting,
        CommandTag::SetDocument,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandTag::ManualPenUp => "manual-pen-up",
            CommandTag::ManualPenDown => "manual-pen-down",
            CommandTag::ResumePlotting => "resume-plotting",
            CommandTag::PausePlotting => "pause-plotting",
            CommandTag::CancelPlotting => "cancel-plotting",
            CommandTag::SetDocument => "set-document",
        }
    }

    /// The command for this tag, if it carries no payload.
    pub fn to_command(self) -> Option<OutgoingCommand> {
        match self {
            CommandTag::ManualPenUp => Some(OutgoingCommand::ManualPenUp),
            CommandTag::ManualPenDown => Some(OutgoingCommand::ManualPenDown),
            CommandTag::ResumePlotting => Some(OutgoingCommand::ResumePlotting),
            CommandTag::PausePlotting => Some(OutgoingCommand::PausePlotting),
            CommandTag::CancelPlotting => Some(OutgoingCommand::CancelPlotting),
            CommandTag::SetDocument => None,
        }
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command `{0}`")]
pub struct UnknownCommand(pub String);

impl FromStr for CommandTag {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Encode a command as a JSON text frame: the `type` tag plus payload fields.
pub fn encode(command: &OutgoingCommand) -> String {
    let mut frame = Map::new();
    frame.insert("type".to_string(), Value::from(command.tag().as_str()));
    if let OutgoingCommand::SetDocument { document } = command {
        frame.insert("document".to_string(), Value::from(document.as_str()));
    }
    Value::Object(frame).to_string()
}

/// Device-side inverse of [`encode`].
pub fn decode_command(frame: &str) -> Result<OutgoingCommand, serde_json::Error> {
    serde_json::from_str(frame)
}
