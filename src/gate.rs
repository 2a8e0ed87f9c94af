// src/gate.rs - Local permission check for outgoing commands
//!
//! Derives which commands make sense in the device's current state so the
//! client never sends something the device would refuse. The device remains
//! the final arbiter: a command can still race with a state change.

use std::fmt;
use thiserror::Error;

use crate::device::{DeviceSnapshot, DeviceState};
use crate::protocol::{CommandTag, OutgoingCommand};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{command}` is not permitted while the device is {state}")]
pub struct CommandRejected {
    pub command: CommandTag,
    pub state: DeviceState,
}

/// Whether `command` may be sent while the device is in `state`.
pub fn is_permitted(state: DeviceState, command: CommandTag) -> bool {
    use DeviceState::*;
    match command {
        CommandTag::ManualPenUp | CommandTag::ManualPenDown => state == Idle,
        CommandTag::ResumePlotting => matches!(state, Idle | Paused),
        CommandTag::PausePlotting => state == Plotting,
        CommandTag::CancelPlotting => matches!(state, Plotting | Paused),
        CommandTag::SetDocument => matches!(state, Idle | Paused),
    }
}

pub fn permitted(snapshot: &DeviceSnapshot) -> CommandSet {
    permitted_in(snapshot.state)
}

pub fn permitted_in(state: DeviceState) -> CommandSet {
    CommandTag::ALL
        .into_iter()
        .filter(|tag| is_permitted(state, *tag))
        .collect()
}

pub fn check(snapshot: &DeviceSnapshot, command: &OutgoingCommand) -> Result<(), CommandRejected> {
    let tag = command.tag();
    if is_permitted(snapshot.state, tag) {
        Ok(())
    } else {
        Err(CommandRejected {
            command: tag,
            state: snapshot.state,
        })
    }
}

/// A set of command tags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandSet(u8);

impl CommandSet {
    pub fn empty() -> Self {
        Self(0)
    }

    fn bit(tag: CommandTag) -> u8 {
        1 << (tag as u8)
    }

    pub fn insert(&mut self, tag: CommandTag) {
        self.0 |= Self::bit(tag);
    }

    pub fn contains(&self, tag: CommandTag) -> bool {
        self.0 & Self::bit(tag) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = CommandTag> + '_ {
        CommandTag::ALL.into_iter().filter(|tag| self.contains(*tag))
    }
}

impl FromIterator<CommandTag> for CommandSet {
    fn from_iter<I: IntoIterator<Item = CommandTag>>(iter: I) -> Self {
        let mut set = CommandSet::empty();
        for tag in iter {
            set.insert(tag);
        }
        set
    }
}

impl fmt::Debug for CommandSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for CommandSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|tag| tag.as_str()).collect();
        f.write_str(&names.join(", "))
    }
}
