// src/sim/device.rs - Job state machine of the simulated controller
use thiserror::Error;

use crate::device::DeviceState;
use crate::protocol::{IncomingEvent, OutgoingCommand, StateUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
    #[error("No document loaded")]
    NoDocument,
}

/// The device side of the protocol, minus any motion.
///
/// Each non-empty line of a document counts as one action; a tick completes
/// one action and moves the pen one grid step.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    state: DeviceState,
    document: Option<String>,
    pen_up: bool,
    x: f64,
    y: f64,
    action_index: u64,
    num_actions: u64,
    consumed_time: f64,
    seconds_per_action: f64,
}

impl DeviceModel {
    pub fn new(seconds_per_action: f64) -> Self {
        Self {
            state: DeviceState::Idle,
            document: None,
            pen_up: true,
            x: 0.0,
            y: 0.0,
            action_index: 0,
            num_actions: 0,
            consumed_time: 0.0,
            seconds_per_action,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Force a state, e.g. to exercise clients against a faulted device.
    pub fn set_state(&mut self, state: DeviceState) {
        self.state = state;
    }

    pub fn state_event(&self) -> IncomingEvent {
        IncomingEvent::State(StateUpdate {
            state: self.state,
            x: Some(self.x),
            y: Some(self.y),
            pen_up: Some(self.pen_up),
            action_index: Some(self.action_index),
            num_actions: Some(self.num_actions),
            consumed_time: Some(self.consumed_time),
            estimated_time: Some(self.num_actions as f64 * self.seconds_per_action),
        })
    }

    /// Apply a client command. Returns the events to broadcast.
    pub fn handle(&mut self, command: OutgoingCommand) -> Result<Vec<IncomingEvent>, SimError> {
        use DeviceState::*;
        let tag = command.tag();
        let invalid = |state: DeviceState| {
            SimError::InvalidTransition(format!("cannot {} while {}", tag, state))
        };

        match (command, self.state) {
            (OutgoingCommand::ManualPenUp, Idle) => self.pen_up = true,
            (OutgoingCommand::ManualPenDown, Idle) => self.pen_up = false,
            (OutgoingCommand::ResumePlotting, Idle) => {
                if self.document.is_none() || self.num_actions == 0 {
                    return Err(SimError::NoDocument);
                }
                self.restart_job();
                self.state = Plotting;
            }
            (OutgoingCommand::ResumePlotting, Paused) => self.state = Plotting,
            (OutgoingCommand::PausePlotting, Plotting) => self.state = Paused,
            (OutgoingCommand::CancelPlotting, Plotting | Paused) => {
                self.state = Idle;
                self.pen_up = true;
                self.restart_job();
            }
            (OutgoingCommand::SetDocument { document }, Idle | Paused) => {
                self.load(document);
                return Ok(vec![
                    IncomingEvent::NewDocument {
                        document: self.document.clone().unwrap_or_default(),
                    },
                    self.state_event(),
                ]);
            }
            (_, state) => return Err(invalid(state)),
        }
        Ok(vec![self.state_event()])
    }

    /// Replace the loaded document. Any job in progress is abandoned.
    pub fn load(&mut self, document: String) {
        self.num_actions = document.lines().filter(|l| !l.trim().is_empty()).count() as u64;
        self.document = Some(document);
        self.state = DeviceState::Idle;
        self.pen_up = true;
        self.restart_job();
    }

    /// Advance a running job by one action.
    pub fn tick(&mut self) -> Option<IncomingEvent> {
        if self.state != DeviceState::Plotting {
            return None;
        }
        self.action_index += 1;
        self.consumed_time += self.seconds_per_action;
        self.pen_up = !self.pen_up;
        self.x = (self.action_index % 10) as f64 * 10.0;
        self.y = (self.action_index / 10) as f64 * 10.0;
        if self.action_index >= self.num_actions {
            self.state = DeviceState::Idle;
            self.pen_up = true;
        }
        Some(self.state_event())
    }

    fn restart_job(&mut self) {
        self.action_index = 0;
        self.consumed_time = 0.0;
    }
}
