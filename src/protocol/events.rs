// src/protocol/events.rs - Device-to-client events
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::device::DeviceState;

const EVENT_TAGS: [&str; 3] = ["state", "new-document", "error"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed JSON frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("Frame has no string `type` field")]
    MissingTag,
    #[error("Unknown event type `{0}`")]
    UnknownTag(String),
    #[error("Invalid `{tag}` payload: {source}")]
    InvalidPayload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{field}` must be a finite, non-negative number of seconds, got {value}")]
    InvalidTime { field: &'static str, value: f64 },
    #[error("Action index {index} exceeds action count {count}")]
    ProgressOutOfRange { index: u64, count: u64 },
}

/// An event pushed by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum IncomingEvent {
    State(StateUpdate),
    NewDocument { document: String },
    Error { text: String },
}

/// Body of a `state` event.
///
/// Only `state` is required. Every telemetry field is optional because older
/// controllers omit some of them; `None` means "not reported", never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StateFrame")]
pub struct StateUpdate {
    pub state: DeviceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pen_up: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_actions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<f64>,
}

/// A `state` body as it arrives. Older controllers name the action count
/// `num_paths`; some send both names.
#[derive(Deserialize)]
struct StateFrame {
    state: DeviceState,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
    #[serde(default)]
    pen_up: Option<bool>,
    #[serde(default)]
    action_index: Option<u64>,
    #[serde(default)]
    num_actions: Option<u64>,
    #[serde(default)]
    num_paths: Option<u64>,
    #[serde(default)]
    consumed_time: Option<f64>,
    #[serde(default)]
    estimated_time: Option<f64>,
}

impl From<StateFrame> for StateUpdate {
    fn from(frame: StateFrame) -> Self {
        Self {
            state: frame.state,
            x: frame.x,
            y: frame.y,
            pen_up: frame.pen_up,
            action_index: frame.action_index,
            num_actions: frame.num_actions.or(frame.num_paths),
            consumed_time: frame.consumed_time,
            estimated_time: frame.estimated_time,
        }
    }
}

impl StateUpdate {
    /// An update carrying only the state, all telemetry unreported.
    pub fn bare(state: DeviceState) -> Self {
        Self {
            state,
            x: None,
            y: None,
            pen_up: None,
            action_index: None,
            num_actions: None,
            consumed_time: None,
            estimated_time: None,
        }
    }

    fn validate(&self) -> Result<(), DecodeError> {
        for (field, value) in [
            ("consumed_time", self.consumed_time),
            ("estimated_time", self.estimated_time),
        ] {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(DecodeError::InvalidTime { field, value });
                }
            }
        }
        if let (Some(index), Some(count)) = (self.action_index, self.num_actions) {
            if index > count {
                return Err(DecodeError::ProgressOutOfRange { index, count });
            }
        }
        Ok(())
    }
}

/// Decode and validate one text frame from the device.
pub fn decode(frame: &str) -> Result<IncomingEvent, DecodeError> {
    let value: Value = serde_json::from_str(frame).map_err(DecodeError::Malformed)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingTag)?
        .to_string();
    if !EVENT_TAGS.contains(&tag.as_str()) {
        return Err(DecodeError::UnknownTag(tag));
    }

    let event: IncomingEvent = serde_json::from_value(value)
        .map_err(|source| DecodeError::InvalidPayload { tag, source })?;
    if let IncomingEvent::State(update) = &event {
        update.validate()?;
    }
    Ok(event)
}

pub fn encode_event(event: &IncomingEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
