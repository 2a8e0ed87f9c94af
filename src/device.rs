// src/device.rs - Device state model shared by the codec, mirror and gate
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the remote plotter's job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Idle,
    Plotting,
    Paused,
    /// Also the state assumed before the device has reported anything.
    #[default]
    Error,
}

impl DeviceState {
    pub const ALL: [DeviceState; 4] = [
        DeviceState::Idle,
        DeviceState::Plotting,
        DeviceState::Paused,
        DeviceState::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Idle => "idle",
            DeviceState::Plotting => "plotting",
            DeviceState::Paused => "paused",
            DeviceState::Error => "error",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Pen position in device coordinate units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PenPosition {
    pub x: f64,
    pub y: f64,
}

/// Complete picture of the device as last reported.
///
/// Snapshots are values: the mirror swaps whole snapshots and never edits one
/// in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    pub pen_position: PenPosition,
    pub pen_raised: bool,
    /// Invariant: `action_index <= action_count`.
    pub action_index: u64,
    pub action_count: u64,
    /// Seconds spent on the current job.
    pub consumed_time: f64,
    /// Seconds the current job is expected to take in total.
    pub estimated_time: f64,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            state: DeviceState::Error,
            pen_position: PenPosition::default(),
            pen_raised: true,
            action_index: 0,
            action_count: 0,
            consumed_time: 0.0,
            estimated_time: 0.0,
        }
    }
}

impl DeviceSnapshot {
    /// Fraction of the job's actions completed, `None` when no job is loaded.
    pub fn progress(&self) -> Option<f64> {
        if self.action_count == 0 {
            return None;
        }
        Some(self.action_index as f64 / self.action_count as f64)
    }

    pub fn remaining_time(&self) -> f64 {
        (self.estimated_time - self.consumed_time).max(0.0)
    }
}
