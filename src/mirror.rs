// src/mirror.rs - Client-side mirror of the device state machine
//!
//! The mirror is the only place device state is stored on the client. It is
//! changed exclusively by decoded device events, and every `state` event
//! produces a complete new [`DeviceSnapshot`] that replaces the old one in a
//! single assignment.

use crate::device::{DeviceSnapshot, DeviceState, PenPosition};
use crate::notify::{Notification, PresentationSink};
use crate::protocol::{self, DecodeError, IncomingEvent, StateUpdate};

/// What applying one event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// The snapshot was replaced; carries the one it replaced.
    State { previous: DeviceSnapshot },
    Document,
    DeviceError,
}

#[derive(Debug, Default)]
pub struct DeviceMirror {
    snapshot: DeviceSnapshot,
    document: Option<String>,
    state_events: u64,
}

impl DeviceMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    /// Last document the device pushed, if any.
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// True once at least one `state` event has been applied.
    pub fn is_synced(&self) -> bool {
        self.state_events > 0
    }

    pub fn state_events(&self) -> u64 {
        self.state_events
    }

    /// Decode a raw frame and apply it. A frame that fails to decode leaves
    /// the mirror untouched.
    pub fn apply_frame(
        &mut self,
        frame: &str,
        sink: &mut dyn PresentationSink,
    ) -> Result<Applied, DecodeError> {
        let event = protocol::decode(frame)?;
        self.apply(event, sink)
    }

    pub fn apply(
        &mut self,
        event: IncomingEvent,
        sink: &mut dyn PresentationSink,
    ) -> Result<Applied, DecodeError> {
        match event {
            IncomingEvent::State(update) => {
                let next = self.resolve(&update)?;
                let previous = std::mem::replace(&mut self.snapshot, next);
                self.state_events += 1;
                sink.snapshot_changed(&previous, &self.snapshot);
                Ok(Applied::State { previous })
            }
            IncomingEvent::NewDocument { document } => {
                sink.show_document(&document);
                self.document = Some(document);
                Ok(Applied::Document)
            }
            IncomingEvent::Error { text } => {
                sink.notify(Notification::device_error(text));
                Ok(Applied::DeviceError)
            }
        }
    }

    /// Build the snapshot that `update` would produce, without applying it.
    ///
    /// Reported fields are taken as-is. Unreported fields keep their last
    /// known value, except that unreported times and index start from zero
    /// when the update begins a new job: plotting after idle, plotting as the
    /// first state ever seen, or an action index lower than the last one.
    pub fn resolve(&self, update: &StateUpdate) -> Result<DeviceSnapshot, DecodeError> {
        let last = &self.snapshot;
        let new_job = self.begins_new_job(update);

        let action_index = update
            .action_index
            .unwrap_or(if new_job { 0 } else { last.action_index });
        let action_count = update.num_actions.unwrap_or(last.action_count);
        if action_index > action_count {
            return Err(DecodeError::ProgressOutOfRange {
                index: action_index,
                count: action_count,
            });
        }

        let carried_time = |reported: Option<f64>, last: f64| {
            reported.unwrap_or(if new_job { 0.0 } else { last })
        };

        Ok(DeviceSnapshot {
            state: update.state,
            pen_position: PenPosition {
                x: update.x.unwrap_or(last.pen_position.x),
                y: update.y.unwrap_or(last.pen_position.y),
            },
            pen_raised: update.pen_up.unwrap_or(last.pen_raised),
            action_index,
            action_count,
            consumed_time: carried_time(update.consumed_time, last.consumed_time),
            estimated_time: carried_time(update.estimated_time, last.estimated_time),
        })
    }

    fn begins_new_job(&self, update: &StateUpdate) -> bool {
        let last = &self.snapshot;
        let rewound = update
            .action_index
            .is_some_and(|index| index < last.action_index);
        // Leaving `error` is a recovery, not a new job, once progress is known.
        let started = update.state == DeviceState::Plotting
            && match last.state {
                DeviceState::Idle => true,
                DeviceState::Error => !self.is_synced(),
                _ => false,
            };
        rewound || started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingSink;

    fn state(frame: &str) -> IncomingEvent {
        protocol::decode(frame).unwrap()
    }

    #[test]
    fn test_partial_update_keeps_known_position() {
        let mut mirror = DeviceMirror::new();
        let mut sink = RecordingSink::new();
        mirror
            .apply(state(r#"{"type":"state","state":"idle","x":4,"y":9,"pen_up":false}"#), &mut sink)
            .unwrap();
        mirror
            .apply(state(r#"{"type":"state","state":"idle","x":5}"#), &mut sink)
            .unwrap();
        let current = mirror.current();
        assert_eq!(current.pen_position, PenPosition { x: 5.0, y: 9.0 });
        assert!(!current.pen_raised);
    }

    #[test]
    fn test_new_job_resets_unreported_progress() {
        let mut mirror = DeviceMirror::new();
        let mut sink = RecordingSink::new();
        mirror
            .apply(
                state(r#"{"type":"state","state":"idle","action_index":10,"num_actions":10,"consumed_time":30,"estimated_time":30}"#),
                &mut sink,
            )
            .unwrap();
        mirror
            .apply(state(r#"{"type":"state","state":"plotting","num_actions":4}"#), &mut sink)
            .unwrap();
        let current = mirror.current();
        assert_eq!(current.action_index, 0);
        assert_eq!(current.action_count, 4);
        assert_eq!(current.consumed_time, 0.0);
        assert_eq!(current.estimated_time, 0.0);
    }

    #[test]
    fn test_pause_carries_unreported_progress() {
        let mut mirror = DeviceMirror::new();
        let mut sink = RecordingSink::new();
        mirror
            .apply(
                state(r#"{"type":"state","state":"plotting","action_index":2,"num_actions":8,"consumed_time":3,"estimated_time":12}"#),
                &mut sink,
            )
            .unwrap();
        mirror
            .apply(state(r#"{"type":"state","state":"paused"}"#), &mut sink)
            .unwrap();
        let current = mirror.current();
        assert_eq!(current.state, DeviceState::Paused);
        assert_eq!(current.action_index, 2);
        assert_eq!(current.consumed_time, 3.0);
        assert_eq!(current.estimated_time, 12.0);
    }

    #[test]
    fn test_inconsistent_resolution_leaves_mirror_unchanged() {
        let mut mirror = DeviceMirror::new();
        let mut sink = RecordingSink::new();
        mirror
            .apply(
                state(r#"{"type":"state","state":"plotting","action_index":6,"num_actions":8}"#),
                &mut sink,
            )
            .unwrap();
        let before = mirror.current().clone();
        let result = mirror.apply(state(r#"{"type":"state","state":"plotting","num_actions":3}"#), &mut sink);
        assert!(matches!(result, Err(DecodeError::ProgressOutOfRange { index: 6, count: 3 })));
        assert_eq!(mirror.current(), &before);
        assert_eq!(mirror.state_events(), 1);
    }

    #[test]
    fn test_document_and_error_do_not_touch_snapshot() {
        let mut mirror = DeviceMirror::new();
        let mut sink = RecordingSink::new();
        mirror
            .apply(state(r#"{"type":"state","state":"paused"}"#), &mut sink)
            .unwrap();
        let before = mirror.current().clone();

        let applied = mirror
            .apply_frame(r#"{"type":"new-document","document":"<svg/>"}"#, &mut sink)
            .unwrap();
        assert_eq!(applied, Applied::Document);
        let applied = mirror
            .apply_frame(r#"{"type":"error","text":"out of paper"}"#, &mut sink)
            .unwrap();
        assert_eq!(applied, Applied::DeviceError);

        assert_eq!(mirror.current(), &before);
        assert_eq!(mirror.document(), Some("<svg/>"));
        assert_eq!(sink.documents, vec!["<svg/>".to_string()]);
        assert_eq!(sink.device_errors(), vec!["out of paper"]);
    }
}
