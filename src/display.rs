// src/display.rs - Text rendering of snapshots for terminals and logs
use std::fmt;

use crate::device::DeviceSnapshot;

/// Format seconds as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// One-line summary of a snapshot.
pub struct Summary<'a>(pub &'a DeviceSnapshot);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        write!(f, "{:<8}", s.state)?;
        if let Some(progress) = s.progress() {
            write!(
                f,
                "  action {}/{} ({:.0}%)",
                s.action_index,
                s.action_count,
                progress * 100.0
            )?;
        }
        write!(
            f,
            "  pen {} at ({:.1}, {:.1})",
            if s.pen_raised { "up" } else { "down" },
            s.pen_position.x,
            s.pen_position.y
        )?;
        if s.estimated_time > 0.0 {
            write!(
                f,
                "  {} / {}",
                format_hms(s.consumed_time),
                format_hms(s.estimated_time)
            )?;
        }
        Ok(())
    }
}
