use plotter_remote::gate::{check, is_permitted, permitted, permitted_in};
use plotter_remote::{CommandTag, DeviceSnapshot, DeviceState, OutgoingCommand};

fn snapshot(state: DeviceState) -> DeviceSnapshot {
    DeviceSnapshot {
        state,
        ..Default::default()
    }
}

#[test]
fn test_permission_table() {
    use CommandTag::*;
    use DeviceState::*;
    let table: [(DeviceState, &[CommandTag]); 4] = [
        (Idle, &[ManualPenUp, ManualPenDown, ResumePlotting, SetDocument]),
        (Plotting, &[PausePlotting, CancelPlotting]),
        (Paused, &[ResumePlotting, CancelPlotting, SetDocument]),
        (Error, &[]),
    ];
    for (state, expected) in table {
        let set = permitted_in(state);
        let actual: Vec<CommandTag> = set.iter().collect();
        assert_eq!(actual, expected, "permissions in {}", state);
        assert_eq!(set.len(), expected.len());
    }
}

#[test]
fn test_idle_excludes_pause_and_cancel() {
    let set = permitted(&snapshot(DeviceState::Idle));
    assert!(!set.contains(CommandTag::PausePlotting));
    assert!(!set.contains(CommandTag::CancelPlotting));
}

#[test]
fn test_plotting_excludes_manual_resume_and_document() {
    let set = permitted(&snapshot(DeviceState::Plotting));
    for tag in [
        CommandTag::ManualPenUp,
        CommandTag::ManualPenDown,
        CommandTag::ResumePlotting,
        CommandTag::SetDocument,
    ] {
        assert!(!set.contains(tag), "{} permitted while plotting", tag);
    }
}

#[test]
fn test_permitted_depends_only_on_snapshot() {
    for state in DeviceState::ALL {
        let a = DeviceSnapshot {
            state,
            action_index: 4,
            action_count: 9,
            consumed_time: 1.0,
            estimated_time: 3.0,
            ..Default::default()
        };
        let b = a.clone();
        assert_eq!(permitted(&a), permitted(&b));
        assert_eq!(permitted(&a), permitted(&a));
        // Telemetry has no say in permissions.
        assert_eq!(permitted(&a), permitted(&snapshot(state)));
    }
}

#[test]
fn test_check_reports_command_and_state() {
    let rejected = check(&snapshot(DeviceState::Plotting), &OutgoingCommand::ManualPenUp).unwrap_err();
    assert_eq!(rejected.command, CommandTag::ManualPenUp);
    assert_eq!(rejected.state, DeviceState::Plotting);
    assert_eq!(
        rejected.to_string(),
        "`manual-pen-up` is not permitted while the device is plotting"
    );
    assert!(check(
        &snapshot(DeviceState::Paused),
        &OutgoingCommand::SetDocument { document: String::new() }
    )
    .is_ok());
}

#[test]
fn test_check_agrees_with_permitted_set() {
    for state in DeviceState::ALL {
        let set = permitted_in(state);
        for tag in CommandTag::ALL {
            let command = tag
                .to_command()
                .unwrap_or(OutgoingCommand::SetDocument { document: "x".to_string() });
            assert_eq!(check(&snapshot(state), &command).is_ok(), set.contains(tag));
            assert_eq!(is_permitted(state, tag), set.contains(tag));
        }
    }
}

#[test]
fn test_display_lists_tags() {
    assert_eq!(
        permitted_in(DeviceState::Plotting).to_string(),
        "pause-plotting, cancel-plotting"
    );
    assert_eq!(permitted_in(DeviceState::Error).to_string(), "");
}
