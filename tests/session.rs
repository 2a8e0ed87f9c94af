//! Session behaviour over an in-process channel.

use plotter_remote::ingest::InlineDocument;
use plotter_remote::notify::{NotificationKind, RecordingSink};
use plotter_remote::session::SessionOptions;
use plotter_remote::{
    Channel, ChannelError, ChannelPeer, ChannelStatus, CommandTag, DeviceState, OutgoingCommand,
    Session, SessionError,
};
use serde_json::json;

fn session() -> (Session<RecordingSink>, ChannelPeer) {
    let (channel, peer) = Channel::memory(16);
    let session = Session::new(channel, RecordingSink::new(), SessionOptions::default());
    (session, peer)
}

fn state_frame(state: &str) -> String {
    json!({ "type": "state", "state": state }).to_string()
}

#[tokio::test]
async fn test_starts_conservative_until_first_state() {
    let (mut session, peer) = session();
    assert_eq!(session.snapshot().state, DeviceState::Error);
    assert!(session.permitted().is_empty());

    peer.push(state_frame("idle")).await.unwrap();
    let snapshot = session.wait_for_sync().await.unwrap();
    assert_eq!(snapshot.state, DeviceState::Idle);
    assert!(session.permitted().contains(CommandTag::ManualPenDown));
}

#[tokio::test]
async fn test_current_always_matches_last_full_state() {
    let (mut session, peer) = session();
    let frames = [
        json!({"type":"state","state":"idle","x":0,"y":0,"pen_up":true,"action_index":0,"num_actions":0,"consumed_time":0,"estimated_time":0}),
        json!({"type":"state","state":"plotting","x":1.5,"y":2.5,"pen_up":false,"action_index":1,"num_actions":4,"consumed_time":0.5,"estimated_time":2}),
        json!({"type":"state","state":"paused","x":3,"y":4,"pen_up":true,"action_index":2,"num_actions":4,"consumed_time":1,"estimated_time":2}),
        json!({"type":"state","state":"plotting","x":5,"y":6,"pen_up":false,"action_index":4,"num_actions":4,"consumed_time":2,"estimated_time":2}),
    ];
    for frame in frames {
        peer.push(frame.to_string()).await.unwrap();
        assert!(session.next_event().await);
        let current = session.snapshot();
        assert_eq!(current.state.as_str(), frame["state"].as_str().unwrap());
        assert_eq!(current.pen_position.x, frame["x"].as_f64().unwrap());
        assert_eq!(current.pen_position.y, frame["y"].as_f64().unwrap());
        assert_eq!(current.pen_raised, frame["pen_up"].as_bool().unwrap());
        assert_eq!(current.action_index, frame["action_index"].as_u64().unwrap());
        assert_eq!(current.action_count, frame["num_actions"].as_u64().unwrap());
        assert_eq!(current.consumed_time, frame["consumed_time"].as_f64().unwrap());
        assert_eq!(current.estimated_time, frame["estimated_time"].as_f64().unwrap());
    }
    assert_eq!(session.sink().snapshots.len(), 4);
}

#[tokio::test]
async fn test_bogus_frame_is_dropped_and_channel_stays_open() {
    let (mut session, peer) = session();
    peer.push(state_frame("paused")).await.unwrap();
    session.wait_for_sync().await.unwrap();
    let before = session.snapshot().clone();

    peer.push(r#"{"type":"bogus"}"#).await.unwrap();
    assert!(session.next_event().await);
    assert_eq!(session.snapshot(), &before);
    assert_eq!(session.dropped_frames(), 1);
    assert_eq!(session.channel_status(), &ChannelStatus::Open);
    assert!(session.sink().notifications.is_empty());
}

#[tokio::test]
async fn test_resume_from_paused_end_to_end() {
    let (mut session, mut peer) = session();
    peer.push(state_frame("paused")).await.unwrap();
    session.wait_for_sync().await.unwrap();

    session.send(OutgoingCommand::ResumePlotting).await.unwrap();
    assert_eq!(
        peer.next_sent().await.as_deref(),
        Some(r#"{"type":"resume-plotting"}"#)
    );

    peer.push(state_frame("plotting")).await.unwrap();
    assert!(session.next_event().await);
    assert_eq!(session.snapshot().state, DeviceState::Plotting);
}

#[tokio::test]
async fn test_rejected_command_produces_no_traffic() {
    let (mut session, mut peer) = session();
    peer.push(state_frame("plotting")).await.unwrap();
    session.wait_for_sync().await.unwrap();

    let err = session.send(OutgoingCommand::ManualPenUp).await.unwrap_err();
    match err {
        SessionError::Rejected(rejected) => {
            assert_eq!(rejected.command, CommandTag::ManualPenUp);
            assert_eq!(rejected.state, DeviceState::Plotting);
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(peer.try_next_sent(), None);
}

#[tokio::test]
async fn test_device_error_is_surfaced_without_changing_state() {
    let (mut session, peer) = session();
    peer.push(state_frame("plotting")).await.unwrap();
    session.wait_for_sync().await.unwrap();

    peer.push(json!({"type":"error","text":"Pen servo not responding"}).to_string())
        .await
        .unwrap();
    assert!(session.next_event().await);
    assert_eq!(session.snapshot().state, DeviceState::Plotting);
    assert_eq!(session.sink().device_errors(), vec!["Pen servo not responding"]);
}

#[tokio::test]
async fn test_new_document_goes_to_sink() {
    let (mut session, peer) = session();
    peer.push(json!({"type":"new-document","document":"<svg/>"}).to_string())
        .await
        .unwrap();
    assert!(session.next_event().await);
    assert_eq!(session.sink().documents, vec!["<svg/>".to_string()]);
    assert_eq!(session.mirror().document(), Some("<svg/>"));
    assert!(!session.mirror().is_synced());
}

#[tokio::test]
async fn test_channel_failure_is_terminal_and_notified() {
    let (mut session, peer) = session();
    peer.push(state_frame("idle")).await.unwrap();
    session.wait_for_sync().await.unwrap();

    peer.fail("connection reset").await.unwrap();
    assert!(!session.next_event().await);
    assert!(matches!(session.channel_status(), ChannelStatus::Failed(_)));
    assert!(session.sink().has_blocking());
    assert!(matches!(
        &session.sink().notifications[0].kind,
        NotificationKind::ChannelFailed { reason } if reason.contains("connection reset")
    ));
    // Mirror keeps the last known good state.
    assert_eq!(session.snapshot().state, DeviceState::Idle);

    let err = session.send(OutgoingCommand::ManualPenUp).await.unwrap_err();
    assert!(matches!(err, SessionError::Channel(_)));
    // No reconnect: later events are never delivered.
    let _ = peer.push(state_frame("plotting")).await;
    assert!(!session.next_event().await);
    assert_eq!(session.snapshot().state, DeviceState::Idle);
}

#[tokio::test]
async fn test_ingest_sends_whole_document() {
    let (mut session, mut peer) = session();
    peer.push(state_frame("idle")).await.unwrap();
    session.wait_for_sync().await.unwrap();

    let text = "<svg>\n<path d=\"M 0 0 L 100 100\"/>\n</svg>\n";
    session
        .ingest(&InlineDocument::new("diagonal.svg", text))
        .await
        .unwrap();
    let sent = peer.next_sent().await.unwrap();
    let frame: serde_json::Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(frame, json!({ "type": "set-document", "document": text }));
}

#[tokio::test]
async fn test_ingest_checks_state_after_read_completes() {
    let (mut session, mut peer) = session();
    peer.push(state_frame("idle")).await.unwrap();
    session.wait_for_sync().await.unwrap();

    // The device starts plotting while the document is being read.
    peer.push(state_frame("plotting")).await.unwrap();
    let err = session
        .ingest(&InlineDocument::new("late.svg", "<svg/>"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Rejected(_)));
    assert_eq!(session.snapshot().state, DeviceState::Plotting);
    assert_eq!(peer.try_next_sent(), None);
}

#[tokio::test]
async fn test_ingest_respects_size_limit() {
    let (channel, mut peer) = Channel::memory(4);
    let options = SessionOptions {
        max_document_bytes: 8,
        upload_url: None,
    };
    let mut session = Session::new(channel, RecordingSink::new(), options);
    peer.push(state_frame("idle")).await.unwrap();
    session.wait_for_sync().await.unwrap();

    let err = session
        .ingest(&InlineDocument::new("big.svg", "0123456789"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Ingest(_)));
    assert_eq!(peer.try_next_sent(), None);
}

#[tokio::test]
async fn test_close_reaches_peer() {
    let (mut session, mut peer) = session();
    session.close().await;
    assert_eq!(session.channel_status(), &ChannelStatus::Closed);
    assert_eq!(peer.next_sent().await, None);
    assert!(peer.client_closed());
}

#[tokio::test]
async fn test_remote_hang_up_closes_session() {
    let (mut session, peer) = session();
    peer.hang_up().await.unwrap();
    assert!(session.run().await.is_ok());
    assert_eq!(session.channel_status(), &ChannelStatus::Closed);
    assert!(!session.sink().has_blocking());
}

#[tokio::test]
async fn test_run_reports_channel_failure() {
    let (mut session, peer) = session();
    peer.push(state_frame("plotting")).await.unwrap();
    peer.fail("connection reset").await.unwrap();

    let err = session.run().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Channel(ChannelError::NotOpen(ChannelStatus::Failed(_)))
    ));
    assert_eq!(session.snapshot().state, DeviceState::Plotting);
    assert!(session.sink().has_blocking());
}
