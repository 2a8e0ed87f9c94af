//! The WebSocket channel against a scripted server.

use std::future::Future;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;

use plotter_remote::channel::{channel_url, ChannelHandler, CHANNEL_PATH};
use plotter_remote::{Channel, ChannelError};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Recorder {
    messages: Vec<String>,
    errors: usize,
    closed: bool,
}

impl ChannelHandler for Recorder {
    fn on_message(&mut self, frame: &str) {
        self.messages.push(frame.to_string());
    }

    fn on_error(&mut self, _error: &ChannelError) {
        self.errors += 1;
    }

    fn on_closed(&mut self) {
        self.closed = true;
    }
}

/// Serve `script` for every connection to the control channel path.
async fn serve<F, Fut>(script: F) -> String
where
    F: Fn(WebSocket) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let app = Router::new().route(
        CHANNEL_PATH,
        get(move |ws: WebSocketUpgrade| {
            let script = script.clone();
            async move { ws.on_upgrade(script) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn open(origin: &str, capacity: usize) -> Channel {
    let url = channel_url(origin, CHANNEL_PATH).unwrap();
    Channel::open(&url, capacity).await.unwrap()
}

#[tokio::test]
async fn test_binary_frames_are_read_as_text() {
    let origin = serve(|mut socket: WebSocket| async move {
        let frames = vec![
            Message::Binary(br#"{"type":"state","state":"idle"}"#.to_vec().into()),
            Message::Binary(vec![0xff, 0xfe, 0x00].into()),
            Message::Text(r#"{"type":"state","state":"paused"}"#.into()),
        ];
        for frame in frames {
            if socket.send(frame).await.is_err() {
                return;
            }
        }
        while let Some(Ok(_)) = socket.recv().await {}
    })
    .await;

    let mut channel = open(&origin, 8).await;
    let mut recorder = Recorder::default();
    for _ in 0..2 {
        let delivered = tokio::time::timeout(WAIT, channel.dispatch(&mut recorder)).await;
        assert_eq!(delivered.ok(), Some(true));
    }
    // The invalid binary frame is skipped, not reported.
    assert_eq!(
        recorder.messages,
        vec![
            r#"{"type":"state","state":"idle"}"#.to_string(),
            r#"{"type":"state","state":"paused"}"#.to_string(),
        ]
    );
    assert_eq!(recorder.errors, 0);
    assert!(channel.is_open());
    channel.close().await;
}

#[tokio::test]
async fn test_server_close_is_delivered_after_pending_frames() {
    let origin = serve(|mut socket: WebSocket| async move {
        let _ = socket.send(Message::Text(r#"{"type":"state","state":"idle"}"#.into())).await;
        let _ = socket.send(Message::Close(None)).await;
    })
    .await;

    let mut channel = open(&origin, 1).await;
    let mut recorder = Recorder::default();
    let drained = tokio::time::timeout(WAIT, async {
        while channel.dispatch(&mut recorder).await {}
    })
    .await;
    assert!(drained.is_ok());
    assert_eq!(recorder.messages.len(), 1);
    assert!(recorder.closed);
    assert_eq!(recorder.errors, 0);
}

#[tokio::test]
async fn test_sending_while_incoming_queue_is_full() {
    const FRAMES: usize = 200;
    let (report, mut received) = mpsc::unbounded_channel::<usize>();

    let origin = serve(move |mut socket: WebSocket| {
        let report = report.clone();
        async move {
            for n in 0..FRAMES {
                let frame = format!(r#"{{"type":"state","state":"idle","action_index":{}}}"#, n);
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    return;
                }
            }
            let mut count = 0;
            while count < FRAMES {
                match socket.recv().await {
                    Some(Ok(Message::Text(_))) => count += 1,
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            let _ = report.send(count);
            while let Some(Ok(_)) = socket.recv().await {}
        }
    })
    .await;

    // Nothing is dispatched while sending, so the incoming queue fills first.
    let mut channel = open(&origin, 2).await;
    let sent = tokio::time::timeout(WAIT, async {
        for _ in 0..FRAMES {
            channel
                .send(r#"{"type":"manual-pen-up"}"#.to_string())
                .await
                .unwrap();
        }
    })
    .await;
    assert!(sent.is_ok(), "send stalled behind undelivered frames");
    assert_eq!(
        tokio::time::timeout(WAIT, received.recv()).await.unwrap(),
        Some(FRAMES)
    );

    let mut recorder = Recorder::default();
    let drained = tokio::time::timeout(WAIT, async {
        while recorder.messages.len() < FRAMES {
            assert!(channel.dispatch(&mut recorder).await);
        }
    })
    .await;
    assert!(drained.is_ok());
    assert!(recorder.messages[0].ends_with(r#""action_index":0}"#));
    assert!(recorder.messages[FRAMES - 1].ends_with(r#""action_index":199}"#));
    channel.close().await;
}
