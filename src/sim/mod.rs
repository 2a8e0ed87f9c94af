//! Simulated plotter controller.
//!
//! Serves the same surface as the real controller, `/api` (WebSocket control
//! channel) and `/upload` (multipart document upload), on top of a
//! [`DeviceModel`]. Used by the `plotter-sim` binary and end-to-end tests.

pub mod device;

pub use device::{DeviceModel, SimError};

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::device::DeviceState;
use crate::protocol::{decode_command, encode_event, IncomingEvent, OutgoingCommand};
use crate::upload::UPLOAD_FIELD;

#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Interval between completed actions. `None` leaves advancing to the
    /// caller via [`SimDevice::advance`].
    pub tick: Option<Duration>,
    /// Simulated duration of one action, reported in the time estimates.
    pub seconds_per_action: f64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            tick: Some(Duration::from_millis(250)),
            seconds_per_action: 0.25,
        }
    }
}

/// Shared device state plus the broadcast feed of encoded events.
pub struct SimDevice {
    model: Mutex<DeviceModel>,
    events: broadcast::Sender<String>,
}

pub type SimState = Arc<SimDevice>;

impl SimDevice {
    pub fn new(options: &SimOptions) -> SimState {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            model: Mutex::new(DeviceModel::new(options.seconds_per_action)),
            events,
        })
    }

    pub async fn state(&self) -> DeviceState {
        self.model.lock().await.state()
    }

    pub async fn document(&self) -> Option<String> {
        self.model.lock().await.document().map(str::to_string)
    }

    /// Apply a command and broadcast the result to every client.
    pub async fn handle_command(&self, command: OutgoingCommand) -> Result<(), SimError> {
        // Events go out under the model lock so clients see them in model order.
        let mut model = self.model.lock().await;
        let events = model.handle(command)?;
        self.broadcast(events);
        Ok(())
    }

    /// Complete one action of the running job, if any.
    pub async fn advance(&self) {
        let mut model = self.model.lock().await;
        if let Some(event) = model.tick() {
            self.broadcast(vec![event]);
        }
    }

    /// Force the device into `state` and tell every client.
    pub async fn force_state(&self, state: DeviceState) {
        let mut model = self.model.lock().await;
        model.set_state(state);
        self.broadcast(vec![model.state_event()]);
    }

    /// Push an `error` event to every client.
    pub fn report_error(&self, text: impl Into<String>) {
        self.broadcast(vec![IncomingEvent::Error { text: text.into() }]);
    }

    /// Join the event feed. Returns what a new client must be told first
    /// (the loaded document, then the current state) and the receiver for
    /// every later transition. Both are taken under one lock, so the feed
    /// never carries a transition older than the greeting.
    pub async fn subscribe(&self) -> (Vec<IncomingEvent>, broadcast::Receiver<String>) {
        let model = self.model.lock().await;
        let updates = self.events.subscribe();
        let mut greeting = Vec::new();
        if let Some(document) = model.document() {
            greeting.push(IncomingEvent::NewDocument {
                document: document.to_string(),
            });
        }
        greeting.push(model.state_event());
        (greeting, updates)
    }

    fn broadcast(&self, events: Vec<IncomingEvent>) {
        for event in events {
            match encode_event(&event) {
                // No subscribers is fine; nobody is connected.
                Ok(frame) => {
                    let _ = self.events.send(frame);
                }
                Err(e) => tracing::error!("Failed to encode event: {}", e),
            }
        }
    }
}

/// Creates the Axum router for the simulated controller.
pub fn create_router(state: SimState) -> Router {
    Router::new()
        .route("/api", get(channel_handler))
        .route("/upload", post(upload_handler))
        .with_state(state)
}

/// Spawn the task that advances running jobs every `period`.
pub fn spawn_ticker(state: SimState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            state.advance().await;
        }
    })
}

/// A simulator bound to a local port, running in the background.
pub struct SimServer {
    pub addr: SocketAddr,
    pub state: SimState,
    server: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
}

impl SimServer {
    pub async fn start(bind: &str, options: SimOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        let state = SimDevice::new(&options);
        let ticker = options.tick.map(|period| spawn_ticker(state.clone(), period));
        let app = create_router(state.clone());
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Simulator server failed: {}", e);
            }
        });
        tracing::info!("Simulated plotter listening on http://{}", addr);
        Ok(Self {
            addr,
            state,
            server,
            ticker,
        })
    }

    /// Page origin a client would be served from.
    pub fn origin(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Run until the server task ends.
    pub async fn wait(mut self) {
        let _ = (&mut self.server).await;
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.server.abort();
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// Helper to create a JSON error response with a message and status code
fn json_error(message: &str, status: StatusCode) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

async fn channel_handler(ws: WebSocketUpgrade, State(state): State<SimState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: SimState) {
    tracing::info!("Client connected");
    let (greeting, mut updates) = state.subscribe().await;
    let (mut sink, mut source) = socket.split();

    for event in greeting {
        if send_event(&mut sink, &event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(reply) = handle_frame(&state, text.as_str()).await {
                        if send_event(&mut sink, &reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("Client socket error: {}", e);
                    break;
                }
            },
            update = updates.recv() => match update {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Client lagged by {} events, resending state", missed);
                    let event = state.model.lock().await.state_event();
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    tracing::info!("Client disconnected");
}

/// Errors go back to the sender only, as an `error` event.
async fn handle_frame(state: &SimState, frame: &str) -> Result<(), IncomingEvent> {
    let command = decode_command(frame).map_err(|e| IncomingEvent::Error {
        text: format!("Malformed command: {}", e),
    })?;
    tracing::debug!("Client command: {}", command.tag());
    state
        .handle_command(command)
        .await
        .map_err(|e| IncomingEvent::Error { text: e.to_string() })
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &IncomingEvent,
) -> Result<(), axum::Error> {
    let frame = encode_event(event).map_err(axum::Error::new)?;
    sink.send(Message::Text(frame.into())).await
}

/// POST /upload -- multipart document upload, same effect as `set-document`
async fn upload_handler(State(state): State<SimState>, mut multipart: Multipart) -> Response {
    let mut document = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(UPLOAD_FIELD) {
                    continue;
                }
                match field.text().await {
                    Ok(text) => {
                        document = Some(text);
                        break;
                    }
                    Err(e) => return json_error(&e.body_text(), e.status()),
                }
            }
            Ok(None) => break,
            Err(e) => return json_error(&e.body_text(), e.status()),
        }
    }

    let Some(document) = document else {
        return json_error("Missing 'file' field", StatusCode::BAD_REQUEST);
    };
    match state
        .handle_command(OutgoingCommand::SetDocument { document })
        .await
    {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "result": "ok" }))).into_response(),
        Err(e) => json_error(&e.to_string(), StatusCode::CONFLICT),
    }
}
