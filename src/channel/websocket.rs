// src/channel/websocket.rs - WebSocket transport for the control channel
use std::collections::VecDeque;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{ChannelError, ChannelEvent, Outbound};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connect and spawn the task that moves frames between the socket and the
/// channel's queues.
pub(crate) async fn connect(
    url: &Url,
    queue_capacity: usize,
) -> Result<
    (
        mpsc::Sender<Outbound>,
        mpsc::Receiver<ChannelEvent>,
        JoinHandle<()>,
    ),
    ChannelError,
> {
    let (socket, response) = connect_async(url.as_str()).await?;
    tracing::info!("Control channel connected to {} (HTTP {})", url, response.status());

    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Outbound>(queue_capacity);
    let (incoming_tx, incoming_rx) = mpsc::channel::<ChannelEvent>(queue_capacity);
    let io_task = tokio::spawn(pump(socket, outgoing_rx, incoming_tx));
    Ok((outgoing_tx, incoming_rx, io_task))
}

/// Frames read from the socket wait in `pending` until the session has room
/// for them. Reading stops while anything is pending, but outgoing frames keep
/// flowing, so a full incoming queue never stalls [`super::Channel::send`].
async fn pump(
    socket: Socket,
    mut outgoing: mpsc::Receiver<Outbound>,
    incoming: mpsc::Sender<ChannelEvent>,
) {
    let (mut sink, mut source) = socket.split();
    let mut pending: VecDeque<ChannelEvent> = VecDeque::new();
    // Set once the socket is finished; only queued events remain to deliver.
    let mut ending = false;

    loop {
        tokio::select! {
            outbound = outgoing.recv() => match outbound {
                Some(Outbound::Frame(text)) => {
                    if ending {
                        tracing::debug!("Dropping outgoing frame, socket already ended");
                    } else if let Err(e) = sink.send(Message::Text(text)).await {
                        pending.push_back(ChannelEvent::Error(e.into()));
                        ending = true;
                    }
                }
                // Explicit close, or the channel was dropped.
                Some(Outbound::Close) | None => {
                    if let Err(e) = sink.close().await {
                        tracing::debug!("Error while closing WebSocket: {}", e);
                    }
                    break;
                }
            },
            permit = incoming.reserve(), if !pending.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(event) = pending.pop_front() {
                        permit.send(event);
                    }
                    if ending && pending.is_empty() {
                        break;
                    }
                }
                Err(_) => break,
            },
            inbound = source.next(), if pending.is_empty() && !ending => match inbound {
                Some(Ok(Message::Text(text))) => pending.push_back(ChannelEvent::Message(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => pending.push_back(ChannelEvent::Message(text)),
                    Err(_) => tracing::warn!("Dropping non-UTF-8 binary frame from device"),
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("Device closed the control channel: {:?}", frame);
                    pending.push_back(ChannelEvent::Closed);
                    ending = true;
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    pending.push_back(ChannelEvent::Error(e.into()));
                    ending = true;
                }
                None => {
                    pending.push_back(ChannelEvent::Closed);
                    ending = true;
                }
            }
        }
    }

    tracing::debug!("Control channel I/O task terminated");
}
