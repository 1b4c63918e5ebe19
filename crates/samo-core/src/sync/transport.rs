//! Transport seam
//!
//! The event loop never talks to a socket directly. A `Connector` opens one
//! transport per connection attempt and reports what happens to it through
//! a `TransportSink`; the loop writes through the returned
//! `TransportHandle`. Dropping the handle closes the transport.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::event::LoopEvent;
use crate::error::SyncError;

/// How long to wait for the peer to acknowledge a close frame
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// What a transport reports
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed
    Open,
    /// A text or binary message
    Frame(Vec<u8>),
    /// Failure; a `Closed` follows when the transport is done
    Error(String),
    /// The transport is gone
    Closed,
}

/// Where and how to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub protocols: Vec<String>,
}

/// Reports events for one connection attempt
#[derive(Debug, Clone)]
pub struct TransportSink {
    attempt: u64,
    events: mpsc::UnboundedSender<LoopEvent>,
}

impl TransportSink {
    pub(crate) fn new(attempt: u64, events: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self { attempt, events }
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Returns false once the client is gone
    pub fn send(&self, event: TransportEvent) -> bool {
        self.events
            .send(LoopEvent::Transport {
                attempt: self.attempt,
                event,
            })
            .is_ok()
    }
}

/// Requests from the client to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Write side of an open transport
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportHandle {
    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { outbound }
    }

    pub fn send(&self, text: String) -> Result<(), SyncError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| SyncError::NotConnected)
    }

    /// Ask the transport to close; it reports `Closed` when done
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Opens transports
pub trait Connector: Send + Sync + 'static {
    fn open(&self, request: ConnectRequest, sink: TransportSink) -> TransportHandle;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, request: ConnectRequest, sink: TransportSink) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(request, sink, rx));
        TransportHandle::new(tx)
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(request: &ConnectRequest) -> Result<WsStream, SyncError> {
    let mut ws_request = request
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| SyncError::Transport(e.to_string()))?;

    if !request.protocols.is_empty() {
        let protocols = HeaderValue::from_str(&request.protocols.join(", "))
            .map_err(|e| SyncError::Transport(format!("invalid sub-protocol: {}", e)))?;
        ws_request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", protocols);
    }

    let (stream, _response) = connect_async(ws_request)
        .await
        .map_err(|e| SyncError::Transport(e.to_string()))?;
    Ok(stream)
}

/// Drive one socket from handshake to close
async fn run_socket(
    request: ConnectRequest,
    sink: TransportSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    debug!("Opening {} (attempt {})", request.url, sink.attempt());

    let connecting = connect(&request);
    tokio::pin!(connecting);

    let stream = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok(stream) => break stream,
                Err(e) => {
                    warn!("Connection to {} failed: {}", request.url, e);
                    sink.send(TransportEvent::Error(e.to_string()));
                    sink.send(TransportEvent::Closed);
                    return;
                }
            },
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(_)) => debug!("Dropping frame queued before open"),
                Some(Outbound::Close) | None => {
                    sink.send(TransportEvent::Closed);
                    return;
                }
            },
        }
    };

    if !sink.send(TransportEvent::Open) {
        return;
    }

    let (mut write, mut read) = stream.split();
    let mut close_deadline: Option<tokio::time::Instant> = None;

    loop {
        let deadline = close_deadline;
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    sink.send(TransportEvent::Frame(data));
                }
                Some(Ok(Message::Text(text))) => {
                    sink.send(TransportEvent::Frame(text.into_bytes()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            },
            cmd = outbound.recv(), if close_deadline.is_none() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        sink.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if write.close().await.is_err() {
                        break;
                    }
                    close_deadline = Some(tokio::time::Instant::now() + CLOSE_GRACE);
                }
            },
            _ = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                debug!("Peer did not acknowledge close, dropping socket");
                break;
            }
        }
    }

    debug!("Socket to {} closed (attempt {})", request.url, sink.attempt());
    sink.send(TransportEvent::Closed);
}
