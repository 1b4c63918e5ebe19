//! Sync client
//!
//! `ClientBuilder::connect` spawns one task per client. That task owns the
//! connection, the timers and the cache, and serializes everything that can
//! happen to them: transport events, timer firings, consumer commands and
//! host lifecycle signals. The returned `Client` is a cheap handle onto it;
//! when the last handle is dropped the task closes the socket and exits.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, info_span, warn, Instrument};

use super::connection::{CloseOutcome, ConnectionManager, ReadyState};
use super::engine::SyncEngine;
use super::event::{LoopEvent, TimerKind};
use super::handler::Handler;
use super::lifecycle::{HostSignal, LifecycleMonitor, LifecycleSource};
use super::transport::{ConnectRequest, Connector, TransportEvent, WsConnector};
use crate::cache::Cache;
use crate::config::{Config, Timings};
use crate::endpoint::Endpoint;
use crate::error::{ProtocolError, SyncError, SyncResult};
use crate::http::RestClient;

/// Connection status as published to handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: ReadyState,
    /// Suspended by the host
    pub frozen: bool,
    /// Closed by the consumer
    pub forced_close: bool,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            state: ReadyState::Closed,
            frozen: false,
            forced_close: false,
        }
    }
}

/// Requests from handles to the event loop
#[derive(Debug)]
enum Command {
    Set {
        data: Value,
        index: Option<String>,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Del {
        index: String,
        reply: oneshot::Sender<SyncResult<()>>,
    },
    Close {
        reload: bool,
        reply: oneshot::Sender<bool>,
    },
}

/// Configures and starts a client
pub struct ClientBuilder<H = ()> {
    address: String,
    tls: bool,
    protocols: Vec<String>,
    timings: Timings,
    handler: H,
    lifecycle: Option<LifecycleSource>,
    connector: Arc<dyn Connector>,
}

impl ClientBuilder<()> {
    /// Start from an address such as `localhost:8880/sa/box`
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: false,
            protocols: Vec::new(),
            timings: Timings::default(),
            handler: (),
            lifecycle: None,
            connector: Arc::new(WsConnector),
        }
    }

    /// Start from the configured address, TLS flag, protocols and timings
    pub fn from_config(config: &Config) -> Result<Self, SyncError> {
        let address = config
            .address
            .clone()
            .ok_or_else(|| SyncError::InvalidAddress {
                address: String::new(),
                reason: "no address configured".to_string(),
            })?;
        Ok(Self::new(address)
            .tls(config.tls)
            .protocols(config.protocols.clone())
            .timings(config.timings()))
    }
}

impl<H: Handler> ClientBuilder<H> {
    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn protocols(mut self, protocols: Vec<String>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Replace the callbacks
    pub fn handler<H2: Handler>(self, handler: H2) -> ClientBuilder<H2> {
        ClientBuilder {
            address: self.address,
            tls: self.tls,
            protocols: self.protocols,
            timings: self.timings,
            handler,
            lifecycle: self.lifecycle,
            connector: self.connector,
        }
    }

    /// Receive suspend/resume notifications from the host
    pub fn lifecycle(mut self, source: LifecycleSource) -> Self {
        self.lifecycle = Some(source);
        self
    }

    /// Use a custom transport instead of WebSocket
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Spawn the event loop and start the first connection attempt.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(self) -> Result<Client, SyncError> {
        let endpoint = Endpoint::parse(&self.address, self.tls)?;
        let id = format!("samo-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let request = ConnectRequest {
            url: endpoint.ws_url(),
            protocols: self.protocols,
        };
        info!("Starting client {} for {}", id, request.url);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ClientStatus::default());
        let (cache_tx, cache_rx) = watch::channel(None);

        let driver = Driver {
            conn: ConnectionManager::new(request, self.timings, self.connector, event_tx.clone()),
            lifecycle: LifecycleMonitor::new(self.timings.resume_poll_interval, event_tx),
            engine: SyncEngine::new(endpoint.channel()),
            handler: self.handler,
            status_tx,
            cache_tx,
        };
        tokio::spawn(
            driver
                .run(event_rx, command_rx, self.lifecycle)
                .instrument(info_span!("client", id = %id)),
        );

        Ok(Client {
            id: Arc::from(id),
            endpoint,
            commands: command_tx,
            status_rx,
            cache_rx,
        })
    }
}

/// Handle to a running client
#[derive(Debug, Clone)]
pub struct Client {
    id: Arc<str>,
    endpoint: Endpoint,
    commands: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<ClientStatus>,
    cache_rx: watch::Receiver<Option<Cache>>,
}

impl Client {
    /// Write `data`, optionally under `index`.
    ///
    /// Fails with `NotConnected` unless the socket is open. Nothing is
    /// queued for later.
    pub async fn set<T: Serialize + ?Sized>(&self, data: &T, index: Option<&str>) -> SyncResult<()> {
        let data = serde_json::to_value(data).map_err(ProtocolError::from)?;
        let (reply, rx) = oneshot::channel();
        self.request(
            Command::Set {
                data,
                index: index.map(str::to_string),
                reply,
            },
            rx,
        )
        .await?
    }

    /// Delete the entry under `index`
    pub async fn del(&self, index: &str) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            Command::Del {
                index: index.to_string(),
                reply,
            },
            rx,
        )
        .await?
    }

    /// Close the socket. With `reload` the client reconnects afterwards.
    ///
    /// Returns whether there was a connection to close.
    pub async fn close(&self, reload: bool) -> SyncResult<bool> {
        let (reply, rx) = oneshot::channel();
        match self.request(Command::Close { reload, reply }, rx).await {
            Ok(closed) => Ok(closed),
            Err(SyncError::Closed) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> SyncResult<T> {
        self.commands.send(command).map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    pub fn status(&self) -> ClientStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ClientStatus> {
        self.status_rx.clone()
    }

    /// Latest cache; `None` before the first snapshot and after a final close
    pub fn cache(&self) -> Option<Cache> {
        self.cache_rx.borrow().clone()
    }

    /// Subscribe to cache changes
    pub fn subscribe_cache(&self) -> watch::Receiver<Option<Cache>> {
        self.cache_rx.clone()
    }

    /// Wait until the socket reaches `state`
    pub async fn wait_for_state(&self, state: ReadyState) -> SyncResult<()> {
        let mut rx = self.status_rx.clone();
        rx.wait_for(|status| status.state == state)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::Closed)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// HTTP client for the same server
    pub fn http(&self) -> SyncResult<RestClient> {
        RestClient::new(self.endpoint.clone())
    }

    /// Client id used in logs (`samo-xxxxxxxx`)
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The event loop's state
struct Driver<H> {
    conn: ConnectionManager,
    lifecycle: LifecycleMonitor,
    engine: SyncEngine,
    handler: H,
    status_tx: watch::Sender<ClientStatus>,
    cache_tx: watch::Sender<Option<Cache>>,
}

impl<H: Handler> Driver<H> {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<LoopEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut host: Option<LifecycleSource>,
    ) {
        self.connect(false);
        self.publish_status();

        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                signal = next_signal(&mut host) => match signal {
                    Some(signal) => self.handle_signal(signal),
                    None => host = None,
                },
            }
            self.publish_status();
        }

        debug!("All handles dropped, shutting down");
        self.conn.shutdown();
        self.lifecycle.shutdown();
        self.publish_status();
    }

    fn connect(&mut self, reconnect_attempt: bool) {
        self.conn.connect(reconnect_attempt, &mut self.handler);
        self.lifecycle.register();
    }

    fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Transport { attempt, event } => self.handle_transport(attempt, event),
            LoopEvent::Timer { kind, token } => match kind {
                TimerKind::OpenTimeout => self.conn.on_open_timeout(token),
                TimerKind::Reconnect => {
                    if self.conn.take_reconnect(token) {
                        self.connect(true);
                    }
                }
                TimerKind::ResumePoll => {
                    if self.lifecycle.poll_ready(token, &self.conn) {
                        info!("Previous socket closed, reconnecting after resume");
                        self.conn.thaw();
                        self.connect(false);
                    }
                }
            },
        }
    }

    fn handle_transport(&mut self, attempt: u64, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.conn.on_open(attempt, &mut self.handler),
            TransportEvent::Frame(frame) => {
                if self.conn.is_current(attempt) {
                    self.handle_frame(&frame);
                }
            }
            TransportEvent::Error(message) => {
                if self.conn.is_current(attempt) {
                    warn!("Transport error: {}", message);
                    self.handler.on_error(&SyncError::Transport(message));
                }
            }
            TransportEvent::Closed => {
                if let Some(outcome) = self.conn.on_closed(attempt, &mut self.handler) {
                    self.after_close(outcome);
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        match self.engine.handle_frame(frame) {
            Ok(update) => {
                if update.as_cache().is_some() {
                    self.publish_cache();
                }
                self.handler.on_message(&update);
            }
            Err(e) => {
                // The cache is untouched; the connection stays up
                warn!("Dropping frame: {}", e);
                self.handler.on_error(&SyncError::Protocol(e));
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Set { data, index, reply } => {
                let result = self.conn.ensure_open().and_then(|_| {
                    let frame = self.engine.set_frame(&data, index.as_deref())?;
                    self.conn.send(frame)
                });
                let _ = reply.send(result);
            }
            Command::Del { index, reply } => {
                let result = self.conn.ensure_open().and_then(|_| {
                    let frame = self.engine.del_frame(&index)?;
                    self.conn.send(frame)
                });
                let _ = reply.send(result);
            }
            Command::Close { reload, reply } => {
                info!("Close requested (reload={})", reload);
                let (closed, outcome) = self.conn.close(reload, &mut self.handler);
                if !reload {
                    self.lifecycle.cancel_poll();
                }
                if let Some(outcome) = outcome {
                    self.after_close(outcome);
                }
                let _ = reply.send(closed);
            }
        }
    }

    fn handle_signal(&mut self, signal: HostSignal) {
        debug!("Host signal {:?}", signal);
        if signal.is_suspend() {
            if let Some(outcome) = self.lifecycle.on_suspend(&mut self.conn, &mut self.handler) {
                self.after_close(outcome);
            }
        } else {
            self.lifecycle.on_resume(&mut self.conn, &mut self.handler);
        }
    }

    fn after_close(&mut self, outcome: CloseOutcome) {
        if outcome != CloseOutcome::Terminal {
            return;
        }
        self.engine.discard();
        self.publish_cache();
        if self.conn.is_forced_close() {
            self.lifecycle.unregister_suspend();
        }
    }

    fn publish_cache(&self) {
        self.cache_tx.send_replace(self.engine.cache().cloned());
    }

    fn publish_status(&self) {
        let next = ClientStatus {
            state: self.conn.state(),
            frozen: self.conn.is_frozen(),
            forced_close: self.conn.is_forced_close(),
        };
        self.status_tx.send_if_modified(|status| {
            if *status == next {
                return false;
            }
            *status = next;
            true
        });
    }
}

async fn next_signal(host: &mut Option<LifecycleSource>) -> Option<HostSignal> {
    match host {
        Some(source) => source.recv().await,
        None => std::future::pending().await,
    }
}
