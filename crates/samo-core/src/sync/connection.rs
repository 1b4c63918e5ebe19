//! Connection lifecycle
//!
//! `Connecting → Open → Closing → Closed`, plus three flags that say why a
//! close happened: `forced_close` (the consumer asked for it), `frozen`
//! (the host suspended us) and `timed_out` (the open attempt took too long).
//! An unexpected close is retried after a fixed backoff for as long as the
//! client is neither forced closed nor frozen.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::event::{LoopEvent, TimerKind};
use super::handler::Handler;
use super::timer::TimerSlot;
use super::transport::{ConnectRequest, Connector, TransportHandle, TransportSink};
use crate::config::Timings;
use crate::error::SyncError;

/// Socket state as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How a close ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseOutcome {
    /// Forced or frozen: no automatic reconnect
    Terminal,
    /// A reconnect is scheduled
    Retrying,
}

pub(crate) struct ConnectionManager {
    request: ConnectRequest,
    timings: Timings,
    connector: Arc<dyn Connector>,
    events: mpsc::UnboundedSender<LoopEvent>,
    state: ReadyState,
    forced_close: bool,
    frozen: bool,
    timed_out: bool,
    /// Current attempt is a retry; cleared once it opens
    reconnect_attempt: bool,
    attempt: u64,
    transport: Option<TransportHandle>,
    open_timer: TimerSlot,
    reconnect_timer: TimerSlot,
}

impl ConnectionManager {
    pub fn new(
        request: ConnectRequest,
        timings: Timings,
        connector: Arc<dyn Connector>,
        events: mpsc::UnboundedSender<LoopEvent>,
    ) -> Self {
        Self {
            request,
            timings,
            connector,
            open_timer: TimerSlot::new(TimerKind::OpenTimeout, events.clone()),
            reconnect_timer: TimerSlot::new(TimerKind::Reconnect, events.clone()),
            events,
            state: ReadyState::Closed,
            forced_close: false,
            frozen: false,
            timed_out: false,
            reconnect_attempt: false,
            attempt: 0,
            transport: None,
        }
    }

    pub fn state(&self) -> ReadyState {
        self.state
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_forced_close(&self) -> bool {
        self.forced_close
    }

    /// Whether transport events tagged `attempt` still matter
    pub fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt && self.transport.is_some()
    }

    /// Open a new transport, superseding any previous one
    pub fn connect(&mut self, reconnect_attempt: bool, handler: &mut dyn Handler) {
        self.reconnect_timer.cancel();
        self.attempt += 1;
        debug!(
            "Connecting to {} (attempt {}, retry={})",
            self.request.url, self.attempt, reconnect_attempt
        );

        let sink = TransportSink::new(self.attempt, self.events.clone());
        // Replacing the handle drops the old one, which closes that transport
        self.transport = Some(self.connector.open(self.request.clone(), sink));
        self.state = ReadyState::Connecting;
        self.reconnect_attempt = reconnect_attempt;
        self.timed_out = false;

        handler.on_connecting();
        self.open_timer.arm(self.timings.open_timeout);
    }

    pub fn on_open(&mut self, attempt: u64, handler: &mut dyn Handler) {
        if !self.is_current(attempt) {
            return;
        }
        self.open_timer.cancel();
        self.state = ReadyState::Open;
        self.reconnect_attempt = false;
        info!("Connected to {}", self.request.url);
        handler.on_open();
    }

    /// The open-timeout slot fired
    pub fn on_open_timeout(&mut self, token: u64) {
        if !self.open_timer.accept(token) || self.state != ReadyState::Connecting {
            return;
        }
        let Some(transport) = &self.transport else {
            return;
        };
        warn!(
            "{}, closing {}",
            SyncError::Timeout(self.timings.open_timeout),
            self.request.url
        );
        // Held until this attempt's close event has been handled
        self.timed_out = true;
        transport.close();
    }

    /// The transport of `attempt` is gone
    pub fn on_closed(&mut self, attempt: u64, handler: &mut dyn Handler) -> Option<CloseOutcome> {
        if !self.is_current(attempt) {
            return None;
        }
        self.transport = None;
        self.open_timer.cancel();
        let timed_out = std::mem::take(&mut self.timed_out);

        if self.forced_close || self.frozen {
            self.state = ReadyState::Closed;
            info!(
                "Closed {} (forced={}, frozen={})",
                self.request.url, self.forced_close, self.frozen
            );
            handler.on_close();
            return Some(CloseOutcome::Terminal);
        }

        self.state = ReadyState::Connecting;
        // Only the first drop after an open is reported
        if !self.reconnect_attempt && !timed_out {
            handler.on_close();
        }
        handler.on_connecting();
        debug!(
            "Reconnecting to {} in {:?}",
            self.request.url, self.timings.reconnect_interval
        );
        self.reconnect_timer.arm(self.timings.reconnect_interval);
        Some(CloseOutcome::Retrying)
    }

    /// The backoff slot fired; true if a reconnect should start now
    pub fn take_reconnect(&mut self, token: u64) -> bool {
        self.reconnect_timer.accept(token)
            && !self.forced_close
            && !self.frozen
            && self.transport.is_none()
    }

    /// Consumer close. Returns whether there was anything to close, and
    /// `Some(Terminal)` when the close completed immediately.
    pub fn close(&mut self, reload: bool, handler: &mut dyn Handler) -> (bool, Option<CloseOutcome>) {
        if let Some(transport) = &self.transport {
            self.forced_close |= !reload;
            self.state = ReadyState::Closing;
            transport.close();
            return (true, None);
        }

        if self.reconnect_timer.is_armed() {
            // Between attempts there is no socket, only the pending retry
            self.forced_close |= !reload;
            if reload {
                return (true, None);
            }
            return (true, Some(self.terminate(handler)));
        }

        // Nothing live, but a later resume must still respect the request
        self.forced_close |= !reload;
        (false, None)
    }

    /// Host suspend: close without scheduling a reconnect
    pub fn freeze(&mut self, handler: &mut dyn Handler) -> Option<CloseOutcome> {
        if self.frozen {
            return None;
        }
        self.frozen = true;

        if let Some(transport) = &self.transport {
            self.state = ReadyState::Closing;
            transport.close();
            return None;
        }
        if self.reconnect_timer.is_armed() {
            return Some(self.terminate(handler));
        }
        None
    }

    pub fn thaw(&mut self) {
        self.frozen = false;
    }

    /// Close the transport if one is live and not already going away
    pub fn request_close(&mut self) {
        if matches!(self.state, ReadyState::Closed | ReadyState::Closing) {
            return;
        }
        if let Some(transport) = &self.transport {
            self.state = ReadyState::Closing;
            transport.close();
        }
    }

    pub fn send(&self, frame: String) -> Result<(), SyncError> {
        match (&self.transport, self.state) {
            (Some(transport), ReadyState::Open) => transport.send(frame),
            _ => Err(SyncError::NotConnected),
        }
    }

    pub fn ensure_open(&self) -> Result<(), SyncError> {
        match (&self.transport, self.state) {
            (Some(_), ReadyState::Open) => Ok(()),
            _ => Err(SyncError::NotConnected),
        }
    }

    /// Release everything without notifying
    pub fn shutdown(&mut self) {
        self.open_timer.cancel();
        self.reconnect_timer.cancel();
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.state = ReadyState::Closed;
    }

    fn terminate(&mut self, handler: &mut dyn Handler) -> CloseOutcome {
        self.reconnect_timer.cancel();
        self.open_timer.cancel();
        self.transport = None;
        self.state = ReadyState::Closed;
        info!("Closed {} while waiting to reconnect", self.request.url);
        handler.on_close();
        CloseOutcome::Terminal
    }
}
