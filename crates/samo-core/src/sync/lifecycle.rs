//! Host suspend/resume handling
//!
//! The embedding layer forwards its platform's lifecycle notifications
//! (page freeze, app pause, resume) through `HostSignals`. A suspend closes
//! the socket without scheduling a reconnect; a later resume waits for that
//! close to finish and then reconnects once.
//!
//! Registration mirrors listener semantics: the suspend handler is one-shot
//! per connection cycle, the resume handler stays until it has reconnected
//! or the client was forced closed. Both are re-registered on every connect.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::connection::{CloseOutcome, ConnectionManager, ReadyState};
use super::event::{LoopEvent, TimerKind};
use super::handler::Handler;
use super::timer::TimerSlot;

/// A lifecycle notification from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// The host froze us (e.g. a backgrounded page)
    Freeze,
    /// The host paused us (e.g. a backgrounded mobile app)
    Pause,
    /// The host resumed us
    Resume,
}

impl HostSignal {
    pub fn is_suspend(self) -> bool {
        matches!(self, HostSignal::Freeze | HostSignal::Pause)
    }
}

/// Sending half, held by the embedding layer
#[derive(Debug, Clone)]
pub struct HostSignals {
    tx: mpsc::UnboundedSender<HostSignal>,
}

impl HostSignals {
    /// Returns false once the client is gone
    pub fn send(&self, signal: HostSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn freeze(&self) -> bool {
        self.send(HostSignal::Freeze)
    }

    pub fn pause(&self) -> bool {
        self.send(HostSignal::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(HostSignal::Resume)
    }
}

/// Receiving half, handed to the client builder
#[derive(Debug)]
pub struct LifecycleSource {
    rx: mpsc::UnboundedReceiver<HostSignal>,
}

impl LifecycleSource {
    pub(crate) async fn recv(&mut self) -> Option<HostSignal> {
        self.rx.recv().await
    }
}

/// Create a connected signal pair
pub fn channel() -> (HostSignals, LifecycleSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (HostSignals { tx }, LifecycleSource { rx })
}

pub(crate) struct LifecycleMonitor {
    suspend_registered: bool,
    resume_registered: bool,
    poll: TimerSlot,
    poll_interval: Duration,
}

impl LifecycleMonitor {
    pub fn new(poll_interval: Duration, events: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self {
            suspend_registered: false,
            resume_registered: false,
            poll: TimerSlot::new(TimerKind::ResumePoll, events),
            poll_interval,
        }
    }

    /// Called on every connect
    pub fn register(&mut self) {
        self.suspend_registered = true;
        self.resume_registered = true;
    }

    /// A terminal forced close ends suspend handling for good
    pub fn unregister_suspend(&mut self) {
        self.suspend_registered = false;
    }

    pub fn on_suspend(
        &mut self,
        conn: &mut ConnectionManager,
        handler: &mut dyn Handler,
    ) -> Option<CloseOutcome> {
        if !self.suspend_registered {
            debug!("Ignoring suspend, no handler registered");
            return None;
        }
        self.suspend_registered = false;

        handler.on_frozen();
        if conn.is_frozen() {
            return None;
        }
        info!("Host suspended, closing connection");
        conn.freeze(handler)
    }

    pub fn on_resume(&mut self, conn: &mut ConnectionManager, handler: &mut dyn Handler) {
        if !self.resume_registered {
            debug!("Ignoring resume, no handler registered");
            return;
        }

        handler.on_resume();
        if conn.is_frozen() || conn.is_forced_close() {
            conn.request_close();
        }

        if conn.is_frozen() && !conn.is_forced_close() {
            // Wait for the close to land before reconnecting
            debug!("Host resumed, polling every {:?} for close", self.poll_interval);
            self.poll.arm_repeating(self.poll_interval);
        } else if conn.is_forced_close() {
            self.resume_registered = false;
        }
    }

    /// The poll slot fired; true when the client should reconnect now
    pub fn poll_ready(&mut self, token: u64, conn: &ConnectionManager) -> bool {
        if !self.poll.accept(token) {
            return false;
        }
        if conn.is_forced_close() {
            // Closed by the consumer while we were waiting
            self.poll.cancel();
            self.resume_registered = false;
            return false;
        }
        if conn.state() != ReadyState::Closed {
            return false;
        }
        self.poll.cancel();
        self.resume_registered = false;
        true
    }

    /// Stop a pending resume; used when the client is forced closed
    pub fn cancel_poll(&mut self) {
        self.poll.cancel();
    }

    pub fn shutdown(&mut self) {
        self.poll.cancel();
        self.suspend_registered = false;
        self.resume_registered = false;
    }
}
