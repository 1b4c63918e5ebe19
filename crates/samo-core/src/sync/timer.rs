//! Single-slot timers
//!
//! Each slot owns at most one scheduled task. Arming a slot aborts whatever
//! it held before, and every firing carries a token so a tick that was
//! already queued when the slot was re-armed or cancelled is recognized as
//! stale and dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::event::{LoopEvent, TimerKind};

/// Shortest period a repeating slot runs at; `interval` rejects zero
const MIN_PERIOD: Duration = Duration::from_millis(1);

pub(crate) struct TimerSlot {
    kind: TimerKind,
    token: u64,
    repeating: bool,
    task: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<LoopEvent>,
}

impl TimerSlot {
    pub fn new(kind: TimerKind, events: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self {
            kind,
            token: 0,
            repeating: false,
            task: None,
            events,
        }
    }

    /// Fire once after `delay`, replacing any pending task
    pub fn arm(&mut self, delay: Duration) {
        self.cancel();
        self.repeating = false;
        let (kind, token, events) = (self.kind, self.token, self.events.clone());
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(LoopEvent::Timer { kind, token });
        }));
    }

    /// Fire every `period` until cancelled, replacing any pending task
    pub fn arm_repeating(&mut self, period: Duration) {
        self.cancel();
        self.repeating = true;
        let period = period.max(MIN_PERIOD);
        let (kind, token, events) = (self.kind, self.token, self.events.clone());
        self.task = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticks.tick().await;
                if events.send(LoopEvent::Timer { kind, token }).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn cancel(&mut self) {
        // Any tick already queued under the old token becomes stale
        self.token = self.token.wrapping_add(1);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Accept a firing. One-shot slots disarm themselves on acceptance.
    pub fn accept(&mut self, token: u64) -> bool {
        if self.task.is_none() || token != self.token {
            return false;
        }
        if !self.repeating {
            self.task = None;
            self.token = self.token.wrapping_add(1);
        }
        true
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
