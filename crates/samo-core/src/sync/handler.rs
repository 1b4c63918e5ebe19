//! Consumer callbacks
//!
//! Every callback defaults to a no-op. Callbacks run on the client's event
//! loop, one at a time, so they must not block.

use tokio::sync::mpsc;

use crate::cache::Cache;
use crate::error::SyncError;

/// What `on_message` delivers
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// The cache after a snapshot or a whole patch batch
    Cache(Cache),
    /// A timestamp from the time channel
    Time(i64),
}

impl Update {
    pub fn as_cache(&self) -> Option<&Cache> {
        match self {
            Update::Cache(cache) => Some(cache),
            Update::Time(_) => None,
        }
    }

    pub fn as_time(&self) -> Option<i64> {
        match self {
            Update::Time(time) => Some(*time),
            Update::Cache(_) => None,
        }
    }
}

/// Callbacks for connection and cache events
pub trait Handler: Send + 'static {
    fn on_open(&mut self) {}

    fn on_close(&mut self) {}

    fn on_connecting(&mut self) {}

    fn on_message(&mut self, _update: &Update) {}

    fn on_error(&mut self, _error: &SyncError) {}

    fn on_frozen(&mut self) {}

    fn on_resume(&mut self) {}
}

/// No callbacks
impl Handler for () {}

/// Callbacks as a stream of events
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Open,
    Close,
    Connecting,
    Message(Update),
    Error(String),
    Frozen,
    Resume,
}

impl Handler for mpsc::UnboundedSender<ClientEvent> {
    fn on_open(&mut self) {
        let _ = self.send(ClientEvent::Open);
    }

    fn on_close(&mut self) {
        let _ = self.send(ClientEvent::Close);
    }

    fn on_connecting(&mut self) {
        let _ = self.send(ClientEvent::Connecting);
    }

    fn on_message(&mut self, update: &Update) {
        let _ = self.send(ClientEvent::Message(update.clone()));
    }

    fn on_error(&mut self, error: &SyncError) {
        let _ = self.send(ClientEvent::Error(error.to_string()));
    }

    fn on_frozen(&mut self) {
        let _ = self.send(ClientEvent::Frozen);
    }

    fn on_resume(&mut self) {
        let _ = self.send(ClientEvent::Resume);
    }
}
