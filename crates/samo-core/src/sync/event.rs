//! Events queued on a client's event loop

use super::transport::TransportEvent;

/// Which timer slot a firing belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    OpenTimeout,
    Reconnect,
    ResumePoll,
}

/// Something for the event loop to handle
#[derive(Debug)]
pub(crate) enum LoopEvent {
    /// Reported by the transport of connection attempt `attempt`
    Transport { attempt: u64, event: TransportEvent },
    /// A timer slot fired
    Timer { kind: TimerKind, token: u64 },
}
