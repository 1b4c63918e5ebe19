//! Error taxonomy
//!
//! Typed errors for the sync client. `SyncError` is what callers of the
//! client see; `ProtocolError` covers a single bad frame and never tears
//! down the connection.

use std::time::Duration;

use thiserror::Error;

use crate::patch::PatchError;

/// Errors surfaced by the client
#[derive(Error, Debug)]
pub enum SyncError {
    /// A write was attempted while no transport is open
    #[error("Not connected: the socket is not open, wait for a reconnect and a fresh snapshot")]
    NotConnected,

    /// The underlying transport reported a failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Opening the transport took longer than the timeout window
    #[error("Timed out after {0:?} waiting for the socket to open")]
    Timeout(Duration),

    /// A frame could not be decoded or applied
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// HTTP fallback request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// The address could not be turned into socket/HTTP URLs
    #[error("Invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The client event loop is gone
    #[error("Client is shut down")]
    Closed,
}

impl SyncError {
    /// Whether retrying after a reconnect can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::NotConnected | SyncError::Transport(_) | SyncError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        SyncError::Http(error.to_string())
    }
}

/// A malformed or inapplicable frame
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("patch failed: {0}")]
    Patch(#[from] PatchError),

    #[error("unexpected shape: {0}")]
    Shape(String),

    #[error("invalid time frame: {0}")]
    InvalidTime(String),

    #[error("patch received before the first snapshot")]
    NoSnapshot,

    #[error("cache invariant violated: {0}")]
    Invariant(String),
}

/// Result type for client operations
pub type SyncResult<T> = Result<T, SyncError>;
