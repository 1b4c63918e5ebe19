//! Realtime sync client
//!
//! Keeps a local cache in step with one key on a samo server over a
//! WebSocket, and reconnects when the socket drops.
//!
//! ## Protocol
//!
//! 1. Connect to `ws[s]://host/<mode>/<key>` (or `/time`)
//! 2. The server sends a snapshot frame (`"snapshot": true`)
//! 3. Every later frame is a JSON Patch batch against the cache
//! 4. Writes are `set` (`{data, index}`) and `del` (`{op: "del", index}`)
//!
//! ## Usage
//!
//! ```ignore
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let client = ClientBuilder::new("localhost:8880/sa/box").handler(tx).connect()?;
//! client.wait_for_state(ReadyState::Open).await?;
//! client.set(&json!({"name": "a box"}), None).await?;
//! ```

mod client;
mod connection;
mod engine;
mod event;
mod handler;
pub mod lifecycle;
mod timer;
mod transport;

pub use client::{Client, ClientBuilder, ClientStatus};
pub use connection::ReadyState;
pub use handler::{ClientEvent, Handler, Update};
pub use lifecycle::{HostSignal, HostSignals, LifecycleSource};
pub use transport::{
    ConnectRequest, Connector, Outbound, TransportEvent, TransportHandle, TransportSink,
    WsConnector,
};
