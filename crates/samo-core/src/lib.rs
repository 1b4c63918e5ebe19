//! samo core library
//!
//! A client for samo servers: a live local mirror of one remote key, kept
//! current over a WebSocket by snapshot and JSON Patch frames.
//!
//! # Quick Start
//!
//! ```text
//! let client = ClientBuilder::new("localhost:8880/mo/books")
//!     .handler(tx)
//!     .connect()?;
//!
//! // Write an entry
//! client.set(&json!({"title": "dune"}), Some("1")).await?;
//!
//! // Read the mirror
//! let books = client.cache();
//! ```
//!
//! # Modules
//!
//! - `sync`: The client, its connection state machine and host lifecycle
//! - `cache`: Entries and the local mirror
//! - `codec`: Base64/JSON wire envelope
//! - `patch`: JSON Patch application
//! - `endpoint`: Address parsing
//! - `http`: One-shot REST fallback
//! - `config`: Application configuration

pub mod cache;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod patch;
pub mod sync;

pub use cache::{Cache, Entry};
pub use config::{Config, Timings};
pub use endpoint::{Channel, Endpoint, Mode};
pub use error::{ProtocolError, SyncError, SyncResult};
pub use http::{RestClient, Stats};
pub use patch::{Operation, PatchError, Pointer};
pub use sync::{
    Client, ClientBuilder, ClientEvent, ClientStatus, Handler, HostSignal, HostSignals,
    LifecycleSource, ReadyState, Update,
};
