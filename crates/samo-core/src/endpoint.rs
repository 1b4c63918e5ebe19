//! Address handling
//!
//! A client is constructed from an address such as `localhost:8880/sa/box`.
//! The host part gives the HTTP base URL, the whole address gives the socket
//! URL, and the path picks the subscription channel.

use std::fmt;

use crate::error::SyncError;

/// Path of the reserved time channel
pub const TIME_CHANNEL: &str = "time";

/// Subscription shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// One entry (`sa`)
    Singular,
    /// An ordered list of entries (`mo`)
    Collection,
    /// Unrecognized mode segment; decodes as an empty collection
    Unknown(String),
}

impl Mode {
    pub fn parse(segment: &str) -> Self {
        match segment {
            "sa" => Mode::Singular,
            "mo" => Mode::Collection,
            other => Mode::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mode::Singular => "sa",
            Mode::Collection => "mo",
            Mode::Unknown(segment) => segment,
        }
    }

    pub fn is_singular(&self) -> bool {
        matches!(self, Mode::Singular)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical channel a socket is subscribed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    /// Plain integer timestamps, no cache
    Time,
    /// Snapshot/patch frames for a mirrored key
    Data(Mode),
}

impl Channel {
    pub fn from_path(path: &str) -> Self {
        if path == TIME_CHANNEL {
            return Channel::Time;
        }
        let segment = path.split('/').next().unwrap_or_default();
        Channel::Data(Mode::parse(segment))
    }
}

/// Socket and HTTP locations derived from an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    domain: String,
    path: String,
    tls: bool,
}

impl Endpoint {
    /// Parse `host[:port][/path]`, optionally prefixed with a URL scheme.
    ///
    /// A secure scheme (`wss://`, `https://`) turns TLS on regardless of `tls`.
    pub fn parse(address: &str, tls: bool) -> Result<Self, SyncError> {
        let trimmed = address.trim();
        let (rest, tls) = match trimmed.split_once("://") {
            Some(("ws" | "http", rest)) => (rest, tls),
            Some(("wss" | "https", rest)) => (rest, true),
            Some((scheme, _)) => {
                return Err(SyncError::InvalidAddress {
                    address: address.to_string(),
                    reason: format!("unsupported scheme '{}'", scheme),
                })
            }
            None => (trimmed, tls),
        };

        let (domain, path) = match rest.split_once('/') {
            Some((domain, path)) => (domain, path.trim_end_matches('/')),
            None => (rest, ""),
        };

        if domain.is_empty() {
            return Err(SyncError::InvalidAddress {
                address: address.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            domain: domain.to_string(),
            path: path.to_string(),
            tls,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tls(&self) -> bool {
        self.tls
    }

    pub fn channel(&self) -> Channel {
        Channel::from_path(&self.path)
    }

    pub fn ws_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        if self.path.is_empty() {
            format!("{}://{}", scheme, self.domain)
        } else {
            format!("{}://{}/{}", scheme, self.domain, self.path)
        }
    }

    pub fn http_base(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        format!("{}://{}", scheme, self.domain)
    }
}
