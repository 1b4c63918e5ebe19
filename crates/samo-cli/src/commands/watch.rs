//! Watch command handler
//!
//! Streams a live mirror until interrupted. On unix, SIGUSR1 and SIGUSR2
//! are forwarded to the client as host suspend and resume.

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use samo_core::sync::lifecycle;
use samo_core::{ClientBuilder, ClientEvent, Config, HostSignal, HostSignals};

use super::shutdown;
use crate::output::Output;

/// Watch the configured address
pub async fn watch(config: &Config, once: bool, output: &Output) -> Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let (signals, source) = lifecycle::channel();
    let client = ClientBuilder::from_config(config)?
        .handler(tx)
        .lifecycle(source)
        .connect()?;

    output.message(&format!(
        "Watching {} (Ctrl-C to stop)",
        client.endpoint().ws_url()
    ));

    let mut host = HostSignalListener::new()?;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                output.print_event(&event);
                if once && matches!(event, ClientEvent::Message(_)) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            signal = host.next() => {
                if !forward(&signals, signal) {
                    break;
                }
            }
        }
    }

    shutdown(&client).await
}

/// Hand a host signal to the client; false once the client is gone
fn forward(signals: &HostSignals, signal: HostSignal) -> bool {
    info!("Forwarding host signal {:?}", signal);
    if signals.send(signal) {
        return true;
    }
    debug!("Client stopped listening for host signals");
    false
}

#[cfg(unix)]
struct HostSignalListener {
    suspend: tokio::signal::unix::Signal,
    resume: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl HostSignalListener {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            suspend: signal(SignalKind::user_defined1())?,
            resume: signal(SignalKind::user_defined2())?,
        })
    }

    async fn next(&mut self) -> HostSignal {
        tokio::select! {
            _ = self.suspend.recv() => HostSignal::Freeze,
            _ = self.resume.recv() => HostSignal::Resume,
        }
    }
}

#[cfg(not(unix))]
struct HostSignalListener;

#[cfg(not(unix))]
impl HostSignalListener {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> HostSignal {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_stops_when_client_gone() {
        let (signals, source) = lifecycle::channel();
        assert!(forward(&signals, HostSignal::Freeze));

        drop(source);
        assert!(!forward(&signals, HostSignal::Resume));
    }
}
