//! Command handlers

pub mod config;
pub mod http;
pub mod socket;
pub mod watch;

use std::time::Duration;

use anyhow::{bail, Context, Result};

use samo_core::{Client, ClientBuilder, Config, ReadyState};

/// How long to wait for a closing socket to finish
const CLOSE_WAIT: Duration = Duration::from_secs(3);

/// Resolve the address to use: the argument, else the configured one
pub fn target(config: &Config, address: Option<String>, tls: bool) -> Result<Config> {
    let mut config = config.clone();
    if let Some(address) = address {
        config.address = Some(address);
    }
    if config.address.is_none() {
        bail!(
            "No address given. Pass --address or set a default with:\n  \
             samo config set address localhost:8880/sa/box"
        );
    }
    config.tls |= tls;
    Ok(config)
}

/// Connect and wait for the socket to open
async fn connect_open(config: &Config) -> Result<Client> {
    let client = ClientBuilder::from_config(config)?.connect()?;
    let timings = config.timings();
    let wait = timings.open_timeout + timings.reconnect_interval;

    tokio::time::timeout(wait, client.wait_for_state(ReadyState::Open))
        .await
        .with_context(|| {
            format!(
                "Could not connect to {} within {:?}",
                client.endpoint().ws_url(),
                wait
            )
        })??;
    Ok(client)
}

/// Close for good and give the socket a moment to say goodbye
async fn shutdown(client: &Client) -> Result<()> {
    client.close(false).await?;
    let _ = tokio::time::timeout(CLOSE_WAIT, client.wait_for_state(ReadyState::Closed)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_prefers_argument() {
        let config = Config {
            address: Some("localhost:8880/sa/box".to_string()),
            ..Config::default()
        };

        let resolved = target(&config, Some("example.com/mo/books".to_string()), false).unwrap();
        assert_eq!(resolved.address.as_deref(), Some("example.com/mo/books"));
        assert!(!resolved.tls);

        let resolved = target(&config, None, true).unwrap();
        assert_eq!(resolved.address.as_deref(), Some("localhost:8880/sa/box"));
        assert!(resolved.tls);
    }

    #[test]
    fn test_target_requires_address() {
        let err = target(&Config::default(), None, false).unwrap_err();
        assert!(err.to_string().contains("No address given"));
    }
}
