//! Write command handlers (over the socket)

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use samo_core::Config;

use super::{connect_open, shutdown};
use crate::output::Output;

/// Parse command-line data as JSON, falling back to a plain string
pub fn parse_data(data: &str) -> Value {
    serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string()))
}

/// Write an entry
pub async fn set(config: &Config, data: String, index: Option<String>, output: &Output) -> Result<()> {
    let value = parse_data(&data);
    let client = connect_open(config).await?;
    debug!("Connected as {}", client.id());

    client
        .set(&value, index.as_deref())
        .await
        .context("Failed to send entry")?;
    shutdown(&client).await?;

    match index {
        Some(index) => output.success(&format!("Set '{}' on {}", index, client.endpoint().path())),
        None => output.success(&format!("Set {}", client.endpoint().path())),
    }
    Ok(())
}

/// Delete an entry
pub async fn del(config: &Config, index: String, output: &Output) -> Result<()> {
    let client = connect_open(config).await?;
    debug!("Connected as {}", client.id());

    client.del(&index).await.context("Failed to send delete")?;
    shutdown(&client).await?;

    output.success(&format!("Deleted '{}' from {}", index, client.endpoint().path()));
    Ok(())
}
