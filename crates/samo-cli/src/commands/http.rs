//! REST command handlers

use anyhow::{bail, Result};

use samo_core::{Config, Endpoint, Mode, RestClient};

use super::socket::parse_data;
use crate::output::{Output, OutputFormat};

fn rest_client(config: &Config) -> Result<RestClient> {
    let address = config.address.as_deref().unwrap_or_default();
    Ok(RestClient::new(Endpoint::parse(address, config.tls)?)?)
}

/// Split `mode/key` out of an endpoint path
fn resource(endpoint: &Endpoint) -> Result<(Mode, String)> {
    match endpoint.path().split_once('/') {
        Some((mode, key)) if !mode.is_empty() && !key.is_empty() => {
            Ok((Mode::parse(mode), key.to_string()))
        }
        _ => bail!(
            "Address '{}' has no resource; expected host/<mode>/<key>",
            endpoint.path()
        ),
    }
}

/// Show the keys the server holds
pub async fn stats(config: &Config, output: &Output) -> Result<()> {
    let stats = rest_client(config)?.stats().await?;
    output.print_stats(&stats);
    Ok(())
}

/// Read a resource once
pub async fn get(config: &Config, output: &Output) -> Result<()> {
    let client = rest_client(config)?;
    let (mode, key) = resource(client.endpoint())?;
    let cache = client.get(&mode, &key).await?;
    output.print_cache(&cache);
    Ok(())
}

/// Write a resource once
pub async fn publish(
    config: &Config,
    data: String,
    index: Option<String>,
    output: &Output,
) -> Result<()> {
    let client = rest_client(config)?;
    let (mode, key) = resource(client.endpoint())?;
    let index = client
        .publish(&mode, &key, &parse_data(&data), index.as_deref())
        .await?;

    if output.format == OutputFormat::Quiet {
        println!("{}", index);
    }
    output.success(&format!("Published {}/{} as '{}'", mode, key, index));
    Ok(())
}

/// Delete a resource
pub async fn unpublish(config: &Config, output: &Output) -> Result<()> {
    let client = rest_client(config)?;
    let path = client.endpoint().path().to_string();
    if path.is_empty() {
        bail!("Address has no resource to delete");
    }
    client.unpublish(&path).await?;
    output.success(&format!("Deleted {}", path));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource() {
        let endpoint = Endpoint::parse("localhost:8880/mo/books", false).unwrap();
        let (mode, key) = resource(&endpoint).unwrap();
        assert_eq!(mode, Mode::Collection);
        assert_eq!(key, "books");

        let endpoint = Endpoint::parse("localhost:8880/sa/shelf/box", false).unwrap();
        let (mode, key) = resource(&endpoint).unwrap();
        assert_eq!(mode, Mode::Singular);
        assert_eq!(key, "shelf/box");

        let endpoint = Endpoint::parse("localhost:8880/time", false).unwrap();
        assert!(resource(&endpoint).is_err());
    }
}
