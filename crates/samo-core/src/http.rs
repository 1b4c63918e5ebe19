//! HTTP fallback
//!
//! One-shot reads and writes against the same server, for callers that do
//! not want to hold a socket open.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::Cache;
use crate::codec;
use crate::endpoint::{Endpoint, Mode};
use crate::error::{ProtocolError, SyncError, SyncResult};

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 10;

/// Server statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<&'a str>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    #[serde(default)]
    index: String,
}

/// REST client for a samo server
#[derive(Debug, Clone)]
pub struct RestClient {
    endpoint: Endpoint,
    http: reqwest::Client,
}

impl RestClient {
    /// Fails if the HTTP stack cannot be initialized (e.g. no TLS backend)
    pub fn new(endpoint: Endpoint) -> SyncResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("samo/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// `GET /`
    pub async fn stats(&self) -> SyncResult<Stats> {
        let url = self.endpoint.http_base();
        let response = self.http.get(&url).send().await?;
        let response = check_status(&url, response)?;
        Ok(response.json().await?)
    }

    /// `GET /r/{mode}/{key}`, decoded the same way as a snapshot
    pub async fn get(&self, mode: &Mode, key: &str) -> SyncResult<Cache> {
        let url = self.resource_url(mode, key);
        let response = self.http.get(&url).send().await?;
        let payload: Value = check_status(&url, response)?.json().await?;
        Ok(decode_resource(payload, mode)?)
    }

    /// `POST /r/{mode}/{key}`; returns the index the server stored it under
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        mode: &Mode,
        key: &str,
        data: &T,
        index: Option<&str>,
    ) -> SyncResult<String> {
        let url = self.resource_url(mode, key);
        let body = PublishRequest {
            index,
            data: codec::encode_value(data)?,
        };
        let response = self.http.post(&url).json(&body).send().await?;
        let published: PublishResponse = check_status(&url, response)?.json().await?;
        debug!("Published {} as '{}'", url, published.index);
        Ok(published.index)
    }

    /// `DELETE /r/{key}`
    pub async fn unpublish(&self, key: &str) -> SyncResult<()> {
        let url = format!("{}/r/{}", self.endpoint.http_base(), key.trim_matches('/'));
        let response = self.http.delete(&url).send().await?;
        check_status(&url, response)?;
        debug!("Unpublished {}", url);
        Ok(())
    }

    fn resource_url(&self, mode: &Mode, key: &str) -> String {
        format!(
            "{}/r/{}/{}",
            self.endpoint.http_base(),
            mode,
            key.trim_matches('/')
        )
    }
}

fn check_status(url: &str, response: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Http(format!("{} returned {}", url, status)));
    }
    Ok(response)
}

/// The resource body is the snapshot payload without the outer envelope
fn decode_resource(payload: Value, mode: &Mode) -> Result<Cache, ProtocolError> {
    if payload.is_null() {
        return Ok(Cache::empty(mode));
    }
    codec::decode_payload(payload, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Entry;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response and hand back the raw request
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (Endpoint, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let mut request = Vec::new();
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });
        let endpoint = Endpoint::parse(&format!("{}/sa/box", addr), false).unwrap();
        (endpoint, server)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    #[test]
    fn test_resource_url() {
        let endpoint = Endpoint::parse("localhost:8880/sa/box", false).unwrap();
        let client = RestClient::new(endpoint).unwrap();
        assert_eq!(
            client.resource_url(&Mode::Collection, "/books/"),
            "http://localhost:8880/r/mo/books"
        );

        let endpoint = Endpoint::parse("wss://example.com/sa/box", false).unwrap();
        let client = RestClient::new(endpoint).unwrap();
        assert_eq!(
            client.resource_url(&Mode::Singular, "box"),
            "https://example.com/r/sa/box"
        );
    }

    #[test]
    fn test_decode_resource() {
        let entry = json!({
            "index": "box",
            "created": 1,
            "updated": 2,
            "data": codec::encode_value(&json!({"name": "a box"})).unwrap(),
        });
        let cache = decode_resource(entry, &Mode::Singular).unwrap();
        let entry = cache.as_entry().unwrap();
        assert_eq!(entry.index, "box");
        assert_eq!(entry.data, json!({"name": "a box"}));

        assert_eq!(
            decode_resource(Value::Null, &Mode::Singular).unwrap(),
            Cache::Entry(Entry::default())
        );
        assert_eq!(
            decode_resource(json!({"not": "a list"}), &Mode::Collection).unwrap(),
            Cache::Collection(Vec::new())
        );
    }

    #[test]
    fn test_publish_body_omits_missing_index() {
        let body = PublishRequest {
            index: None,
            data: "e30=".to_string(),
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"data":"e30="}"#);
    }

    #[tokio::test]
    async fn test_stats() {
        let (endpoint, server) = serve_once("200 OK", r#"{"keys":["sa/box","mo/books"]}"#).await;
        let stats = RestClient::new(endpoint).unwrap().stats().await.unwrap();
        assert_eq!(stats.keys, vec!["sa/box", "mo/books"]);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET / HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_publish_returns_index() {
        let (endpoint, server) = serve_once("200 OK", r#"{"index":"abc"}"#).await;
        let index = RestClient::new(endpoint)
            .unwrap()
            .publish(&Mode::Collection, "books", &json!({"title": "dune"}), None)
            .await
            .unwrap();
        assert_eq!(index, "abc");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /r/mo/books HTTP/1.1"));
        let body = request.split_once("\r\n\r\n").unwrap().1;
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            codec::decode_value(body["data"].as_str().unwrap()).unwrap(),
            json!({"title": "dune"})
        );
    }

    #[tokio::test]
    async fn test_error_status() {
        let (endpoint, server) = serve_once("404 Not Found", "{}").await;
        let result = RestClient::new(endpoint).unwrap().unpublish("sa/box").await;
        assert!(matches!(result, Err(SyncError::Http(_))));

        let request = server.await.unwrap();
        assert!(request.starts_with("DELETE /r/sa/box HTTP/1.1"));
    }
}
