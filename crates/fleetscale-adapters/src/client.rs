//! Minimal JSON-over-HTTP/1.1 client.
//!
//! One connection per request, driven by hyper's low-level client. Every
//! exchange (connect, send, read body) runs under a single timeout.

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::AdapterError;

const AGENT: &str = concat!("fleetscale/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in `AdapterError::Status`.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct JsonClient {
    timeout: Duration,
}

impl JsonClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, AdapterError> {
        let body = self.send(Method::GET, url, None).await?;
        decode(url, &body)
    }

    /// Send `body` as JSON and return the raw response body.
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<Bytes, AdapterError> {
        let payload = serde_json::to_vec(body).map_err(AdapterError::Encode)?;
        self.send(method, url, Some(payload)).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, AdapterError> {
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| AdapterError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if uri.scheme_str() != Some("http") {
            return Err(AdapterError::InvalidUrl {
                url: url.to_string(),
                reason: "only http:// urls are supported".into(),
            });
        }

        match tokio::time::timeout(self.timeout, exchange(method.clone(), url, &uri, body)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%method, %url, "request timed out");
                Err(AdapterError::Timeout {
                    method,
                    url: url.to_string(),
                    after: self.timeout,
                })
            }
        }
    }
}

async fn exchange(
    method: Method,
    url: &str,
    uri: &Uri,
    body: Option<Vec<u8>>,
) -> Result<Bytes, AdapterError> {
    let authority = uri.authority().ok_or_else(|| AdapterError::InvalidUrl {
        url: url.to_string(),
        reason: "missing host".into(),
    })?;
    let addr = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

    let stream = tokio::net::TcpStream::connect(&addr)
        .await
        .map_err(|source| AdapterError::Connect {
            addr: addr.clone(),
            source,
        })?;
    let io = TokioIo::new(stream);
    let http_err = |source: hyper::Error| AdapterError::Http {
        method: method.clone(),
        url: url.to_string(),
        source,
    };
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(http_err)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    let path = uri.path_and_query().map_or("/", |p| p.as_str());
    let mut builder = Request::builder()
        .method(method.clone())
        .uri(path)
        .header(HOST, authority.as_str())
        .header(USER_AGENT, AGENT);
    if body.is_some() {
        builder = builder.header(CONTENT_TYPE, "application/json");
    }
    let req = builder
        .body(Full::new(Bytes::from(body.unwrap_or_default())))
        .map_err(|e| AdapterError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let resp = sender.send_request(req).await.map_err(http_err)?;
    let status = resp.status();
    let bytes = resp.into_body().collect().await.map_err(http_err)?.to_bytes();

    if !status.is_success() {
        let mut text = String::from_utf8_lossy(&bytes).into_owned();
        if text.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| text.is_char_boundary(*i))
                .unwrap_or(0);
            text.truncate(cut);
        }
        return Err(AdapterError::Status {
            method,
            url: url.to_string(),
            status,
            body: text,
        });
    }
    debug!(%method, %url, %status, len = bytes.len(), "request complete");
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, AdapterError> {
    serde_json::from_slice(body).map_err(|source| AdapterError::Decode {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Canned, TestServer};
    use serde_json::json;

    #[tokio::test]
    async fn get_decodes_json() {
        let server = TestServer::start(|_req| Canned::json(200, json!({"id": "g-1", "market": "SPOT"}))).await;
        let client = JsonClient::new(Duration::from_secs(2));

        let value: serde_json::Value = client.get(&server.url("/groups/g-1")).await.unwrap();
        assert_eq!(value["market"], "SPOT");

        let seen = server.requests();
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].path, "/groups/g-1");
    }

    #[tokio::test]
    async fn send_json_posts_body() {
        let server = TestServer::start(|_req| Canned::json(204, json!(null))).await;
        let client = JsonClient::new(Duration::from_secs(2));

        client
            .send_json(Method::POST, &server.url("/spawn?x=1"), &json!({"add": 2}))
            .await
            .unwrap();
        let seen = server.requests();
        assert_eq!(seen[0].path, "/spawn?x=1");
        assert_eq!(seen[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(seen[0].body, json!({"add": 2}));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = TestServer::start(|_req| Canned::text(503, "collector warming up")).await;
        let client = JsonClient::new(Duration::from_secs(2));

        let err = client
            .get::<serde_json::Value>(&server.url("/x"))
            .await
            .unwrap_err();
        match err {
            AdapterError::Status { status, body, .. } => {
                assert_eq!(status.as_u16(), 503);
                assert_eq!(body, "collector warming up");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let client = JsonClient::new(Duration::from_secs(1));
        let err = client
            .get::<serde_json::Value>("https://collector.internal/x")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = JsonClient::new(Duration::from_secs(2));
        let err = client
            .get::<serde_json::Value>(&format!("http://{addr}/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Connect { .. }));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept but never answer.
        let _hold = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let client = JsonClient::new(Duration::from_millis(100));
        let err = client
            .get::<serde_json::Value>(&format!("http://{addr}/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Timeout { .. }));
    }
}
