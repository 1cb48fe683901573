//! Minimal HTTP/1 client for JSON endpoints.
//!
//! Opens one connection per request, which is plenty for a control loop
//! that talks to each peer a handful of times per poll interval. Every
//! request, connect included, is bounded by the client's timeout.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::HttpError;

/// Response status and fully buffered body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Body as lossy UTF-8, for error messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Client bound to a single `host:port` peer.
#[derive(Debug, Clone)]
pub struct HttpClient {
    addr: String,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.send(Method::GET, path, Bytes::new(), false).await
    }

    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<HttpResponse, HttpError> {
        let body = serde_json::to_vec(body).map_err(HttpError::Encode)?;
        self.send(Method::POST, path, Bytes::from(body), true).await
    }

    /// POST with an empty body.
    pub async fn post(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.send(Method::POST, path, Bytes::new(), false).await
    }

    pub async fn delete(&self, path: &str) -> Result<HttpResponse, HttpError> {
        self.send(Method::DELETE, path, Bytes::new(), false).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Bytes,
        json: bool,
    ) -> Result<HttpResponse, HttpError> {
        let uri = format!("http://{}{}", self.addr, path);
        let result = tokio::time::timeout(self.timeout, async {
            let stream = tokio::net::TcpStream::connect(&self.addr)
                .await
                .map_err(|source| HttpError::Connect {
                    addr: self.addr.clone(),
                    source,
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(HttpError::Handshake)?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let mut builder = http::Request::builder()
                .method(method.clone())
                .uri(path)
                .header("host", &self.addr)
                .header("user-agent", "nfscale/0.1");
            if json {
                builder = builder.header("content-type", "application/json");
            }
            let req = builder.body(Full::new(body))?;

            let resp = sender.send_request(req).await.map_err(HttpError::Request)?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(HttpError::Request)?
                .to_bytes();

            debug!(%method, %uri, %status, bytes = body.len(), "http exchange");
            Ok::<_, HttpError>(HttpResponse { status, body })
        })
        .await;

        match result {
            Ok(resp) => resp,
            Err(_) => {
                debug!(%uri, "http request timed out");
                Err(HttpError::Timeout(self.timeout))
            }
        }
    }
}

/// Test helpers: a one-shot HTTP/1.1 server on an ephemeral port.
#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// A request line plus body captured by [`serve`].
    #[derive(Debug, Clone)]
    pub struct Captured {
        pub request_line: String,
        pub body: String,
    }

    /// Serve the given `(status, body)` responses in order, one per
    /// connection, and report each captured request on the channel.
    pub async fn serve(
        responses: Vec<(u16, String)>,
    ) -> (String, mpsc::UnboundedReceiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let captured = read_request(&mut stream).await;
                let _ = tx.send(captured);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (addr, rx)
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> Captured {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = find_header_end(&buf) {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = content_length(&head);
                while buf.len() < end + 4 + length {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request_line = head.lines().next().unwrap_or_default().to_string();
                let body = String::from_utf8_lossy(&buf[end + 4..]).to_string();
                return Captured { request_line, body };
            }
        }
        Captured {
            request_line: String::new(),
            body: String::new(),
        }
    }

    fn find_header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|l| l.split_once(':'))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_status_and_body() {
        let (addr, mut rx) = testing::serve(vec![(200, "[1,2,3]".to_string())]).await;
        let client = HttpClient::new(addr, Duration::from_secs(2));

        let resp = client.get("/entries/3").await.unwrap();
        assert!(resp.is_success());
        let values: Vec<u32> = resp.json().unwrap();
        assert_eq!(values, vec![1, 2, 3]);

        let captured = rx.recv().await.unwrap();
        assert!(captured.request_line.starts_with("GET /entries/3 "));
    }

    #[tokio::test]
    async fn post_json_sends_body() {
        let (addr, mut rx) = testing::serve(vec![(201, "{}".to_string())]).await;
        let client = HttpClient::new(addr, Duration::from_secs(2));

        let resp = client
            .post_json("/containers/create", &serde_json::json!({"Image": "amf"}))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::CREATED);

        let captured = rx.recv().await.unwrap();
        assert!(captured.request_line.starts_with("POST /containers/create "));
        assert!(captured.body.contains("\"Image\":\"amf\""));
    }

    #[tokio::test]
    async fn non_2xx_is_not_an_error() {
        let (addr, _rx) = testing::serve(vec![(500, "boom".to_string())]).await;
        let client = HttpClient::new(addr, Duration::from_secs(2));

        let resp = client.delete("/containers/x").await.unwrap();
        assert!(!resp.is_success());
        assert_eq!(resp.text(), "boom");
    }

    #[tokio::test]
    async fn connection_refused_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = HttpClient::new(addr, Duration::from_secs(2));
        let err = client.get("/").await.unwrap_err();
        assert!(matches!(err, HttpError::Connect { .. }));
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let client = HttpClient::new(addr, Duration::from_millis(100));
        let err = client.get("/").await.unwrap_err();
        assert!(matches!(err, HttpError::Timeout(_)));
    }
}
