//! Plain request/response HTTP client for everything except uploads
//!
//! - HTTP/1.1 only over plain TCP
//! - Pooled connections, TCP_NODELAY
//! - Response bodies are either collected or streamed frame by frame

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};
use bytes::Bytes;
use futures::{future, Stream, TryStreamExt};
use http_body_util::{BodyExt, BodyStream, Empty};
use hyper::body::Incoming;
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Clone is cheap, the underlying pool is shared
#[derive(Clone)]
pub struct RestClient {
    client: HyperClient<HttpConnector, Empty<Bytes>>,
    /// Time allowed until the response head arrives
    timeout: Duration,
}

/// Response head plus a not yet consumed body
pub struct RestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Incoming,
}

impl RestClient {
    pub fn new(settings: &TransferConfig) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.set_connect_timeout(Some(settings.connect_timeout()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(http);

        Self {
            client,
            timeout: settings.connect_timeout() + settings.final_wait(),
        }
    }

    /// Send a bodiless request to an absolute `http://` URL
    pub async fn send(&self, method: Method, url: &str, headers: HeaderMap) -> Result<RestResponse> {
        let mut request = Request::builder()
            .method(method.clone())
            .uri(url)
            .body(Empty::<Bytes>::new())
            .map_err(|e| TransferError::Validation(format!("invalid request URL '{}': {}", url, e)))?;
        request.headers_mut().extend(headers);

        let response = match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(TransferError::network(
                    format!("{} {}", method, url),
                    std::io::Error::other(e),
                ))
            }
            Err(_) => {
                return Err(TransferError::Timeout(format!(
                    "{} {} got no response within {:?}",
                    method, url, self.timeout
                )))
            }
        };

        let (parts, body) = response.into_parts();
        debug!(method = %method, url = %url, status = %parts.status, "response received");
        Ok(RestResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl RestResponse {
    /// Collect the whole body
    pub async fn bytes(self) -> Result<Bytes> {
        let collected = self
            .body
            .collect()
            .await
            .map_err(|e| TransferError::network("read response body", std::io::Error::other(e)))?;
        Ok(collected.to_bytes())
    }

    /// Body as a stream of data chunks; trailers are skipped
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Unpin {
        // BodyStream is both a Body and a Stream; pick the stream adapter
        TryStreamExt::map_err(BodyStream::new(self.body), std::io::Error::other)
            .try_filter_map(|frame| future::ready(Ok(frame.into_data().ok())))
    }

    /// Turn a non-200 response into a protocol error carrying its body
    pub async fn error_for_status(self) -> Result<Self> {
        if self.status == StatusCode::OK {
            return Ok(self);
        }
        let status = self.status;
        let message = match self.bytes().await {
            Ok(body) => String::from_utf8_lossy(&body).into_owned(),
            Err(e) => e.to_string(),
        };
        Err(TransferError::Protocol { status, message })
    }
}
