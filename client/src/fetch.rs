//! The network-call primitive.
//!
//! The executor never talks to the network directly: it hands an
//! [`OutboundRequest`] to a [`Fetch`] implementation. [`ReqwestFetcher`] is
//! the default; tests and embedders inject their own.

use crate::error::ClientError;
use crate::payload::{FormPart, FormValue};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::lock::Mutex;
use futures::stream::{BoxStream, StreamExt};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Encoded request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// Raw bytes (JSON or text); the content type is already in the headers
    Bytes(Bytes),
    /// Multipart entries; the transport picks the boundary and content type
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    /// The bytes of a non-multipart body.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Multipart(_) => None,
        }
    }
}

/// Everything needed to issue one request, minus the URL.
#[derive(Debug, Clone)]
pub struct RequestInit {
    /// HTTP method
    pub method: Method,
    /// Request headers
    pub headers: HeaderMap,
    /// Encoded body
    pub body: Option<RequestBody>,
    /// Timeout forwarded to the fetcher (not enforced by the executor)
    pub timeout: Option<Duration>,
}

impl Default for RequestInit {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }
}

/// A fully built request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Absolute URL, query string included
    pub url: String,
    /// Method, headers, body and timeout
    pub init: RequestInit,
}

/// Response body: fully buffered, or still streaming.
pub enum ResponseBody {
    /// Buffered bytes
    Full(Bytes),
    /// Unconsumed byte stream
    Stream(BoxStream<'static, Result<Bytes, ClientError>>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A response as returned by a [`Fetch`] implementation.
#[derive(Debug)]
pub struct FetchResponse {
    /// Final URL
    pub url: String,
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: ResponseBody,
}

impl FetchResponse {
    /// A buffered response.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url: String::new(),
            status,
            headers,
            body: ResponseBody::Full(body.into()),
        }
    }

    /// Media type without parameters, lower-cased (`""` when absent).
    #[must_use]
    pub fn media_type(&self) -> String {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Copy of this response for a hook to consume.
    ///
    /// A buffered body is cloned. A streaming body is split in two: both
    /// halves yield every chunk, in order, whichever is read first.
    #[must_use]
    pub fn duplicate(&mut self) -> Self {
        let body = match &mut self.body {
            ResponseBody::Full(bytes) => ResponseBody::Full(bytes.clone()),
            ResponseBody::Stream(stream) => {
                let source = std::mem::replace(stream, futures::stream::empty().boxed());
                let (ours, theirs) = tee(source);
                *stream = ours;
                ResponseBody::Stream(theirs)
            }
        };
        Self {
            url: self.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            body,
        }
    }

    /// Consume the body into bytes, draining a stream if needed.
    ///
    /// # Errors
    ///
    /// Returns the first stream error.
    pub async fn bytes(self) -> Result<Bytes, ClientError> {
        match self.body {
            ResponseBody::Full(bytes) => Ok(bytes),
            ResponseBody::Stream(mut stream) => {
                let mut buffer = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(buffer.freeze())
            }
        }
    }

    /// The body as a chunk stream.
    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes, ClientError>> {
        match self.body {
            ResponseBody::Full(bytes) => futures::stream::once(async move { Ok(bytes) }).boxed(),
            ResponseBody::Stream(stream) => stream,
        }
    }
}

type Chunk = Result<Bytes, ClientError>;

struct Tee {
    source: BoxStream<'static, Chunk>,
    pending: [VecDeque<Chunk>; 2],
}

/// Split `source` into two streams that each see every chunk. Chunks pulled
/// by one side are queued for the other while it is still alive.
fn tee(source: BoxStream<'static, Chunk>) -> (BoxStream<'static, Chunk>, BoxStream<'static, Chunk>) {
    let shared = Arc::new(Mutex::new(Tee {
        source: source.fuse().boxed(),
        pending: [VecDeque::new(), VecDeque::new()],
    }));
    let half = |shared: Arc<Mutex<Tee>>, side: usize| {
        futures::stream::unfold(shared, move |shared| async move {
            let mut tee = shared.lock().await;
            if let Some(chunk) = tee.pending[side].pop_front() {
                drop(tee);
                return Some((chunk, shared));
            }
            let chunk = tee.source.next().await?;
            if Arc::strong_count(&shared) > 1 {
                let copy = match &chunk {
                    Ok(bytes) => Ok(bytes.clone()),
                    Err(e) => Err(ClientError::Transport(e.to_string())),
                };
                tee.pending[1 - side].push_back(copy);
            }
            drop(tee);
            Some((chunk, shared))
        })
        .boxed()
    };
    (half(Arc::clone(&shared), 0), half(shared, 1))
}

/// The injected network-call primitive.
pub trait Fetch: Send + Sync {
    /// Issue `request`.
    ///
    /// Cancellation is whatever dropping the returned future means for the
    /// implementation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when no response was obtained.
    fn fetch(&self, request: OutboundRequest) -> BoxFuture<'_, Result<FetchResponse, ClientError>>;
}

/// Default fetcher backed by a shared `reqwest::Client`.
///
/// `text/event-stream` bodies are left streaming; everything else is
/// buffered.
#[derive(Debug, Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Wrap an existing `reqwest` client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetch for ReqwestFetcher {
    fn fetch(&self, request: OutboundRequest) -> BoxFuture<'_, Result<FetchResponse, ClientError>> {
        Box::pin(async move {
            let OutboundRequest { url, init } = request;
            let mut builder = self
                .client
                .request(init.method, &url)
                .headers(init.headers);
            if let Some(timeout) = init.timeout {
                builder = builder.timeout(timeout);
            }
            match init.body {
                Some(RequestBody::Bytes(bytes)) => builder = builder.body(bytes),
                Some(RequestBody::Multipart(parts)) => builder = builder.multipart(to_form(parts)?),
                None => {}
            }

            let response = builder
                .send()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;

            let mut fetched = FetchResponse {
                url: response.url().to_string(),
                status: response.status(),
                headers: response.headers().clone(),
                body: ResponseBody::Full(Bytes::new()),
            };
            fetched.body = if fetched.media_type() == "text/event-stream" {
                ResponseBody::Stream(
                    response
                        .bytes_stream()
                        .map(|chunk| chunk.map_err(|e| ClientError::Transport(e.to_string())))
                        .boxed(),
                )
            } else {
                ResponseBody::Full(
                    response
                        .bytes()
                        .await
                        .map_err(|e| ClientError::Transport(e.to_string()))?,
                )
            };
            Ok(fetched)
        })
    }
}

fn to_form(parts: Vec<FormPart>) -> Result<reqwest::multipart::Form, ClientError> {
    let mut form = reqwest::multipart::Form::new();
    for FormPart { name, value } in parts {
        form = match value {
            FormValue::Text(text) => form.text(name, text),
            FormValue::File(file) => {
                let mut part =
                    reqwest::multipart::Part::bytes(file.bytes.to_vec()).file_name(file.file_name);
                if let Some(content_type) = &file.content_type {
                    part = part
                        .mime_str(content_type)
                        .map_err(|e| ClientError::Encode(e.to_string()))?;
                }
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn sse() -> FetchResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Text/Event-Stream; charset=utf-8"),
        );
        FetchResponse {
            url: String::new(),
            status: StatusCode::OK,
            headers,
            body: ResponseBody::Stream(
                futures::stream::iter(vec![
                    Ok(Bytes::from_static(b"data: 1\n\n")),
                    Ok(Bytes::from_static(b"data: 2\n\n")),
                ])
                .boxed(),
            ),
        }
    }

    #[test]
    fn test_media_type_ignores_parameters_and_case() {
        assert_eq!(sse().media_type(), "text/event-stream");
    }

    #[tokio::test]
    async fn test_duplicate_of_stream_sees_every_chunk() {
        let mut original = sse();
        let copy = original.duplicate();
        assert_eq!(copy.status, StatusCode::OK);
        assert_eq!(copy.media_type(), "text/event-stream");

        let copied = copy.bytes().await.unwrap_or_default();
        let kept = original.bytes().await.unwrap_or_default();
        assert_eq!(copied, Bytes::from_static(b"data: 1\n\ndata: 2\n\n"));
        assert_eq!(kept, copied);
    }

    #[tokio::test]
    async fn test_duplicate_halves_interleave() {
        let mut original = sse();
        let mut copy = original.duplicate().into_stream();
        let mut kept = original.into_stream();

        let first = kept.next().await.and_then(Result::ok);
        let second = kept.next().await.and_then(Result::ok);
        assert_eq!(copy.next().await.and_then(Result::ok), first);
        assert_eq!(copy.next().await.and_then(Result::ok), second);
        assert!(kept.next().await.is_none());
        assert!(copy.next().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_survives_dropped_copy() {
        let mut original = sse();
        drop(original.duplicate());
        let kept = original.bytes().await.unwrap_or_default();
        assert_eq!(kept, Bytes::from_static(b"data: 1\n\ndata: 2\n\n"));
    }

    #[tokio::test]
    async fn test_bytes_drains_stream() {
        let bytes = sse().bytes().await.unwrap_or_default();
        assert_eq!(bytes, Bytes::from_static(b"data: 1\n\ndata: 2\n\n"));
    }
}
