//! # Tether Testing
//!
//! Testing utilities for Tether clients and servers.
//!
//! This crate provides:
//! - [`MockFetcher`]: records outbound requests and replays canned responses
//! - Response builders for every content type the client dispatches on
//! - proptest strategies for path segments and domains
//! - [`init_test_tracing`] for readable logs in failing tests
//!
//! ## Example
//!
//! ```
//! use tether_client::{CallOptions, Client, ClientConfig};
//! use tether_testing::{MockFetcher, helpers::json};
//! use http::StatusCode;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let fetcher = MockFetcher::new();
//! fetcher.push(json(StatusCode::OK, &json!({"id": 1})));
//!
//! let client = Client::with_config("localhost:3000", ClientConfig::new().with_fetcher(fetcher.clone()));
//! let envelope = client.path().segment("todos").get(CallOptions::new()).await.unwrap();
//!
//! assert!(envelope.is_success());
//! assert_eq!(fetcher.requests()[0].url, "http://localhost:3000/todos");
//! # });
//! ```

/// Mock implementations of client seams.
pub mod mocks {
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use tether_client::{ClientError, Fetch, FetchResponse, OutboundRequest};

    type Responder = Arc<dyn Fn(&OutboundRequest) -> FetchResponse + Send + Sync>;

    enum Canned {
        Response(FetchResponse),
        Failure(String),
    }

    #[derive(Default)]
    struct State {
        queue: VecDeque<Canned>,
        requests: Vec<OutboundRequest>,
        responder: Option<Responder>,
    }

    /// Fetcher that never touches the network.
    ///
    /// Queued responses are returned in order; once the queue is empty the
    /// responder (if any) answers. Without either, the call fails as a
    /// transport error. Clones share state, so a test can keep one handle
    /// while the client owns another.
    #[derive(Clone, Default)]
    pub struct MockFetcher {
        state: Arc<Mutex<State>>,
    }

    impl MockFetcher {
        /// Create an empty mock
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Queue a response
        pub fn push(&self, response: FetchResponse) {
            self.lock().queue.push_back(Canned::Response(response));
        }

        /// Queue a transport failure
        pub fn push_failure(&self, message: impl Into<String>) {
            self.lock().queue.push_back(Canned::Failure(message.into()));
        }

        /// Answer every call the queue does not cover
        pub fn respond_with<F>(&self, responder: F)
        where
            F: Fn(&OutboundRequest) -> FetchResponse + Send + Sync + 'static,
        {
            self.lock().responder = Some(Arc::new(responder));
        }

        /// Every request received so far, in order
        #[must_use]
        pub fn requests(&self) -> Vec<OutboundRequest> {
            self.lock().requests.clone()
        }

        /// The most recent request
        #[must_use]
        pub fn last_request(&self) -> Option<OutboundRequest> {
            self.lock().requests.last().cloned()
        }
    }

    impl Fetch for MockFetcher {
        fn fetch(
            &self,
            request: OutboundRequest,
        ) -> BoxFuture<'_, Result<FetchResponse, ClientError>> {
            let result = {
                let mut state = self.lock();
                let canned = state.queue.pop_front();
                let result = match canned {
                    Some(Canned::Response(response)) => Ok(response),
                    Some(Canned::Failure(message)) => Err(ClientError::Transport(message)),
                    None => match &state.responder {
                        Some(responder) => Ok(responder(&request)),
                        None => Err(ClientError::Transport(format!(
                            "no mock response for {}",
                            request.url
                        ))),
                    },
                };
                state.requests.push(request);
                result
            };
            Box::pin(async move { result })
        }
    }
}

/// Response builders.
pub mod helpers {
    use bytes::Bytes;
    use futures::StreamExt;
    use http::header::{CONTENT_TYPE, HeaderValue};
    use http::{HeaderMap, StatusCode};
    use serde_json::Value;
    use tether_client::{FetchResponse, ResponseBody};

    fn with_type(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    /// `application/json` response
    #[must_use]
    pub fn json(status: StatusCode, value: &Value) -> FetchResponse {
        FetchResponse::new(status, with_type("application/json"), value.to_string())
    }

    /// `text/plain` response
    #[must_use]
    pub fn text(status: StatusCode, body: &str) -> FetchResponse {
        FetchResponse::new(
            status,
            with_type("text/plain; charset=utf-8"),
            body.to_string(),
        )
    }

    /// `application/octet-stream` response
    #[must_use]
    pub fn binary(status: StatusCode, body: impl Into<Bytes>) -> FetchResponse {
        FetchResponse::new(status, with_type("application/octet-stream"), body)
    }

    /// Response with no content type and no body
    #[must_use]
    pub fn empty(status: StatusCode) -> FetchResponse {
        FetchResponse::new(status, HeaderMap::new(), Bytes::new())
    }

    /// `multipart/form-data` response with text fields only
    #[must_use]
    pub fn multipart(status: StatusCode, fields: &[(&str, &str)]) -> FetchResponse {
        const BOUNDARY: &str = "tether-test-boundary";
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        FetchResponse::new(
            status,
            with_type("multipart/form-data; boundary=tether-test-boundary"),
            body,
        )
    }

    /// `text/event-stream` response whose body is still streaming
    #[must_use]
    pub fn event_stream(events: &[&str]) -> FetchResponse {
        let chunks: Vec<_> = events
            .iter()
            .map(|event| Ok(Bytes::from(format!("data: {event}\n\n"))))
            .collect();
        FetchResponse {
            url: String::new(),
            status: StatusCode::OK,
            headers: with_type("text/event-stream"),
            body: ResponseBody::Stream(futures::stream::iter(chunks).boxed()),
        }
    }
}

/// proptest strategies.
pub mod properties {
    use proptest::prelude::*;

    const RESERVED: [&str; 9] = [
        "get", "post", "put", "patch", "delete", "options", "head", "connect", "index",
    ];

    /// A literal path segment that is neither a verb nor `index`
    pub fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,11}".prop_filter("reserved name", |s| !RESERVED.contains(&s.as_str()))
    }

    /// Up to six literal segments
    pub fn segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(segment(), 0..6)
    }

    /// A non-local host name, optionally with a port
    pub fn remote_host() -> impl Strategy<Value = String> {
        ("[a-z]{1,10}\\.(com|io|dev)", prop::option::of(1024_u16..))
            .prop_map(|(host, port)| match port {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
    }
}

/// Install a fmt subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

pub use mocks::MockFetcher;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use http::StatusCode;
    use tether_client::{Fetch, OutboundRequest, RequestInit};

    fn request(url: &str) -> OutboundRequest {
        OutboundRequest {
            url: url.to_string(),
            init: RequestInit::default(),
        }
    }

    #[tokio::test]
    async fn test_queue_then_responder_then_failure() {
        let fetcher = MockFetcher::new();
        fetcher.push(helpers::text(StatusCode::OK, "first"));
        fetcher.push_failure("down");

        let first = fetcher.fetch(request("http://a/1")).await.unwrap();
        assert_eq!(first.bytes().await.unwrap(), "first");
        assert!(fetcher.fetch(request("http://a/2")).await.is_err());
        assert!(fetcher.fetch(request("http://a/3")).await.is_err());

        fetcher.respond_with(|_| helpers::empty(StatusCode::NO_CONTENT));
        let answered = fetcher.fetch(request("http://a/4")).await.unwrap();
        assert_eq!(answered.status, StatusCode::NO_CONTENT);

        let urls: Vec<_> = fetcher.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls, ["http://a/1", "http://a/2", "http://a/3", "http://a/4"]);
    }
}
