//! Client configuration.
//!
//! A [`ClientConfig`] is built once and shared (behind an `Arc`) by every
//! call made through a [`Client`](crate::Client). Nothing in it changes after
//! construction.

use crate::envelope::Data;
use crate::error::ClientError;
use crate::fetch::{Fetch, FetchResponse, RequestBody, RequestInit};
use futures::future::BoxFuture;
use http::{HeaderMap, Method};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Hosts that default to plain `http://` when no scheme is given.
pub const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "0.0.0.0"];

/// Async header provider, invoked once per call.
pub type HeaderProvider =
    Arc<dyn Fn() -> BoxFuture<'static, Result<HeaderMap, ClientError>> + Send + Sync>;

/// Pre-request hook: receives the request path (`/users/7`, no domain or
/// query) and the computed request.
pub type RequestHook = Arc<
    dyn Fn(String, RequestInit) -> BoxFuture<'static, Result<Option<RequestOverride>, ClientError>>
        + Send
        + Sync,
>;

/// Post-response hook: receives a duplicate of the response.
pub type ResponseHook =
    Arc<dyn Fn(FetchResponse) -> BoxFuture<'static, Result<Option<Data>, ClientError>> + Send + Sync>;

/// Where config-level headers come from.
#[derive(Clone)]
pub enum HeaderSource {
    /// A fixed map
    Static(HeaderMap),
    /// Computed for every call
    Provider(HeaderProvider),
}

impl HeaderSource {
    /// Evaluate the source.
    ///
    /// # Errors
    ///
    /// Propagates the provider's error.
    pub async fn resolve(&self) -> Result<HeaderMap, ClientError> {
        match self {
            Self::Static(headers) => Ok(headers.clone()),
            Self::Provider(provider) => provider().await,
        }
    }
}

impl fmt::Debug for HeaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(headers) => f.debug_tuple("Static").field(headers).finish(),
            Self::Provider(_) => f.write_str("Provider"),
        }
    }
}

/// Base or per-call transport options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Headers at the lowest precedence of their layer
    pub headers: HeaderMap,
    /// Forwarded to the fetcher
    pub timeout: Option<Duration>,
}

impl FetchOptions {
    /// Builder: add a header.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidHeader`] for an unrepresentable name or value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        insert_header(&mut self.headers, name, value)?;
        Ok(self)
    }

    /// Builder: set the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Values returned by the pre-request hook. Present fields win over the
/// computed request; headers merge per key.
#[derive(Debug, Clone, Default)]
pub struct RequestOverride {
    /// Replacement method
    pub method: Option<Method>,
    /// Headers merged over the computed ones
    pub headers: HeaderMap,
    /// Replacement body
    pub body: Option<RequestBody>,
    /// Replacement timeout
    pub timeout: Option<Duration>,
}

impl RequestOverride {
    pub(crate) fn apply(self, init: &mut RequestInit) {
        if let Some(method) = self.method {
            init.method = method;
        }
        overlay(&mut init.headers, self.headers);
        if let Some(body) = self.body {
            init.body = Some(body);
        }
        if let Some(timeout) = self.timeout {
            init.timeout = Some(timeout);
        }
    }
}

/// Immutable client configuration.
#[derive(Clone, Default)]
pub struct ClientConfig {
    /// Network-call override (default: reqwest)
    pub fetcher: Option<Arc<dyn Fetch>>,
    /// Config-level headers
    pub headers: Option<HeaderSource>,
    /// Pre-request hook
    pub on_request: Option<RequestHook>,
    /// Post-response hook
    pub on_response: Option<ResponseHook>,
    /// Base request options
    pub fetch: FetchOptions,
}

impl ClientConfig {
    /// Empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: use a custom fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: impl Fetch + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Builder: static config-level headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(HeaderSource::Static(headers));
        self
    }

    /// Builder: headers computed for every call.
    #[must_use]
    pub fn with_header_provider<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HeaderMap, ClientError>> + Send + 'static,
    {
        self.headers = Some(HeaderSource::Provider(Arc::new(move || {
            Box::pin(provider())
        })));
        self
    }

    /// Builder: pre-request hook.
    #[must_use]
    pub fn on_request<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(String, RequestInit) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<RequestOverride>, ClientError>> + Send + 'static,
    {
        self.on_request = Some(Arc::new(move |path, init| Box::pin(hook(path, init))));
        self
    }

    /// Builder: post-response hook. Returning `Some(data)` skips default
    /// parsing.
    #[must_use]
    pub fn on_response<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(FetchResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Data>, ClientError>> + Send + 'static,
    {
        self.on_response = Some(Arc::new(move |response| Box::pin(hook(response))));
        self
    }

    /// Builder: base request options.
    #[must_use]
    pub fn with_fetch_options(mut self, fetch: FetchOptions) -> Self {
        self.fetch = fetch;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("fetcher", &self.fetcher.is_some())
            .field("headers", &self.headers)
            .field("on_request", &self.on_request.is_some())
            .field("on_response", &self.on_response.is_some())
            .field("fetch", &self.fetch)
            .finish()
    }
}

/// Give `domain` a scheme if it has none and strip one trailing `/`.
///
/// Local hosts get `http://`, everything else `https://`.
#[must_use]
pub fn normalize_domain(domain: &str) -> String {
    let mut url = if domain.contains("://") {
        domain.to_string()
    } else {
        let host = domain.split([':', '/']).next().unwrap_or_default();
        if LOCAL_HOSTS.contains(&host) {
            format!("http://{domain}")
        } else {
            format!("https://{domain}")
        }
    };
    if url.ends_with('/') {
        url.pop();
    }
    url
}

/// Merge `layer` over `base`, replacing every key `layer` carries.
pub(crate) fn overlay(base: &mut HeaderMap, layer: HeaderMap) {
    let mut current = None;
    for (name, value) in layer {
        // `None` names continue the previous key's values
        if let Some(name) = name {
            base.remove(&name);
            current = Some(name);
        }
        if let Some(name) = &current {
            base.append(name.clone(), value);
        }
    }
}

pub(crate) fn insert_header(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
) -> Result<(), ClientError> {
    let name = http::HeaderName::try_from(name)
        .map_err(|e| ClientError::InvalidHeader(format!("{name}: {e}")))?;
    let value = http::HeaderValue::try_from(value)
        .map_err(|e| ClientError::InvalidHeader(format!("{name}: {e}")))?;
    headers.insert(name, value);
    Ok(())
}
