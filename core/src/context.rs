//! Per-request context.
//!
//! A [`Context`] is built once per inbound request and handed, as an
//! immutable `Arc` snapshot, to each derive function, each resolve function
//! and finally the route handler. Stage outputs never mutate a snapshot in
//! place: the pipeline merges them into a fresh one. The only shared mutable
//! parts are [`Context::set`], which collects what the response should carry,
//! and [`Context::store`].

use crate::store::Store;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};

/// Method, URI and headers of the inbound request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Request method
    pub method: Method,
    /// Full request URI
    pub uri: Uri,
    /// Raw request headers
    pub headers: HeaderMap,
}

impl RequestInfo {
    /// Create request info with no headers.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }
}

/// A file field of a multipart request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name
    pub field: String,
    /// File name sent by the client
    pub file_name: String,
    /// Declared MIME type, if any
    pub content_type: Option<String>,
    /// File contents, untouched
    pub bytes: Bytes,
}

/// What the transport hands to a wrapped handler.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// Method, URI and headers
    pub request: RequestInfo,
    /// Path parameters produced by the external matcher
    pub params: Map<String, Value>,
    /// Decoded query string
    pub query: Map<String, Value>,
    /// Decoded body (`Value::Null` when there is none)
    pub body: Value,
    /// Body bytes exactly as received
    pub raw_body: Bytes,
    /// File fields of a multipart body
    pub files: Vec<UploadedFile>,
}

impl IncomingRequest {
    /// A request with no parameters, query or body.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            request: RequestInfo::new(method, uri),
            params: Map::new(),
            query: Map::new(),
            body: Value::Null,
            raw_body: Bytes::new(),
            files: Vec::new(),
        }
    }

    /// Builder: set a path parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), Value::String(value.into()));
        self
    }

    /// Builder: set a query value.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Builder: add a request header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request.headers.append(name, value);
        self
    }

    /// Builder: set the decoded body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    /// Builder: set the raw body bytes.
    #[must_use]
    pub fn with_raw_body(mut self, bytes: impl Into<Bytes>) -> Self {
        self.raw_body = bytes.into();
        self
    }
}

/// Status, headers and redirect to apply to the outgoing response.
#[derive(Debug, Clone, Default)]
pub struct ResponseSet {
    /// Explicit status; `None` lets the serializer pick one
    pub status: Option<StatusCode>,
    /// Extra response headers
    pub headers: HeaderMap,
    /// Redirect target, sent as `location`
    pub redirect: Option<String>,
}

/// Shared handle to a request's [`ResponseSet`].
///
/// Every snapshot of one request's context points at the same set, so a
/// write from a derive function is still visible when the handler's reply
/// is serialized.
#[derive(Debug, Clone, Default)]
pub struct SetHandle(Arc<Mutex<ResponseSet>>);

impl SetHandle {
    /// Set the response status.
    pub fn status(&self, status: StatusCode) {
        self.with(|set| set.status = Some(status));
    }

    /// Insert a response header, replacing any previous value.
    pub fn header(&self, name: HeaderName, value: HeaderValue) {
        self.with(|set| {
            set.headers.insert(name, value);
        });
    }

    /// Redirect the client to `location`.
    pub fn redirect(&self, location: impl Into<String>) {
        let location = location.into();
        self.with(|set| set.redirect = Some(location));
    }

    /// Copy of the current set.
    #[must_use]
    pub fn snapshot(&self) -> ResponseSet {
        self.with(|set| set.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut ResponseSet) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// Everything a handler can see about one request.
#[derive(Debug, Clone)]
pub struct Context {
    /// Method, URI and raw headers
    pub request: RequestInfo,
    /// Response status/headers/redirect collected during the pipeline
    pub set: SetHandle,
    /// Path parameters
    pub params: Map<String, Value>,
    /// Decoded query string
    pub query: Map<String, Value>,
    /// Decoded body
    pub body: Value,
    /// Body bytes exactly as received
    pub raw_body: Bytes,
    /// File fields of a multipart body
    pub files: Vec<UploadedFile>,
    /// Request headers keyed by lower-cased name
    pub headers: Map<String, Value>,
    /// Request cookies
    pub cookie: Map<String, Value>,
    /// Shared store
    pub store: Store,
    values: Map<String, Value>,
}

impl Context {
    /// Seed a context from an inbound request and the shared store.
    #[must_use]
    pub fn seed(incoming: IncomingRequest, store: Store) -> Self {
        let headers = header_map(&incoming.request.headers);
        let cookie = cookie_map(&incoming.request.headers);
        Self {
            request: incoming.request,
            set: SetHandle::default(),
            params: incoming.params,
            query: incoming.query,
            body: incoming.body,
            raw_body: incoming.raw_body,
            files: incoming.files,
            headers,
            cookie,
            store,
            values: Map::new(),
        }
    }

    /// A decorator, derived or resolved value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// A decorator, derived or resolved value, deserialized into `T`.
    #[must_use]
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// All decorator, derived and resolved values.
    #[must_use]
    pub const fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// A path parameter as a string.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    /// The first uploaded file sent under form field `field`.
    #[must_use]
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.field == field)
    }

    /// A request header as a string (name is case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }

    /// Merge `output` over the current values; incoming keys win.
    pub fn merge(&mut self, output: Map<String, Value>) {
        for (key, value) in output {
            self.values.insert(key, value);
        }
    }
}

fn header_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    map
}

fn cookie_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for value in headers.get_all(http::header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            if let Some((name, content)) = pair.trim().split_once('=') {
                let content = content.trim().trim_matches('"');
                map.insert(name.trim().to_string(), Value::String(content.to_string()));
            }
        }
    }
    map
}
