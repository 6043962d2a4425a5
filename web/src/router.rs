//! Mount built routes on an axum [`Router`].
//!
//! axum does the matching; each matched request is decoded into an
//! [`IncomingRequest`], run through its [`WrappedHandler`], and the
//! resulting [`Outcome`](tether_core::Outcome) is forwarded unmodified.

use crate::error::{RouterError, WebError};
use axum::body::{Body, Bytes};
use axum::extract::{Path, Request};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use bytes::BytesMut;
use futures::StreamExt;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tether_core::{App, IncomingRequest, Routes, UploadedFile, WrappedHandler};
use tracing::trace;

/// Largest request body the transport will buffer.
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Build `app` and mount its routes.
///
/// # Errors
///
/// Returns [`RouterError::Registry`] if the app does not build, and the
/// errors of [`into_router`].
pub fn router(app: App) -> Result<Router, RouterError> {
    into_router(app.build()?)
}

/// Mount every route on a fresh router. Routes sharing a path are served by
/// one method router.
///
/// # Errors
///
/// Returns [`RouterError::UnsupportedMethod`] for methods axum cannot filter
/// on, and [`RouterError::ParamMismatch`] when two routes share a path shape
/// under different parameter names.
pub fn into_router(routes: Routes) -> Result<Router, RouterError> {
    let mut by_shape: BTreeMap<String, (String, MethodRouter)> = BTreeMap::new();

    for handler in routes {
        let path = handler.path().to_string();
        let filter = MethodFilter::try_from(handler.method().clone()).map_err(|_| {
            RouterError::UnsupportedMethod {
                method: handler.method().clone(),
                path: path.clone(),
            }
        })?;

        let (existing, methods) = by_shape
            .remove(&shape_of(&path))
            .unwrap_or_else(|| (path.clone(), MethodRouter::new()));
        if existing != path {
            return Err(RouterError::ParamMismatch { path, existing });
        }

        let endpoint = move |params: Option<Path<HashMap<String, String>>>, request: Request| {
            let handler = handler.clone();
            async move {
                let params = params.map(|Path(params)| params).unwrap_or_default();
                match dispatch(&handler, params, request).await {
                    Ok(response) => response,
                    Err(err) => err.into_response(),
                }
            }
        };
        by_shape.insert(shape_of(&path), (path, methods.on(filter, endpoint)));
    }

    Ok(by_shape
        .into_values()
        .fold(Router::new(), |router, (path, methods)| {
            router.route(&path, methods)
        }))
}

async fn dispatch(
    handler: &WrappedHandler,
    params: HashMap<String, String>,
    request: Request,
) -> crate::WebResult<Response> {
    let (parts, body) = request.into_parts();

    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_SIZE) {
        return Err(WebError::payload_too_large(MAX_BODY_SIZE));
    }
    let bytes = read_body(body).await?;

    let query = decode_pairs(parts.uri.query().unwrap_or_default())?;
    let decoded = decode_body(&parts.headers, bytes.clone()).await?;

    let mut incoming = IncomingRequest::new(parts.method, parts.uri);
    incoming.request.headers = parts.headers;
    incoming.params = params
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();
    incoming.query = query;
    incoming.body = decoded.value;
    incoming.raw_body = bytes;
    incoming.files = decoded.files;

    trace!(route = handler.path(), "dispatching");
    let outcome = handler.call(incoming).await?;
    Ok(outcome.into_response().map(Body::from))
}

/// Buffer the body, failing with 413 as soon as it outgrows
/// [`MAX_BODY_SIZE`], declared length or not.
async fn read_body(body: Body) -> Result<Bytes, WebError> {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| WebError::bad_request(format!("failed to read request body: {e}")))?;
        if buffer.len() + chunk.len() > MAX_BODY_SIZE {
            return Err(WebError::payload_too_large(MAX_BODY_SIZE));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// A request body decoded by its content type.
#[derive(Debug, Default)]
pub struct DecodedBody {
    /// Structured view of the body
    pub value: Value,
    /// File fields of a multipart body, contents included
    pub files: Vec<UploadedFile>,
}

impl From<Value> for DecodedBody {
    fn from(value: Value) -> Self {
        Self {
            value,
            files: Vec::new(),
        }
    }
}

/// Decode `a=1&b=2&b=3` into `{"a": "1", "b": ["2", "3"]}`.
///
/// # Errors
///
/// Returns a 400 [`WebError`] for malformed input.
pub fn decode_pairs(encoded: &str) -> Result<Map<String, Value>, WebError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(encoded)
        .map_err(|e| WebError::bad_request(format!("malformed form data: {e}")))?;
    let mut map = Map::new();
    for (key, value) in pairs {
        push_value(&mut map, key, Value::String(value));
    }
    Ok(map)
}

fn push_value(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

/// Decode a request body by its content type.
///
/// JSON and url-encoded forms become structured values. Multipart text
/// fields become strings; file fields are described as
/// `{filename, type, size}` in the value and kept whole in
/// [`DecodedBody::files`]. `application/octet-stream` and bodies that are not
/// UTF-8 decode to `null` (the bytes stay on the request); anything else is
/// text. An empty body is `null`.
///
/// # Errors
///
/// Returns a 400 [`WebError`] when the body does not match its content type.
pub async fn decode_body(headers: &HeaderMap, bytes: Bytes) -> Result<DecodedBody, WebError> {
    if bytes.is_empty() {
        return Ok(DecodedBody::default());
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match media_type.as_str() {
        "application/json" => serde_json::from_slice::<Value>(&bytes)
            .map(DecodedBody::from)
            .map_err(|e| WebError::bad_request(format!("invalid JSON body: {e}"))),
        "application/x-www-form-urlencoded" => {
            let text = String::from_utf8_lossy(&bytes);
            decode_pairs(&text).map(|map| DecodedBody::from(Value::Object(map)))
        }
        "multipart/form-data" => decode_multipart(content_type, bytes).await,
        "application/octet-stream" => Ok(DecodedBody::default()),
        _ => Ok(std::str::from_utf8(&bytes)
            .map(|text| DecodedBody::from(Value::String(text.to_string())))
            .unwrap_or_default()),
    }
}

async fn decode_multipart(content_type: &str, bytes: Bytes) -> Result<DecodedBody, WebError> {
    let malformed = |e: multer::Error| WebError::bad_request(format!("malformed multipart body: {e}"));

    let boundary = multer::parse_boundary(content_type).map_err(malformed)?;
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(bytes) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut map = Map::new();
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(ToString::to_string);
        let media = field.content_type().map(ToString::to_string);
        let data = field.bytes().await.map_err(malformed)?;
        let value = match file_name {
            Some(file_name) => {
                let described = serde_json::json!({
                    "filename": file_name,
                    "type": media,
                    "size": data.len(),
                });
                files.push(UploadedFile {
                    field: name.clone(),
                    file_name,
                    content_type: media,
                    bytes: data,
                });
                described
            }
            None => Value::String(String::from_utf8_lossy(&data).into_owned()),
        };
        push_value(&mut map, name, value);
    }
    Ok(DecodedBody {
        value: Value::Object(map),
        files,
    })
}

fn shape_of(path: &str) -> String {
    path.split('/')
        .map(|segment| if segment.starts_with(':') { ":" } else { segment })
        .collect::<Vec<_>>()
        .join("/")
}
