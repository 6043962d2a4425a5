//! Turns an accumulated path plus body and options into an HTTP call and
//! its [`Envelope`].

use crate::config::{ClientConfig, FetchOptions, overlay};
use crate::envelope::{Data, Envelope, ErrorValue, FormEntry, FormEntryValue, ResponseHead};
use crate::error::ClientError;
use crate::fetch::{Fetch, FetchResponse, OutboundRequest, ReqwestFetcher, RequestBody, RequestInit};
use crate::path::Verb;
use crate::payload::Payload;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue, IntoHeaderName};
use http::HeaderMap;
use serde_json::{Map, Value};
use tracing::debug;

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Query parameters (see [`encode_query`])
    pub query: Option<Map<String, Value>>,
    /// Per-call headers, above config-level headers
    pub headers: HeaderMap,
    /// Per-call transport options, between config-level and per-call headers
    pub fetch: Option<FetchOptions>,
}

impl CallOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add one query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Builder: add one header.
    #[must_use]
    pub fn with_header(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Builder: per-call transport options.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchOptions) -> Self {
        self.fetch = Some(fetch);
        self
    }
}

/// Encode query parameters as `application/x-www-form-urlencoded`.
///
/// Arrays repeat the key once per element, objects are sent as JSON text,
/// strings verbatim, other scalars stringified, and `null` is omitted.
///
/// # Errors
///
/// Returns [`ClientError::Encode`] if the pairs cannot be serialized.
pub fn encode_query(query: &Map<String, Value>) -> Result<String, ClientError> {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    for (key, value) in query {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().filter_map(query_text).map(|text| (key.as_str(), text)));
            }
            other => {
                if let Some(text) = query_text(other) {
                    pairs.push((key.as_str(), text));
                }
            }
        }
    }
    serde_urlencoded::to_string(&pairs).map_err(|e| ClientError::Encode(e.to_string()))
}

fn query_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Build the full URL for `segments` under `domain`.
///
/// # Errors
///
/// Returns [`ClientError::Encode`] for an unencodable query and
/// [`ClientError::InvalidUrl`] when the result does not parse as a URL.
pub fn build_url(
    domain: &str,
    segments: &[String],
    query: Option<&Map<String, Value>>,
) -> Result<String, ClientError> {
    let mut url = format!("{domain}/{}", segments.join("/"));
    if let Some(query) = query {
        let encoded = encode_query(query)?;
        if !encoded.is_empty() {
            url.push('?');
            url.push_str(&encoded);
        }
    }
    reqwest::Url::parse(&url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;
    Ok(url)
}

/// Encode `body` into `init`, setting the content type it implies.
///
/// # Errors
///
/// Returns [`ClientError::Encode`] if JSON serialization fails.
pub fn encode_body(body: &Payload, init: &mut RequestInit) -> Result<(), ClientError> {
    match body {
        Payload::Null => {}
        body if body.contains_attachment() => {
            // the transport computes the boundary
            init.headers.remove(CONTENT_TYPE);
            init.body = Some(RequestBody::Multipart(body.form_parts()));
        }
        Payload::Object(_) | Payload::Array(_) => {
            let bytes = serde_json::to_vec(&body.to_value())
                .map_err(|e| ClientError::Encode(e.to_string()))?;
            init.headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            init.body = Some(RequestBody::Bytes(Bytes::from(bytes)));
        }
        scalar => {
            init.headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("text/plain"));
            init.body = Some(RequestBody::Bytes(Bytes::from(scalar.to_text())));
        }
    }
    Ok(())
}

/// Issue one call and wrap the outcome in an [`Envelope`].
///
/// Non-2xx statuses are not errors: they land in [`Envelope::error`].
///
/// # Errors
///
/// Returns a [`ClientError`] when the request cannot be built, a hook or the
/// header provider fails, the transport fails, or the body cannot be parsed.
pub async fn execute(
    verb: Verb,
    domain: &str,
    config: &ClientConfig,
    segments: &[String],
    body: Option<Payload>,
    options: CallOptions,
) -> Result<Envelope, ClientError> {
    let url = build_url(domain, segments, options.query.as_ref())?;

    let mut headers = config.fetch.headers.clone();
    if let Some(source) = &config.headers {
        overlay(&mut headers, source.resolve().await?);
    }
    let mut timeout = config.fetch.timeout;
    if let Some(fetch) = options.fetch {
        overlay(&mut headers, fetch.headers);
        timeout = fetch.timeout.or(timeout);
    }
    overlay(&mut headers, options.headers);

    let mut init = RequestInit {
        method: verb.as_method(),
        headers,
        body: None,
        timeout,
    };
    if verb.allows_body() {
        if let Some(body) = &body {
            encode_body(body, &mut init)?;
        }
    }

    if let Some(hook) = &config.on_request {
        let path = format!("/{}", segments.join("/"));
        if let Some(overrides) = hook(path, init.clone()).await? {
            overrides.apply(&mut init);
        }
    }

    let method = init.method.clone();
    let request = OutboundRequest {
        url: url.clone(),
        init,
    };
    let mut response = match &config.fetcher {
        Some(fetcher) => fetcher.fetch(request).await?,
        None => ReqwestFetcher::default().fetch(request).await?,
    };
    debug!(%method, %url, status = %response.status, "Call completed");

    let status = response.status;
    let head = ResponseHead {
        url: if response.url.is_empty() {
            url
        } else {
            response.url.clone()
        },
        status,
        headers: response.headers.clone(),
    };

    let hooked = match &config.on_response {
        Some(hook) => hook(response.duplicate()).await?,
        None => None,
    };
    let data = match hooked {
        Some(data) => data,
        None => parse_response(response).await?,
    };

    let result = if status.is_success() {
        Ok(data)
    } else {
        Err(ErrorValue {
            status,
            value: data,
        })
    };
    Ok(Envelope {
        status,
        headers: head.headers.clone(),
        response: head,
        result,
    })
}

/// Parse a response body according to its content type.
///
/// # Errors
///
/// Returns [`ClientError::Decode`] for malformed JSON or multipart bodies,
/// and the transport error if a streamed body fails mid-way.
pub async fn parse_response(response: FetchResponse) -> Result<Data, ClientError> {
    match response.media_type().as_str() {
        "text/event-stream" => Ok(Data::Stream(response)),
        "application/json" => {
            let success = response.status.is_success();
            let bytes = response.bytes().await?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Data::Json(Value::Null));
            }
            match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Data::Json(value)),
                Err(_) if !success => Ok(Data::Text(String::from_utf8_lossy(&bytes).into_owned())),
                Err(e) => Err(ClientError::Decode(e.to_string())),
            }
        }
        "application/octet-stream" => Ok(Data::Binary(response.bytes().await?)),
        "multipart/form-data" => parse_form(response).await.map(Data::Form),
        _ => {
            let bytes = response.bytes().await?;
            Ok(Data::Text(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }
}

async fn parse_form(response: FetchResponse) -> Result<Vec<FormEntry>, ClientError> {
    let content_type = response
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary =
        multer::parse_boundary(content_type).map_err(|e| ClientError::Decode(e.to_string()))?;

    let mut multipart = multer::Multipart::new(response.into_stream(), boundary);
    let mut entries = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(ToString::to_string);
        let content_type = field.content_type().map(ToString::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let value = if file_name.is_some() {
            FormEntryValue::File {
                file_name,
                content_type,
                bytes,
            }
        } else {
            FormEntryValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        };
        entries.push(FormEntry { name, value });
    }
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::payload::Attachment;
    use http::StatusCode;
    use serde_json::json;

    fn query(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_query_arrays_repeat_and_nulls_vanish() {
        let encoded = encode_query(&query(json!({
            "a": [1, "x"],
            "b": null,
            "c": {"k": 1},
            "d": "hello world",
            "e": true,
        })))
        .unwrap();
        assert_eq!(encoded, "a=1&a=x&c=%7B%22k%22%3A1%7D&d=hello+world&e=true");
    }

    #[test]
    fn test_build_url_root_and_nested() {
        assert_eq!(build_url("http://localhost:3000", &[], None).unwrap(), "http://localhost:3000/");
        let segments = vec!["users".to_string(), "42".to_string()];
        assert_eq!(
            build_url("https://api.example.com", &segments, Some(&query(json!({"q": "a"})))).unwrap(),
            "https://api.example.com/users/42?q=a"
        );
        assert_eq!(
            build_url("https://api.example.com", &segments, Some(&Map::new())).unwrap(),
            "https://api.example.com/users/42"
        );
    }

    #[test]
    fn test_build_url_rejects_garbage_domain() {
        assert!(matches!(build_url("not a url", &[], None), Err(ClientError::InvalidUrl(_))));
    }

    #[test]
    fn test_object_body_is_json() {
        let mut init = RequestInit::default();
        encode_body(&Payload::from(json!({"title": "x"})), &mut init).unwrap();
        assert_eq!(init.headers[CONTENT_TYPE], "application/json");
        assert_eq!(
            init.body.as_ref().and_then(RequestBody::as_bytes).unwrap().as_ref(),
            br#"{"title":"x"}"#
        );
    }

    #[test]
    fn test_scalar_body_is_text() {
        let mut init = RequestInit::default();
        encode_body(&Payload::from(5_i64), &mut init).unwrap();
        assert_eq!(init.headers[CONTENT_TYPE], "text/plain");
        assert_eq!(init.body, Some(RequestBody::Bytes(Bytes::from_static(b"5"))));
    }

    #[test]
    fn test_attachment_body_is_multipart_without_content_type() {
        let mut init = RequestInit::default();
        init.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = Payload::object([(
            "files",
            Payload::Array(vec![Attachment::new("a.txt", "hi").into()]),
        )]);
        encode_body(&body, &mut init).unwrap();
        assert!(init.headers.get(CONTENT_TYPE).is_none());
        assert!(matches!(init.body, Some(RequestBody::Multipart(ref parts)) if parts.len() == 1));
    }

    #[test]
    fn test_null_body_sends_nothing() {
        let mut init = RequestInit::default();
        encode_body(&Payload::Null, &mut init).unwrap();
        assert!(init.body.is_none());
        assert!(init.headers.is_empty());
    }

    fn response(content_type: &str, body: &'static [u8]) -> FetchResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        FetchResponse::new(StatusCode::OK, headers, Bytes::from_static(body))
    }

    #[tokio::test]
    async fn test_parse_dispatches_on_content_type() {
        let json = parse_response(response("Application/JSON; charset=utf-8", b"{\"a\":1}"))
            .await
            .unwrap();
        assert_eq!(json.as_json(), Some(&json!({"a": 1})));

        let empty = parse_response(response("application/json", b"")).await.unwrap();
        assert_eq!(empty.as_json(), Some(&Value::Null));

        let binary = parse_response(response("application/octet-stream", b"\x00\x01"))
            .await
            .unwrap();
        assert!(matches!(binary, Data::Binary(ref b) if b.as_ref() == b"\x00\x01"));

        let text = parse_response(response("text/html", b"<p>hi</p>")).await.unwrap();
        assert_eq!(text.as_text(), Some("<p>hi</p>"));

        let stream = parse_response(response("text/event-stream", b"data: x\n\n"))
            .await
            .unwrap();
        assert!(matches!(stream, Data::Stream(_)));
    }

    #[tokio::test]
    async fn test_parse_multipart() {
        let body: &'static [u8] = b"--XYZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
milk\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\r\n\
hi\r\n\
--XYZ--\r\n";
        let data = parse_response(response("multipart/form-data; boundary=XYZ", body))
            .await
            .unwrap();
        let Data::Form(entries) = data else {
            unreachable!("expected form data");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, FormEntryValue::Text("milk".to_string()));
        assert!(matches!(
            &entries[1].value,
            FormEntryValue::File { file_name: Some(name), bytes, .. }
                if name == "a.txt" && bytes.as_ref() == b"hi"
        ));
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let err = parse_response(response("application/json", b"{oops")).await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
