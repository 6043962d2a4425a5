//! Handler return values and their serialization.

use crate::context::ResponseSet;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

/// What a route handler returns.
#[derive(Debug)]
pub enum Reply {
    /// The handler produced nothing; only `set` shapes the response
    Empty,
    /// A structured value: objects and arrays become JSON, scalars text
    Json(Value),
    /// A plain text body
    Text(String),
    /// A complete response, forwarded untouched
    Response(Response<Bytes>),
}

impl Reply {
    /// Serialize `value` into a [`Reply::Json`].
    ///
    /// # Errors
    ///
    /// Returns the serde error if `value` cannot be represented as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<()> for Reply {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

impl From<Response<Bytes>> for Reply {
    fn from(response: Response<Bytes>) -> Self {
        Self::Response(response)
    }
}

/// A serialized reply body.
#[derive(Debug)]
pub enum Written {
    /// Nothing was written
    Nothing,
    /// JSON bytes
    Json(Bytes),
    /// Text body
    Text(String),
    /// A response built by the handler itself
    Response(Response<Bytes>),
}

impl Written {
    /// Serialize a handler's reply.
    #[must_use]
    pub fn from_reply(reply: Reply) -> Self {
        match reply {
            Reply::Empty => Self::Nothing,
            Reply::Response(response) => Self::Response(response),
            Reply::Text(text) => Self::Text(text),
            Reply::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                Self::Json(Bytes::from(value.to_string()))
            }
            Reply::Json(Value::String(text)) => Self::Text(text),
            Reply::Json(scalar) => Self::Text(scalar.to_string()),
        }
    }
}

/// The result of running a request through the pipeline.
#[derive(Debug)]
pub struct Outcome {
    /// Status/headers/redirect requested by the pipeline stages
    pub set: ResponseSet,
    /// The serialized reply
    pub body: Written,
}

impl Outcome {
    /// Build the HTTP response.
    ///
    /// A handler-built response is returned as-is. Otherwise the status is
    /// the explicit `set.status`, else `302` when a redirect was requested,
    /// else `200`; `set.headers` are applied after the content type so a
    /// stage can override it.
    #[must_use]
    pub fn into_response(self) -> Response<Bytes> {
        let (content_type, body) = match self.body {
            Written::Response(response) => return response,
            Written::Nothing => (None, Bytes::new()),
            Written::Json(bytes) => (Some("application/json"), bytes),
            Written::Text(text) => (Some("text/plain; charset=utf-8"), Bytes::from(text)),
        };

        let mut response = Response::new(body);
        let status = match (self.set.status, &self.set.redirect) {
            (Some(status), _) => status,
            (None, Some(_)) => StatusCode::FOUND,
            (None, None) => StatusCode::OK,
        };
        *response.status_mut() = status;

        let headers = response.headers_mut();
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if let Some(location) = self
            .set
            .redirect
            .as_deref()
            .and_then(|l| HeaderValue::from_str(l).ok())
        {
            headers.insert(LOCATION, location);
        }
        for (name, value) in &self.set.headers {
            headers.insert(name.clone(), value.clone());
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(reply: Reply, set: ResponseSet) -> Response<Bytes> {
        Outcome {
            set,
            body: Written::from_reply(reply),
        }
        .into_response()
    }

    #[test]
    fn test_object_serializes_as_json() {
        let response = outcome(json!({"id": 1}).into(), ResponseSet::default());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.body(), &Bytes::from_static(br#"{"id":1}"#));
    }

    #[test]
    fn test_scalars_serialize_as_text() {
        let number = outcome(json!(42).into(), ResponseSet::default());
        assert_eq!(number.body(), &Bytes::from_static(b"42"));

        let text = outcome(json!("hello").into(), ResponseSet::default());
        assert_eq!(text.body(), &Bytes::from_static(b"hello"));
        assert_eq!(text.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn test_empty_reply_uses_set() {
        let set = ResponseSet {
            status: Some(StatusCode::NO_CONTENT),
            ..ResponseSet::default()
        };
        let response = outcome(Reply::Empty, set);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_redirect_defaults_to_found() {
        let set = ResponseSet {
            redirect: Some("/login".to_string()),
            ..ResponseSet::default()
        };
        let response = outcome(Reply::Empty, set);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[test]
    fn test_handler_response_is_untouched() {
        let mut built = Response::new(Bytes::from_static(b"raw"));
        *built.status_mut() = StatusCode::IM_A_TEAPOT;
        let set = ResponseSet {
            status: Some(StatusCode::OK),
            ..ResponseSet::default()
        };

        let response = outcome(Reply::Response(built), set);
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert!(response.headers().is_empty());
    }
}
