//! The uniform result of every client call.

use crate::error::ClientError;
use crate::fetch::FetchResponse;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parsed response body.
#[derive(Debug)]
pub enum Data {
    /// `application/json`
    Json(Value),
    /// `application/octet-stream`
    Binary(Bytes),
    /// `multipart/form-data`, in wire order
    Form(Vec<FormEntry>),
    /// Any other content type
    Text(String),
    /// `text/event-stream`: the unconsumed response, for the caller to stream
    Stream(FetchResponse),
}

impl Data {
    /// The JSON value, if this is JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The text, if this is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// JSON view of buffered data: form entries become an object (repeated
    /// names collect into arrays), binary and streams have none.
    #[must_use]
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value.clone()),
            Self::Text(text) => Some(Value::String(text.clone())),
            Self::Form(entries) => {
                let mut map = serde_json::Map::new();
                for entry in entries {
                    let value = match &entry.value {
                        FormEntryValue::Text(text) => Value::String(text.clone()),
                        FormEntryValue::File { file_name, .. } => {
                            Value::String(file_name.clone().unwrap_or_default())
                        }
                    };
                    match map.get_mut(&entry.name) {
                        Some(Value::Array(items)) => items.push(value),
                        Some(existing) => {
                            let first = existing.take();
                            *existing = Value::Array(vec![first, value]);
                        }
                        None => {
                            map.insert(entry.name.clone(), value);
                        }
                    }
                }
                Some(Value::Object(map))
            }
            Self::Binary(_) | Self::Stream(_) => None,
        }
    }
}

/// One decoded multipart entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormEntry {
    /// Field name
    pub name: String,
    /// Field value
    pub value: FormEntryValue,
}

/// Value of a decoded multipart entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEntryValue {
    /// Text field
    Text(String),
    /// File field
    File {
        /// Reported file name
        file_name: Option<String>,
        /// Reported content type
        content_type: Option<String>,
        /// Contents
        bytes: Bytes,
    },
}

/// A non-2xx response.
#[derive(Debug)]
pub struct ErrorValue {
    /// Response status
    pub status: StatusCode,
    /// Parsed body
    pub value: Data,
}

/// Low-level response details kept on the envelope.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Final URL
    pub url: String,
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
}

/// `{data | error, status, response, headers}` for one call.
#[derive(Debug)]
pub struct Envelope {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response details
    pub response: ResponseHead,
    /// Parsed body: `Ok` for 2xx, `Err` otherwise
    pub result: Result<Data, ErrorValue>,
}

impl Envelope {
    /// Data of a successful call.
    #[must_use]
    pub fn data(&self) -> Option<&Data> {
        self.result.as_ref().ok()
    }

    /// Error of a failed call.
    #[must_use]
    pub fn error(&self) -> Option<&ErrorValue> {
        self.result.as_ref().err()
    }

    /// Whether the status was 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Drop the envelope, keeping the result.
    ///
    /// # Errors
    ///
    /// Returns the [`ErrorValue`] of a non-2xx response.
    pub fn into_result(self) -> Result<Data, ErrorValue> {
        self.result
    }

    /// Decode successful JSON data into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] when the call failed, the data is not
    /// JSON, or it does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        match &self.result {
            Ok(Data::Json(value)) => {
                T::deserialize(value).map_err(|e| ClientError::Decode(e.to_string()))
            }
            Ok(_) => Err(ClientError::Decode("response is not JSON".to_string())),
            Err(error) => Err(ClientError::Decode(format!(
                "request failed with status {}",
                error.status
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(status: StatusCode, result: Result<Data, ErrorValue>) -> Envelope {
        Envelope {
            status,
            headers: HeaderMap::new(),
            response: ResponseHead {
                url: "http://localhost/x".to_string(),
                status,
                headers: HeaderMap::new(),
            },
            result,
        }
    }

    #[test]
    fn test_exactly_one_of_data_and_error() {
        let ok = envelope(StatusCode::OK, Ok(Data::Json(json!({"id": 1}))));
        assert!(ok.is_success());
        assert!(ok.data().is_some());
        assert!(ok.error().is_none());

        let failed = envelope(
            StatusCode::NOT_FOUND,
            Err(ErrorValue {
                status: StatusCode::NOT_FOUND,
                value: Data::Text("missing".to_string()),
            }),
        );
        assert!(!failed.is_success());
        assert!(failed.data().is_none());
        assert_eq!(failed.error().unwrap().value.as_text(), Some("missing"));
    }

    #[test]
    fn test_typed_json_decode() {
        #[derive(serde::Deserialize)]
        struct Todo {
            id: u32,
        }
        let ok = envelope(StatusCode::OK, Ok(Data::Json(json!({"id": 4}))));
        assert_eq!(ok.json::<Todo>().unwrap().id, 4);

        let text = envelope(StatusCode::OK, Ok(Data::Text("x".to_string())));
        assert!(matches!(text.json::<Todo>(), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_form_to_value_collects_repeats() {
        let data = Data::Form(vec![
            FormEntry {
                name: "tag".to_string(),
                value: FormEntryValue::Text("a".to_string()),
            },
            FormEntry {
                name: "tag".to_string(),
                value: FormEntryValue::Text("b".to_string()),
            },
            FormEntry {
                name: "name".to_string(),
                value: FormEntryValue::Text("ann".to_string()),
            },
        ]);
        assert_eq!(data.to_value(), Some(json!({"tag": ["a", "b"], "name": "ann"})));
    }
}
