//! Request bodies.
//!
//! A [`Payload`] is a JSON-like tree that may also carry binary
//! [`Attachment`] leaves. Whether it is sent as multipart, JSON or plain
//! text depends on its shape (see [`Payload::contains_attachment`]).

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Number, Value};

/// A binary file sent as part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name reported to the server
    pub file_name: String,
    /// MIME type, if known
    pub content_type: Option<String>,
    /// File contents
    pub bytes: Bytes,
}

impl Attachment {
    /// Create an attachment with no content type.
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Builder: set the MIME type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One entry of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    /// Field name
    pub name: String,
    /// Field value
    pub value: FormValue,
}

/// Value of a multipart entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    /// A text field
    Text(String),
    /// A file field
    File(Attachment),
}

/// A request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No body
    #[default]
    Null,
    /// Boolean scalar
    Bool(bool),
    /// Numeric scalar
    Number(Number),
    /// String scalar
    String(String),
    /// Ordered list
    Array(Vec<Payload>),
    /// Ordered key/value pairs
    Object(Vec<(String, Payload)>),
    /// Binary file
    Attachment(Attachment),
}

impl Payload {
    /// Build an object from key/value pairs, keeping their order.
    pub fn object<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Serialize any serde value into a payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `value` cannot be represented as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::from)
    }

    /// Whether any leaf, at any depth, is an [`Attachment`].
    #[must_use]
    pub fn contains_attachment(&self) -> bool {
        match self {
            Self::Attachment(_) => true,
            Self::Array(items) => items.iter().any(Self::contains_attachment),
            Self::Object(pairs) => pairs.iter().any(|(_, v)| v.contains_attachment()),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => false,
        }
    }

    /// JSON view of the payload. Attachments are represented by their file
    /// name, since their bytes have no JSON form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Object(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Self::Attachment(file) => Value::String(file.file_name.clone()),
        }
    }

    /// Text of a scalar as a form or plain-text body would carry it:
    /// strings verbatim, everything else as JSON text.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_value().to_string(),
        }
    }

    /// Multipart entries for this payload.
    ///
    /// Each top-level key becomes one entry, and an array value becomes one
    /// entry per element under the same key. A top-level array uses element
    /// indices as names; a bare attachment is sent as `file`.
    #[must_use]
    pub fn form_parts(&self) -> Vec<FormPart> {
        let mut parts = Vec::new();
        match self {
            Self::Object(pairs) => {
                for (name, value) in pairs {
                    match value {
                        Self::Array(items) => {
                            for item in items {
                                parts.push(form_part(name, item));
                            }
                        }
                        other => parts.push(form_part(name, other)),
                    }
                }
            }
            Self::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    parts.push(form_part(&index.to_string(), item));
                }
            }
            other => parts.push(form_part("file", other)),
        }
        parts
    }
}

fn form_part(name: &str, value: &Payload) -> FormPart {
    let value = match value {
        Payload::Attachment(file) => FormValue::File(file.clone()),
        other => FormValue::Text(other.to_text()),
    };
    FormPart {
        name: name.to_string(),
        value,
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::String(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<Attachment> for Payload {
    fn from(file: Attachment) -> Self {
        Self::Attachment(file)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(items: Vec<Payload>) -> Self {
        Self::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn avatar() -> Attachment {
        Attachment::new("a.png", Bytes::from_static(b"\x89PNG")).with_content_type("image/png")
    }

    #[test]
    fn test_attachment_detected_inside_arrays() {
        let body = Payload::object([
            ("name", Payload::from("ann")),
            ("files", Payload::Array(vec![Payload::from(1_i64), avatar().into()])),
        ]);
        assert!(body.contains_attachment());
        assert!(!Payload::from(json!({"a": [1, {"b": "c"}]})).contains_attachment());
    }

    #[test]
    fn test_form_parts_repeat_array_keys() {
        let body = Payload::object([
            ("name", Payload::from("ann")),
            ("tags", Payload::from(json!(["a", "b"]))),
            ("meta", Payload::from(json!({"x": 1}))),
            ("avatar", avatar().into()),
        ]);

        let parts = body.form_parts();
        let names: Vec<_> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["name", "tags", "tags", "meta", "avatar"]);
        assert_eq!(parts[1].value, FormValue::Text("a".to_string()));
        assert_eq!(parts[3].value, FormValue::Text(r#"{"x":1}"#.to_string()));
        assert_eq!(parts[4].value, FormValue::File(avatar()));
    }

    #[test]
    fn test_to_text_keeps_strings_verbatim() {
        assert_eq!(Payload::from("plain").to_text(), "plain");
        assert_eq!(Payload::from(7_i64).to_text(), "7");
        assert_eq!(Payload::from(true).to_text(), "true");
    }
}
