//! Request validation capability.
//!
//! The toolkit does not ship a validation library. A route declares one
//! [`Schema`] per request part it wants parsed; the pipeline runs them after
//! every derive function and before the first resolve function, replacing
//! the raw part with the parsed value.

use crate::context::Context;
use crate::error::ValidationError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Which part of the inbound request a schema applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPart {
    /// Matched path parameters
    Params,
    /// Decoded query string
    Query,
    /// Request headers (lower-cased names)
    Headers,
    /// Decoded request body
    Body,
}

impl fmt::Display for RequestPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Params => "params",
            Self::Query => "query",
            Self::Headers => "headers",
            Self::Body => "body",
        };
        f.write_str(name)
    }
}

/// A declarative shape that turns a raw value into a parsed one.
pub trait Schema: Send + Sync {
    /// Parse `raw`, or explain why it does not fit.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when `raw` does not satisfy the shape.
    fn parse(&self, part: RequestPart, raw: &Value) -> Result<Value, ValidationError>;
}

impl<F> Schema for F
where
    F: Fn(RequestPart, &Value) -> Result<Value, ValidationError> + Send + Sync,
{
    fn parse(&self, part: RequestPart, raw: &Value) -> Result<Value, ValidationError> {
        self(part, raw)
    }
}

/// Schema backed by a serde type: the raw value must deserialize into `T`,
/// and the parsed value is `T` serialized back (defaults filled in, unknown
/// fields dropped when `T` ignores them).
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    /// Create the schema.
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for Typed<T>
where
    T: DeserializeOwned + Serialize,
{
    fn parse(&self, part: RequestPart, raw: &Value) -> Result<Value, ValidationError> {
        let parsed: T = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::new(part, e.to_string()))?;
        serde_json::to_value(parsed).map_err(|e| ValidationError::new(part, e.to_string()))
    }
}

/// Per-route set of schemas, one optional slot per request part.
#[derive(Clone, Default)]
pub struct RouteSchema {
    params: Option<Arc<dyn Schema>>,
    query: Option<Arc<dyn Schema>>,
    headers: Option<Arc<dyn Schema>>,
    body: Option<Arc<dyn Schema>>,
}

impl RouteSchema {
    /// An empty schema set (nothing is validated).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: validate path parameters.
    #[must_use]
    pub fn params(mut self, schema: impl Schema + 'static) -> Self {
        self.params = Some(Arc::new(schema));
        self
    }

    /// Builder: validate the query string.
    #[must_use]
    pub fn query(mut self, schema: impl Schema + 'static) -> Self {
        self.query = Some(Arc::new(schema));
        self
    }

    /// Builder: validate headers.
    #[must_use]
    pub fn headers(mut self, schema: impl Schema + 'static) -> Self {
        self.headers = Some(Arc::new(schema));
        self
    }

    /// Builder: validate the body.
    #[must_use]
    pub fn body(mut self, schema: impl Schema + 'static) -> Self {
        self.body = Some(Arc::new(schema));
        self
    }

    /// Builder: the body must deserialize into `T`.
    #[must_use]
    pub fn body_as<T>(self) -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.body(Typed::<T>::new())
    }

    /// Builder: the query must deserialize into `T`.
    #[must_use]
    pub fn query_as<T>(self) -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.query(Typed::<T>::new())
    }

    /// Builder: the path parameters must deserialize into `T`.
    #[must_use]
    pub fn params_as<T>(self) -> Self
    where
        T: DeserializeOwned + Serialize + 'static,
    {
        self.params(Typed::<T>::new())
    }

    /// Run every declared schema against `ctx`, in the order params, query,
    /// headers, body.
    pub(crate) fn apply(&self, ctx: &mut Context) -> Result<(), ValidationError> {
        if let Some(schema) = &self.params {
            ctx.params = into_object(
                RequestPart::Params,
                schema.parse(RequestPart::Params, &Value::Object(ctx.params.clone()))?,
            )?;
        }
        if let Some(schema) = &self.query {
            ctx.query = into_object(
                RequestPart::Query,
                schema.parse(RequestPart::Query, &Value::Object(ctx.query.clone()))?,
            )?;
        }
        if let Some(schema) = &self.headers {
            ctx.headers = into_object(
                RequestPart::Headers,
                schema.parse(RequestPart::Headers, &Value::Object(ctx.headers.clone()))?,
            )?;
        }
        if let Some(schema) = &self.body {
            ctx.body = schema.parse(RequestPart::Body, &ctx.body)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RouteSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSchema")
            .field("params", &self.params.is_some())
            .field("query", &self.query.is_some())
            .field("headers", &self.headers.is_some())
            .field("body", &self.body.is_some())
            .finish()
    }
}

fn into_object(part: RequestPart, value: Value) -> Result<Map<String, Value>, ValidationError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ValidationError::new(
            part,
            format!("schema produced a non-object value: {other}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct NewTodo {
        title: String,
        #[serde(default)]
        done: bool,
    }

    #[test]
    fn test_typed_schema_fills_defaults() {
        let parsed = Typed::<NewTodo>::new()
            .parse(RequestPart::Body, &json!({"title": "write docs"}))
            .unwrap_or_default();
        assert_eq!(parsed, json!({"title": "write docs", "done": false}));
    }

    #[test]
    fn test_typed_schema_rejects_wrong_shape() {
        let err = Typed::<NewTodo>::new().parse(RequestPart::Body, &json!({"done": true}));
        assert!(matches!(err, Err(ValidationError { part: RequestPart::Body, .. })));
    }

    #[test]
    fn test_closure_schema() {
        let upper = |_part: RequestPart, raw: &Value| {
            raw.as_str()
                .map(|s| Value::String(s.to_uppercase()))
                .ok_or_else(|| ValidationError::new(RequestPart::Body, "expected a string"))
        };
        assert_eq!(upper.parse(RequestPart::Body, &json!("hi")), Ok(json!("HI")));
    }
}
