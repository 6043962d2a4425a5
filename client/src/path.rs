//! The path accumulator.
//!
//! A [`PathBuilder`] collects URL segments one step at a time and ends in a
//! [`Caller`] bound to an HTTP verb. Every step returns a fresh value, so a
//! builder can be shared and extended from many places independently.
//!
//! ```no_run
//! # async fn demo() -> Result<(), tether_client::ClientError> {
//! use tether_client::{CallOptions, Client, Payload};
//! use serde_json::json;
//!
//! let client = Client::new("localhost:3000");
//! let todos = client.path().segment("todos");
//!
//! let created = todos
//!     .post(Payload::from(json!({"title": "milk"})), CallOptions::new())
//!     .await?;
//! let one = todos.param("1").get(CallOptions::new()).await?;
//! # let _ = (created, one);
//! # Ok(())
//! # }
//! ```

use crate::config::{ClientConfig, normalize_domain};
use crate::envelope::Envelope;
use crate::error::ClientError;
use crate::executor::{CallOptions, execute};
use crate::fetch::ReqwestFetcher;
use crate::payload::Payload;
use http::Method;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tether_core::RouteTree;
use tether_core::tree::INDEX;

/// A recognized HTTP verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `OPTIONS`
    Options,
    /// `HEAD`
    Head,
    /// `CONNECT`
    Connect,
}

impl Verb {
    /// All verbs, in the order they are matched.
    pub const ALL: [Self; 8] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Connect,
    ];

    /// Lower-case name, as used in a chain.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Connect => "connect",
        }
    }

    /// The HTTP method.
    #[must_use]
    pub fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Patch => Method::PATCH,
            Self::Delete => Method::DELETE,
            Self::Options => Method::OPTIONS,
            Self::Head => Method::HEAD,
            Self::Connect => Method::CONNECT,
        }
    }

    /// `GET` and `HEAD` never carry a body.
    #[must_use]
    pub const fn allows_body(self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl FromStr for Verb {
    type Err = ();

    /// Case-sensitive: only lower-case names are verbs.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|verb| verb.as_str() == name)
            .ok_or(())
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct ClientInner {
    domain: String,
    config: ClientConfig,
    routes: Option<RouteTree>,
}

/// Entry point: a normalized domain plus its shared configuration.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Client with the default configuration.
    #[must_use]
    pub fn new(domain: &str) -> Self {
        Self::with_config(domain, ClientConfig::default())
    }

    /// Client with an explicit configuration.
    ///
    /// Without a fetcher override, one reqwest-backed fetcher is created here
    /// and shared by every call.
    #[must_use]
    pub fn with_config(domain: &str, mut config: ClientConfig) -> Self {
        if config.fetcher.is_none() {
            config.fetcher = Some(Arc::new(ReqwestFetcher::default()));
        }
        Self {
            inner: Arc::new(ClientInner {
                domain: normalize_domain(domain),
                config,
                routes: None,
            }),
        }
    }

    /// Client for the domain in `TETHER_DOMAIN`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingDomain`] if `TETHER_DOMAIN` is not set.
    pub fn from_env() -> Result<Self, ClientError> {
        let domain = std::env::var("TETHER_DOMAIN").map_err(|_| ClientError::MissingDomain)?;
        Ok(Self::new(&domain))
    }

    /// Builder: only allow calls that the server's route tree declares.
    ///
    /// Calls outside the tree fail with [`ClientError::UnknownRoute`] before
    /// any I/O.
    #[must_use]
    pub fn with_routes(self, routes: RouteTree) -> Self {
        let inner = Arc::unwrap_or_clone(self.inner);
        Self {
            inner: Arc::new(ClientInner {
                routes: Some(routes),
                ..inner
            }),
        }
    }

    /// Normalized domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.inner.domain
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// An empty path.
    #[must_use]
    pub fn path(&self) -> PathBuilder {
        PathBuilder {
            client: self.clone(),
            segments: Arc::from(Vec::new()),
        }
    }
}

/// Result of [`PathBuilder::member`].
#[derive(Debug, Clone)]
pub enum Member {
    /// The chain continues
    Path(PathBuilder),
    /// The name was a verb: the chain is terminated
    Call(Caller),
}

/// Immutable, chainable segment accumulator.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    client: Client,
    segments: Arc<[String]>,
}

impl PathBuilder {
    /// Segments accumulated so far.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Name lookup: a verb terminates the chain, `index` aliases the current
    /// path, anything else is appended.
    #[must_use]
    pub fn member(&self, name: &str) -> Member {
        if let Ok(verb) = name.parse::<Verb>() {
            return Member::Call(self.method(verb));
        }
        if name == INDEX {
            return Member::Path(self.index());
        }
        Member::Path(self.segment(name))
    }

    /// Parameter call: appends the first value of `params`, stringified.
    /// A missing or empty map changes nothing.
    #[must_use]
    pub fn call(&self, params: Option<&Map<String, Value>>) -> Self {
        match params.and_then(|map| map.values().next()) {
            Some(value) => self.param(value.clone()),
            None => self.clone(),
        }
    }

    /// Append a literal segment.
    #[must_use]
    pub fn segment(&self, name: impl Into<String>) -> Self {
        self.extend(name.into())
    }

    /// Append a parameter value: strings verbatim, anything else as JSON
    /// text.
    #[must_use]
    pub fn param(&self, value: impl Into<Value>) -> Self {
        let text = match value.into() {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.extend(text)
    }

    /// The same path (root alias).
    #[must_use]
    pub fn index(&self) -> Self {
        self.clone()
    }

    /// Terminate the chain with `verb`.
    #[must_use]
    pub fn method(&self, verb: Verb) -> Caller {
        Caller {
            verb,
            path: self.clone(),
        }
    }

    fn extend(&self, segment: String) -> Self {
        let segments: Vec<String> = self
            .segments
            .iter()
            .cloned()
            .chain(std::iter::once(segment))
            .collect();
        Self {
            client: self.client.clone(),
            segments: segments.into(),
        }
    }

    /// `GET` this path.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn get(&self, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Get).send(None, options).await
    }

    /// `HEAD` this path.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn head(&self, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Head).send(None, options).await
    }

    /// `POST` `body` to this path.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn post(&self, body: Payload, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Post).send(Some(body), options).await
    }

    /// `PUT` `body` to this path.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn put(&self, body: Payload, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Put).send(Some(body), options).await
    }

    /// `PATCH` `body` to this path.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn patch(&self, body: Payload, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Patch).send(Some(body), options).await
    }

    /// `DELETE` this path, optionally with a body.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn delete(&self, body: Payload, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Delete).send(Some(body), options).await
    }

    /// `OPTIONS` this path.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn options(&self, body: Payload, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Options).send(Some(body), options).await
    }

    /// `CONNECT` this path.
    ///
    /// # Errors
    ///
    /// See [`Caller::send`].
    pub async fn connect(&self, body: Payload, options: CallOptions) -> Result<Envelope, ClientError> {
        self.method(Verb::Connect).send(Some(body), options).await
    }
}

/// A path bound to a verb, ready to send.
#[derive(Debug, Clone)]
pub struct Caller {
    verb: Verb,
    path: PathBuilder,
}

impl Caller {
    /// The bound verb.
    #[must_use]
    pub const fn verb(&self) -> Verb {
        self.verb
    }

    /// Segments of the bound path.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        self.path.segments()
    }

    /// Issue the call. `body` is ignored for `GET` and `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UnknownRoute`] when the client has a route tree
    /// that does not declare this call, and otherwise whatever
    /// [`execute`] returns.
    pub async fn send(
        &self,
        body: Option<Payload>,
        options: CallOptions,
    ) -> Result<Envelope, ClientError> {
        let inner = &self.path.client.inner;
        if let Some(routes) = &inner.routes {
            if !routes.matches(self.verb.as_str(), self.segments()) {
                return Err(ClientError::UnknownRoute {
                    verb: self.verb.to_string(),
                    path: format!("/{}", self.segments().join("/")),
                });
            }
        }
        execute(
            self.verb,
            &inner.domain,
            &inner.config,
            self.segments(),
            body,
            options,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root() -> PathBuilder {
        Client::new("localhost:3000").path()
    }

    fn path_of(member: Member) -> PathBuilder {
        match member {
            Member::Path(path) => path,
            Member::Call(caller) => panic!("unexpected caller for {:?}", caller.verb()),
        }
    }

    #[test]
    fn test_member_appends_and_terminates() {
        let users = path_of(root().member("users"));
        assert_eq!(users.segments(), ["users"]);

        match users.member("get") {
            Member::Call(caller) => {
                assert_eq!(caller.verb(), Verb::Get);
                assert_eq!(caller.segments(), ["users"]);
            }
            Member::Path(_) => panic!("get must terminate the chain"),
        }
    }

    #[test]
    fn test_verbs_are_case_sensitive() {
        let path = path_of(root().member("GET"));
        assert_eq!(path.segments(), ["GET"]);
    }

    #[test]
    fn test_index_keeps_segments() {
        let users = root().segment("users");
        let same = path_of(users.member("index"));
        assert_eq!(same.segments(), users.segments());
    }

    #[test]
    fn test_call_uses_first_value() {
        let users = root().segment("users");
        let mut params = Map::new();
        params.insert("id".to_string(), json!(42));
        assert_eq!(users.call(Some(&params)).segments(), ["users", "42"]);
        assert_eq!(users.call(Some(&Map::new())).segments(), ["users"]);
        assert_eq!(users.call(None).segments(), ["users"]);
    }

    #[test]
    fn test_chains_from_one_root_are_independent() {
        let users = root().segment("users");
        let a = users.param("a");
        let b = users.param("b").segment("posts");
        assert_eq!(users.segments(), ["users"]);
        assert_eq!(a.segments(), ["users", "a"]);
        assert_eq!(b.segments(), ["users", "b", "posts"]);
    }

    #[test]
    fn test_verb_names_round_trip() {
        for verb in Verb::ALL {
            assert_eq!(verb.as_str().parse::<Verb>(), Ok(verb));
        }
        assert!(!Verb::Get.allows_body());
        assert!(!Verb::Head.allows_body());
        assert!(Verb::Delete.allows_body());
    }

    #[tokio::test]
    async fn test_unknown_route_rejected_before_io() {
        let mut tree = RouteTree::new();
        tree.insert("GET", "/users/:id");
        let client = Client::new("localhost:1").with_routes(tree);

        let err = client
            .path()
            .segment("posts")
            .get(CallOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownRoute { ref path, .. } if path == "/posts"));
    }
}
