//! Route registry and composition.
//!
//! An [`App`] accumulates setup-time state (store entries, decorators,
//! derive/resolve functions) and route definitions. [`App::mount`] composes
//! one app into another; [`App::build`] freezes everything into [`Routes`],
//! one [`WrappedHandler`] per route, ready to be handed to a transport.
//!
//! # Example
//!
//! ```
//! use tether_core::App;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let app = App::new()
//!     .state("counter", 0)
//!     .derive(|ctx| async move {
//!         let user = ctx.header("x-user").unwrap_or("anonymous").to_string();
//!         anyhow::Ok(json!({ "user": user }))
//!     })
//!     .get("/hello", |ctx| async move {
//!         anyhow::Ok(format!("hello {}", ctx.get("user").and_then(|v| v.as_str()).unwrap_or("")))
//!     });
//!
//! let routes = app.build().unwrap();
//! assert_eq!(routes.len(), 1);
//! ```

use crate::context::{Context, IncomingRequest};
use crate::error::{PipelineError, RegistryError};
use crate::pipeline::{self, HandlerFn, Singleton};
use crate::reply::{Outcome, Reply};
use crate::schema::RouteSchema;
use crate::store::Store;
use crate::tree::RouteTree;
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A registered route: method, full path, optional schema and handler.
#[derive(Clone)]
pub struct RouteDefinition {
    /// HTTP method
    pub method: Method,
    /// Full path, prefix included (`:name` marks a parameter)
    pub path: String,
    /// Request validation, if any
    pub schema: Option<RouteSchema>,
    handler: HandlerFn,
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// A unit of server setup: state, middleware and routes.
#[derive(Debug, Default)]
pub struct App {
    name: Option<String>,
    prefix: String,
    singleton: Singleton,
    routes: Vec<RouteDefinition>,
    mounted: Vec<String>,
}

impl App {
    /// An empty app with no prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty app whose routes are registered under `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            ..Self::default()
        }
    }

    /// Builder: name the app so mounting it twice is a no-op.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The app's name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The app's path prefix (empty when none).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The shared store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.singleton.store
    }

    /// Registered routes, in registration order.
    #[must_use]
    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    /// Builder: seed a store entry.
    #[must_use]
    pub fn state(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.singleton.store.set(key, value);
        self
    }

    /// Builder: attach a read-only value to every request context.
    ///
    /// A later decorator with the same key replaces the earlier one.
    #[must_use]
    pub fn decorate(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.singleton.decorator.insert(key.into(), value.into());
        self
    }

    /// Builder: append a derive function (runs before validation).
    #[must_use]
    pub fn derive<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.singleton.derive.push(pipeline::context_fn(f));
        self
    }

    /// Builder: append a resolve function (runs after validation).
    #[must_use]
    pub fn resolve<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.singleton.resolve.push(pipeline::context_fn(f));
        self
    }

    /// Builder: register a route.
    #[must_use]
    pub fn route<F, Fut, R>(self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.add(method, path, None, pipeline::handler_fn(handler))
    }

    /// Builder: register a route whose request parts are validated first.
    #[must_use]
    pub fn route_with_schema<F, Fut, R>(
        self,
        method: Method,
        path: &str,
        schema: RouteSchema,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.add(method, path, Some(schema), pipeline::handler_fn(handler))
    }

    /// Builder: register a `GET` route.
    #[must_use]
    pub fn get<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.route(Method::GET, path, handler)
    }

    /// Builder: register a `POST` route.
    #[must_use]
    pub fn post<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.route(Method::POST, path, handler)
    }

    /// Builder: register a `PUT` route.
    #[must_use]
    pub fn put<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.route(Method::PUT, path, handler)
    }

    /// Builder: register a `PATCH` route.
    #[must_use]
    pub fn patch<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.route(Method::PATCH, path, handler)
    }

    /// Builder: register a `DELETE` route.
    #[must_use]
    pub fn delete<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.route(Method::DELETE, path, handler)
    }

    /// Builder: register an `OPTIONS` route.
    #[must_use]
    pub fn options<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.route(Method::OPTIONS, path, handler)
    }

    /// Builder: register a `HEAD` route.
    #[must_use]
    pub fn head<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Reply>,
    {
        self.route(Method::HEAD, path, handler)
    }

    fn add(
        mut self,
        method: Method,
        path: &str,
        schema: Option<RouteSchema>,
        handler: HandlerFn,
    ) -> Self {
        let path = join_path(&self.prefix, path);
        tracing::debug!(%method, %path, "registering route");
        self.routes.push(RouteDefinition {
            method,
            path,
            schema,
            handler,
        });
        self
    }

    /// Builder: compose `plugin` into this app.
    ///
    /// - store entries are unioned into this app's store; keys already
    ///   present here win, and this app's store keeps its identity
    /// - decorators are unioned the same way
    /// - the plugin's derive and resolve functions run after this app's
    /// - the plugin's routes are appended under this app's prefix
    ///
    /// A named plugin whose name was already mounted is skipped. Route
    /// conflicts are reported by [`App::build`].
    #[must_use]
    pub fn mount(mut self, plugin: Self) -> Self {
        if let Some(name) = &plugin.name {
            if self.mounted.contains(name) {
                tracing::debug!(plugin = %name, "plugin already mounted, skipping");
                return self;
            }
            self.mounted.push(name.clone());
        }
        for name in plugin.mounted {
            if !self.mounted.contains(&name) {
                self.mounted.push(name);
            }
        }

        let Singleton {
            store,
            decorator,
            derive,
            resolve,
        } = plugin.singleton;
        self.singleton.store.absorb(&store);
        for (key, value) in decorator {
            self.singleton.decorator.entry(key).or_insert(value);
        }
        self.singleton.derive.extend(derive);
        self.singleton.resolve.extend(resolve);

        for mut route in plugin.routes {
            route.path = join_path(&self.prefix, &route.path);
            self.routes.push(route);
        }
        self
    }

    /// Tree of every registered route.
    #[must_use]
    pub fn route_tree(&self) -> RouteTree {
        let mut tree = RouteTree::new();
        for route in &self.routes {
            tree.insert(route.method.as_str(), &route.path);
        }
        tree
    }

    /// Freeze the app into [`Routes`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RouteConflict`] when two routes share a
    /// method and a path shape (parameter names are ignored), and
    /// [`RegistryError::InvalidPath`] for unusable paths.
    pub fn build(self) -> Result<Routes, RegistryError> {
        let mut seen: HashMap<(Method, String), String> = HashMap::new();
        for route in &self.routes {
            let shape = path_shape(&route.path)?;
            if let Some(existing) = seen.insert((route.method.clone(), shape), route.path.clone()) {
                return Err(RegistryError::RouteConflict {
                    method: route.method.clone(),
                    path: route.path.clone(),
                    existing,
                });
            }
        }

        let tree = self.route_tree();
        let singleton = Arc::new(self.singleton);
        let handlers = self
            .routes
            .into_iter()
            .map(|route| WrappedHandler {
                route: Arc::new(route),
                singleton: Arc::clone(&singleton),
            })
            .collect();

        tracing::debug!(
            derive = singleton.derive_count(),
            resolve = singleton.resolve_count(),
            "routes built"
        );
        Ok(Routes {
            handlers,
            singleton,
            tree,
        })
    }
}

/// A route bound to the frozen singleton: running it runs the full context
/// pipeline before the user handler.
#[derive(Clone)]
pub struct WrappedHandler {
    route: Arc<RouteDefinition>,
    singleton: Arc<Singleton>,
}

impl WrappedHandler {
    /// The route's method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.route.method
    }

    /// The route's full path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.route.path
    }

    /// The route definition.
    #[must_use]
    pub fn definition(&self) -> &RouteDefinition {
        &self.route
    }

    /// Run the pipeline for one inbound request.
    ///
    /// # Errors
    ///
    /// Propagates any derive, validation, resolve or handler failure.
    pub async fn call(&self, incoming: IncomingRequest) -> Result<Outcome, PipelineError> {
        pipeline::run(
            &self.singleton,
            self.route.schema.as_ref(),
            &self.route.handler,
            incoming,
        )
        .await
    }
}

impl fmt::Debug for WrappedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedHandler")
            .field("method", &self.route.method)
            .field("path", &self.route.path)
            .finish_non_exhaustive()
    }
}

/// Every route of a built app.
#[derive(Debug, Clone)]
pub struct Routes {
    handlers: Vec<WrappedHandler>,
    singleton: Arc<Singleton>,
    tree: RouteTree,
}

impl Routes {
    /// All wrapped handlers, in registration order.
    #[must_use]
    pub fn handlers(&self) -> &[WrappedHandler] {
        &self.handlers
    }

    /// Find the handler registered for exactly `method` and `path`.
    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> Option<&WrappedHandler> {
        self.handlers
            .iter()
            .find(|h| h.method() == method && h.path() == path)
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Store {
        self.singleton.store()
    }

    /// Tree of every route.
    #[must_use]
    pub const fn tree(&self) -> &RouteTree {
        &self.tree
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether there are no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl IntoIterator for Routes {
    type Item = WrappedHandler;
    type IntoIter = std::vec::IntoIter<WrappedHandler>;

    fn into_iter(self) -> Self::IntoIter {
        self.handlers.into_iter()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}

fn path_shape(path: &str) -> Result<String, RegistryError> {
    if path.contains(['?', '#']) || path.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidPath {
            path: path.to_string(),
            reason: "paths cannot contain whitespace, '?' or '#'",
        });
    }
    let mut shape = Vec::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == ":" {
            return Err(RegistryError::InvalidPath {
                path: path.to_string(),
                reason: "parameter segments need a name",
            });
        }
        shape.push(if segment.starts_with(':') { ":" } else { segment });
    }
    Ok(format!("/{}", shape.join("/")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::reply::Written;
    use http::Uri;
    use serde_json::json;

    async fn ok() -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_prefix_applies_to_routes() {
        let app = App::with_prefix("/api/")
            .get("/", |_ctx| ok())
            .get("users", |_ctx| ok());

        let paths: Vec<_> = app.routes().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/api", "/api/users"]);
    }

    #[test]
    fn test_mount_merges_store_with_host_winning() {
        let host = App::new().state("counter", 1);
        let host_store = host.store().clone();
        let plugin = App::new()
            .state("counter", 100)
            .state("sessions", json!({}));

        let app = host.mount(plugin);

        assert!(app.store().ptr_eq(&host_store));
        assert_eq!(app.store().get("counter"), Some(json!(1)));
        assert_eq!(app.store().get("sessions"), Some(json!({})));
    }

    #[test]
    fn test_mount_prefixes_plugin_routes() {
        let plugin = App::with_prefix("/auth").post("/login", |_ctx| ok());
        let app = App::with_prefix("/v1").mount(plugin);

        assert_eq!(app.routes()[0].path, "/v1/auth/login");
        assert!(app.route_tree().matches("post", &["v1", "auth", "login"]));
    }

    #[test]
    fn test_route_tree_unions_host_and_plugin_methods() {
        let plugin = App::new().post("/users", |_ctx| ok()).get("/sessions", |_ctx| ok());
        let app = App::new().get("/users", |_ctx| ok()).mount(plugin);

        let tree = app.route_tree();
        assert!(tree.matches("get", &["users"]));
        assert!(tree.matches("post", &["users"]));
        assert!(tree.matches("get", &["sessions"]));
        assert!(!tree.matches("delete", &["users"]));
    }

    #[test]
    fn test_named_plugin_mounts_once() {
        let plugin = || App::new().named("auth").derive(|_ctx| async { anyhow::Ok(Value::Null) });
        let app = App::new().mount(plugin()).mount(plugin());
        assert_eq!(app.singleton.derive_count(), 1);
    }

    #[test]
    fn test_conflicting_routes_fail_build() {
        let app = App::new()
            .get("/users/:id", |_ctx| ok())
            .get("/users/:name", |_ctx| ok());

        let err = app.build().unwrap_err();
        assert!(matches!(err, RegistryError::RouteConflict { .. }));
    }

    #[test]
    fn test_same_path_different_methods_is_fine() {
        let routes = App::new()
            .get("/users", |_ctx| ok())
            .post("/users", |_ctx| ok())
            .build()
            .unwrap();
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn test_mounted_conflict_fails_build() {
        let plugin = App::new().get("/health", |_ctx| ok());
        let app = App::new().get("/health", |_ctx| ok()).mount(plugin);
        assert!(app.build().is_err());
    }

    #[test]
    fn test_invalid_path_fails_build() {
        let err = App::new().get("/users/:", |_ctx| ok()).build().unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_plugin_derive_sees_host_derive() {
        let plugin = App::new().derive(|ctx: Arc<Context>| async move {
            let base = ctx.get("base").and_then(Value::as_i64).unwrap_or(0);
            anyhow::Ok(json!({ "doubled": base * 2 }))
        });
        let routes = App::new()
            .derive(|_ctx| async { anyhow::Ok(json!({ "base": 21 })) })
            .mount(plugin)
            .get("/answer", |ctx: Arc<Context>| async move {
                anyhow::Ok(ctx.get("doubled").cloned().unwrap_or(Value::Null))
            })
            .build()
            .unwrap();

        let handler = routes.find(&Method::GET, "/answer").unwrap();
        let outcome = handler
            .call(IncomingRequest::new(Method::GET, Uri::from_static("/answer")))
            .await
            .unwrap();

        assert!(matches!(outcome.body, Written::Text(ref text) if text == "42"));
    }
}
