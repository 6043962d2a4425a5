//! The per-request context pipeline.
//!
//! Stages run strictly in order and each may suspend before the next one
//! starts:
//!
//! 1. **Seed** - attach the shared store handle
//! 2. **Decorate** - copy every decorator onto the context
//! 3. **Derive** - run each derive function, merging its output
//! 4. **Validate** - parse request parts with the route schema, if any
//! 5. **Resolve** - run each resolve function, merging its output
//! 6. **Invoke** - call the route handler
//! 7. **Serialize** - turn the handler's [`Reply`] into a [`Written`] body
//!
//! Any rejection aborts the pipeline and is returned to the transport.

use crate::context::{Context, IncomingRequest};
use crate::error::PipelineError;
use crate::reply::{Outcome, Reply, Written};
use crate::schema::RouteSchema;
use crate::store::Store;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// A derive or resolve function.
///
/// Returning an object merges its keys onto the context; any other value
/// (typically `Value::Null`) contributes nothing.
pub type ContextFn =
    Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A route handler.
pub type HandlerFn =
    Arc<dyn Fn(Arc<Context>) -> BoxFuture<'static, anyhow::Result<Reply>> + Send + Sync>;

/// Box a derive/resolve closure into a [`ContextFn`].
pub fn context_fn<F, Fut>(f: F) -> ContextFn
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Box a handler closure into a [`HandlerFn`].
pub fn handler_fn<F, Fut, R>(f: F) -> HandlerFn
where
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<Reply>,
{
    Arc::new(move |ctx| {
        let fut = f(ctx);
        Box::pin(async move { fut.await.map(Into::into) })
    })
}

/// Per-server state shared by every request: store, decorators and the
/// ordered derive/resolve lists.
#[derive(Clone, Default)]
pub struct Singleton {
    pub(crate) store: Store,
    pub(crate) decorator: Map<String, Value>,
    pub(crate) derive: Vec<ContextFn>,
    pub(crate) resolve: Vec<ContextFn>,
}

impl Singleton {
    /// The shared store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Registered decorators.
    #[must_use]
    pub const fn decorators(&self) -> &Map<String, Value> {
        &self.decorator
    }

    /// Number of derive functions.
    #[must_use]
    pub fn derive_count(&self) -> usize {
        self.derive.len()
    }

    /// Number of resolve functions.
    #[must_use]
    pub fn resolve_count(&self) -> usize {
        self.resolve.len()
    }
}

impl std::fmt::Debug for Singleton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Singleton")
            .field("store", &self.store)
            .field("decorator", &self.decorator)
            .field("derive", &self.derive.len())
            .field("resolve", &self.resolve.len())
            .finish()
    }
}

/// Run one request through every stage and serialize the handler's reply.
///
/// # Errors
///
/// Returns the first derive, validation, resolve or handler failure. No
/// stage is retried.
pub async fn run(
    singleton: &Singleton,
    schema: Option<&RouteSchema>,
    handler: &HandlerFn,
    incoming: IncomingRequest,
) -> Result<Outcome, PipelineError> {
    let mut ctx = Context::seed(incoming, singleton.store.clone());
    let set = ctx.set.clone();

    ctx.merge(singleton.decorator.clone());
    let mut ctx = Arc::new(ctx);

    for (index, derive) in singleton.derive.iter().enumerate() {
        tracing::trace!(index, "running derive");
        let output = derive(Arc::clone(&ctx))
            .await
            .map_err(|source| PipelineError::Derive { index, source })?;
        ctx = merge_output(ctx, output);
    }

    if let Some(schema) = schema {
        tracing::trace!("validating request");
        let mut next = Arc::unwrap_or_clone(ctx);
        schema.apply(&mut next)?;
        ctx = Arc::new(next);
    }

    for (index, resolve) in singleton.resolve.iter().enumerate() {
        tracing::trace!(index, "running resolve");
        let output = resolve(Arc::clone(&ctx))
            .await
            .map_err(|source| PipelineError::Resolve { index, source })?;
        ctx = merge_output(ctx, output);
    }

    let reply = handler(ctx).await.map_err(PipelineError::Handler)?;

    Ok(Outcome {
        set: set.snapshot(),
        body: Written::from_reply(reply),
    })
}

fn merge_output(ctx: Arc<Context>, output: Value) -> Arc<Context> {
    match output {
        Value::Object(map) => {
            let mut next = Arc::unwrap_or_clone(ctx);
            next.merge(map);
            Arc::new(next)
        }
        _ => ctx,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::schema::RequestPart;
    use http::{Method, StatusCode, Uri};
    use serde_json::json;
    use std::sync::Mutex;

    fn request() -> IncomingRequest {
        IncomingRequest::new(Method::GET, Uri::from_static("/"))
    }

    fn echo_values() -> HandlerFn {
        handler_fn(|ctx: Arc<Context>| async move { anyhow::Ok(Value::Object(ctx.values().clone())) })
    }

    async fn run_to_json(singleton: &Singleton, handler: &HandlerFn) -> Value {
        let outcome = run(singleton, None, handler, request()).await.unwrap();
        match outcome.body {
            Written::Json(bytes) => serde_json::from_slice(&bytes).unwrap(),
            other => panic!("expected json, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_later_derive_wins_and_sees_earlier_output() {
        let mut singleton = Singleton::default();
        singleton.derive.push(context_fn(|_ctx| async {
            anyhow::Ok(json!({"user": "ann", "role": "reader"}))
        }));
        singleton.derive.push(context_fn(|ctx: Arc<Context>| async move {
            let seen = ctx.get("user").cloned().unwrap_or(Value::Null);
            anyhow::Ok(json!({"role": "admin", "seen": seen}))
        }));

        let values = run_to_json(&singleton, &echo_values()).await;
        assert_eq!(values, json!({"user": "ann", "role": "admin", "seen": "ann"}));
    }

    #[tokio::test]
    async fn test_resolve_sees_all_derives_and_decorators() {
        let mut singleton = Singleton::default();
        singleton.decorator.insert("version".into(), json!("1.0"));
        singleton.resolve.push(context_fn(|ctx: Arc<Context>| async move {
            anyhow::Ok(json!({"both": [ctx.get("version"), ctx.get("derived")]}))
        }));
        // Registered after the resolve, but derives always run first.
        singleton
            .derive
            .push(context_fn(|_ctx| async { anyhow::Ok(json!({"derived": true})) }));

        let values = run_to_json(&singleton, &echo_values()).await;
        assert_eq!(values["both"], json!(["1.0", true]));
    }

    #[tokio::test]
    async fn test_non_object_output_is_ignored() {
        let mut singleton = Singleton::default();
        singleton
            .derive
            .push(context_fn(|_ctx| async { anyhow::Ok(json!("ignored")) }));
        singleton
            .derive
            .push(context_fn(|_ctx| async { anyhow::Ok(Value::Null) }));

        let values = run_to_json(&singleton, &echo_values()).await;
        assert_eq!(values, json!({}));
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut singleton = Singleton::default();
        for (stage, list) in [("derive", 0), ("resolve", 1)] {
            for i in 0..2 {
                let order = Arc::clone(&order);
                let f = context_fn(move |_ctx| {
                    let order = Arc::clone(&order);
                    async move {
                        order.lock().unwrap().push(format!("{stage}{i}"));
                        anyhow::Ok(Value::Null)
                    }
                });
                if list == 0 {
                    singleton.derive.push(f);
                } else {
                    singleton.resolve.push(f);
                }
            }
        }
        let validate_order = Arc::clone(&order);
        let schema = RouteSchema::new().body(move |_part: RequestPart, raw: &Value| -> Result<Value, ValidationError> {
            validate_order.lock().unwrap().push("validate".to_string());
            Ok(raw.clone())
        });

        run(&singleton, Some(&schema), &echo_values(), request())
            .await
            .unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            ["derive0", "derive1", "validate", "resolve0", "resolve1"]
        );
    }

    #[tokio::test]
    async fn test_derive_rejection_stops_pipeline() {
        let mut singleton = Singleton::default();
        singleton
            .derive
            .push(context_fn(|_ctx| async { Err::<Value, _>(anyhow::anyhow!("no session")) }));
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let handler = handler_fn(move |_ctx| {
            let flag = Arc::clone(&flag);
            async move {
                *flag.lock().unwrap() = true;
                anyhow::Ok(())
            }
        });

        let err = run(&singleton, None, &handler, request()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Derive { index: 0, .. }));
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn test_validation_failure_is_reported() {
        let schema = RouteSchema::new().body(|part: RequestPart, _raw: &Value| -> Result<Value, ValidationError> {
            Err(ValidationError::new(part, "expected an object"))
        });
        let err = run(&Singleton::default(), Some(&schema), &echo_values(), request())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_set_written_by_derive_reaches_outcome() {
        let mut singleton = Singleton::default();
        singleton.derive.push(context_fn(|ctx: Arc<Context>| async move {
            ctx.set.status(StatusCode::ACCEPTED);
            anyhow::Ok(Value::Null)
        }));

        let outcome = run(&singleton, None, &handler_fn(|_ctx| async { anyhow::Ok(()) }), request())
            .await
            .unwrap();
        assert_eq!(outcome.set.status, Some(StatusCode::ACCEPTED));
        assert!(matches!(outcome.body, Written::Nothing));
    }

    #[tokio::test]
    async fn test_store_is_shared_not_copied() {
        let singleton = Singleton::default();
        let handler = handler_fn(|ctx: Arc<Context>| async move {
            ctx.store.set("touched", true);
            anyhow::Ok(())
        });

        run(&singleton, None, &handler, request()).await.unwrap();
        assert_eq!(singleton.store.get("touched"), Some(json!(true)));
    }
}
