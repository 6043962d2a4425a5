//! Todo demo: serves a small Tether app and drives it with the path client.
//!
//! The server keeps todos in the shared store, mounts an `auth` plugin that
//! derives the caller from a header, and binds an ephemeral local port. The
//! client then walks `todos`, `todos/:id` and `auth/whoami` by path.

use axum::http::StatusCode;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tether_client::{CallOptions, Client, Data, Envelope, Payload};
use tether_core::{App, Context};
use tracing::info;

fn auth_plugin() -> App {
    App::with_prefix("/auth")
        .named("auth")
        .derive(|ctx: Arc<Context>| async move {
            let user = ctx.header("x-user").unwrap_or("guest").to_string();
            anyhow::Ok(json!({ "user": user }))
        })
        .get("/whoami", |ctx: Arc<Context>| async move {
            anyhow::Ok(json!({ "user": ctx.get("user") }))
        })
}

fn todo_app() -> App {
    App::new()
        .state("todos", json!({}))
        .state("next_id", 1)
        .decorate("service", "todo-demo")
        .mount(auth_plugin())
        .get("/todos", |ctx: Arc<Context>| async move {
            let todos = ctx.store.get("todos").unwrap_or_else(|| json!({}));
            let list: Vec<Value> = todos
                .as_object()
                .map(|todos| todos.values().cloned().collect())
                .unwrap_or_default();
            anyhow::Ok(json!({ "service": ctx.get("service"), "todos": list }))
        })
        .post("/todos", |ctx: Arc<Context>| async move {
            let Some(title) = ctx.body.get("title").and_then(Value::as_str) else {
                ctx.set.status(StatusCode::BAD_REQUEST);
                return anyhow::Ok(json!({ "error": "title is required" }));
            };
            let id = ctx
                .store
                .update("next_id", |n| json!(n.and_then(Value::as_i64).unwrap_or(1) + 1))
                .as_i64()
                .unwrap_or(2)
                - 1;
            let todo = json!({ "id": id, "title": title, "completed": false });
            ctx.store.update("todos", |todos| {
                let mut todos = todos.and_then(Value::as_object).cloned().unwrap_or_default();
                todos.insert(id.to_string(), todo.clone());
                Value::Object(todos)
            });
            ctx.set.status(StatusCode::CREATED);
            anyhow::Ok(todo)
        })
        .get("/todos/:id", |ctx: Arc<Context>| async move {
            let id = ctx.param("id").unwrap_or_default();
            let todo = ctx
                .store
                .get("todos")
                .and_then(|todos| todos.get(id).cloned());
            match todo {
                Some(todo) => anyhow::Ok(todo),
                None => {
                    ctx.set.status(StatusCode::NOT_FOUND);
                    anyhow::Ok(json!({ "error": format!("todo {id} not found") }))
                }
            }
        })
        .delete("/todos/:id", |ctx: Arc<Context>| async move {
            let id = ctx.param("id").unwrap_or_default().to_string();
            let mut removed = Value::Null;
            ctx.store.update("todos", |todos| {
                let mut todos: Map<String, Value> =
                    todos.and_then(Value::as_object).cloned().unwrap_or_default();
                removed = todos.remove(&id).unwrap_or(Value::Null);
                Value::Object(todos)
            });
            anyhow::Ok(json!({ "removed": removed }))
        })
}

fn describe(envelope: &Envelope) -> String {
    match &envelope.result {
        Ok(data) => data
            .to_value()
            .map_or_else(|| "<binary>".to_string(), |v| v.to_string()),
        Err(error) => format!(
            "error {}: {}",
            error.status,
            error.value.to_value().unwrap_or(Value::Null)
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tether_web::init_tracing("info");
    println!("=== Tether Todo Demo ===\n");

    let router = tether_web::router(todo_app())?;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    info!(%addr, "Todo server listening");
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    let client = Client::new(&addr.to_string());
    let todos = client.path().segment("todos");

    println!("Creating todos...");
    for title in ["Buy milk", "Write documentation"] {
        let created = todos
            .post(Payload::from(json!({ "title": title })), CallOptions::new())
            .await?;
        println!("  {} {}", created.status, describe(&created));
    }

    let listed = todos.get(CallOptions::new()).await?;
    println!("\nListing: {}", describe(&listed));

    let first = todos.param(1).get(CallOptions::new()).await?;
    println!("\nTodo 1: {}", describe(&first));

    let missing = todos.param(99).get(CallOptions::new()).await?;
    println!("Todo 99: {}", describe(&missing));

    let deleted = todos
        .param(2)
        .delete(Payload::Null, CallOptions::new())
        .await?;
    println!("\nDeleted: {}", describe(&deleted));

    let who = client
        .path()
        .segment("auth")
        .segment("whoami")
        .get(CallOptions::new().with_header("x-user", "ann".parse()?))
        .await?;
    if let Ok(Data::Json(body)) = &who.result {
        println!("\nAuthenticated as {}", body["user"]);
    }

    server.abort();
    println!("\n=== Demo Complete ===");
    Ok(())
}
