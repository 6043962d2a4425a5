//! Axum transport for Tether apps.
//!
//! `tether-core` builds routes and runs the context pipeline but never
//! matches or parses HTTP. This crate supplies that shell:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Transport (axum)                │  ← matching, body/query decoding
//! │  - Request → IncomingRequest            │  ← TraceLayer spans
//! │  - Outcome / WebError → Response        │
//! ├─────────────────────────────────────────┤
//! │         tether-core                     │
//! │  - store, decorate, derive, validate,   │
//! │    resolve, handler, serialize          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tether_core::App;
//! use tether_web::{ServerConfig, init_tracing, serve};
//!
//! # async fn run() -> Result<(), tether_web::ServeError> {
//! let app = App::new().get("/", |_ctx| async { anyhow::Ok("hello") });
//!
//! let config = ServerConfig::from_env();
//! init_tracing(&config.log_level);
//! serve(app, &config).await
//! # }
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{RouterError, ServeError, WebError};
pub use router::{MAX_BODY_SIZE, into_router, router};
pub use server::{init_tracing, serve};

/// Result type alias for transport operations.
pub type WebResult<T> = Result<T, WebError>;
