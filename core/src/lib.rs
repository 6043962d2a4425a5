//! # Tether Core
//!
//! Server-side half of the Tether toolkit: per-request context composition
//! and route registration.
//!
//! ## Concepts
//!
//! - **Store**: shared, mutable, process-lifetime key/value state
//! - **Decorator**: setup-time value copied onto every request context
//! - **Derive**: async function run before validation; its output is merged
//!   onto the context
//! - **Resolve**: async function run after validation, same merge rules
//! - **Schema**: opaque validation capability applied to request parts
//! - **Mounting**: composing one [`App`] into another
//!
//! ## Request Flow
//!
//! ```text
//! transport ──(request, params)──► WrappedHandler
//!     seed store ─► decorate ─► derive* ─► validate ─► resolve* ─► handler
//!                                                                    │
//! transport ◄──────────────── Outcome (set + serialized reply) ◄─────┘
//! ```
//!
//! Matching an inbound request to a route is the transport's job; this crate
//! only builds and holds the route definitions.

pub mod app;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod reply;
pub mod schema;
pub mod store;
pub mod tree;

pub use app::{App, RouteDefinition, Routes, WrappedHandler};
pub use context::{
    Context, IncomingRequest, RequestInfo, ResponseSet, SetHandle, UploadedFile,
};
pub use error::{PipelineError, RegistryError, ValidationError};
pub use reply::{Outcome, Reply, Written};
pub use schema::{RequestPart, RouteSchema, Schema, Typed};
pub use store::Store;
pub use tree::RouteTree;
