//! # Tether Client
//!
//! Calls a Tether server by walking its route layout: segments are
//! accumulated on an immutable [`PathBuilder`], a verb terminates the chain,
//! and every call resolves to an [`Envelope`].
//!
//! ## Call Flow
//!
//! ```text
//! PathBuilder ─► Caller::send(body, options)
//!     url + query ─► headers (base < config < call) ─► body encoding
//!         ─► on_request hook ─► Fetch ─► on_response hook ─► parse ─► Envelope
//! ```
//!
//! Non-2xx responses are not errors: they are reported through
//! [`Envelope::error`]. [`ClientError`] is reserved for calls that produced
//! no usable response.

pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod path;
pub mod payload;

pub use config::{
    ClientConfig, FetchOptions, HeaderProvider, HeaderSource, RequestHook, RequestOverride,
    ResponseHook, normalize_domain,
};
pub use envelope::{Data, Envelope, ErrorValue, FormEntry, FormEntryValue, ResponseHead};
pub use error::ClientError;
pub use executor::{CallOptions, execute};
pub use fetch::{Fetch, FetchResponse, OutboundRequest, RequestBody, RequestInit, ReqwestFetcher, ResponseBody};
pub use path::{Caller, Client, Member, PathBuilder, Verb};
pub use payload::{Attachment, FormPart, FormValue, Payload};
