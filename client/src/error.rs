//! Error types for the Tether client

use thiserror::Error;

/// Errors that escape a client call.
///
/// A non-2xx response is *not* an error here: it is reported through the
/// [`Envelope`](crate::Envelope).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing `TETHER_DOMAIN` environment variable
    #[error("Missing TETHER_DOMAIN environment variable")]
    MissingDomain,

    /// The network call itself failed (connection refused, DNS, ...)
    #[error("Request failed: {0}")]
    Transport(String),

    /// The normalized domain plus path is not a valid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A header name or value could not be represented
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The client was given a route tree and the call is not in it
    #[error("Unknown route: {verb} {path}")]
    UnknownRoute {
        /// Verb of the rejected call
        verb: String,
        /// Path of the rejected call
        path: String,
    },

    /// Query or body could not be encoded
    #[error("Request encoding failed: {0}")]
    Encode(String),

    /// Response body could not be decoded for its content type
    #[error("Response parsing failed: {0}")]
    Decode(String),

    /// A pre-request or post-response hook failed
    #[error("Hook failed: {0}")]
    Hook(String),
}
