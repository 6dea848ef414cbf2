//! Remote data access for the marketplace backend.
//!
//! The feed never talks to HTTP directly. It depends on one capability,
//! [`ListingSource::fetch_page`], so tests can substitute an in-memory fake and
//! the binary can inject the PostgREST-backed [`RestClient`].
//!
//! - [`rest`] - PostgREST client: page fetches, listing detail, retry/timeout policy
//! - [`auth`] - Password sign-in against the backend's auth endpoint

mod auth;
mod rest;

pub use auth::Session;
pub use rest::{RestClient, RetryPolicy};

use crate::listing::{ListingFilter, ListingSummary};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the remote backend.
///
/// All variants are recoverable from the application's point of view: the feed
/// keeps its previous state and the user may retry.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Non-2xx response; `message` is the backend's error text when it sent one
    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    /// Body could not be decoded into listing rows
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Insecure endpoint: HTTPS required (except localhost for testing)")]
    InsecureEndpoint,
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl RemoteError {
    /// Returns true if the transport should retry this request.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Timeout(_) | RemoteError::Network(_) => true,
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
            RemoteError::RateLimited(_)
            | RemoteError::ResponseTooLarge(_)
            | RemoteError::Decode(_)
            | RemoteError::InsecureEndpoint
            | RemoteError::InvalidEndpoint(_)
            | RemoteError::Auth(_) => false,
        }
    }
}

/// A remote collection of listings, sorted by `created_at` descending.
///
/// Implementations return at most `limit` rows starting at `offset`. Returning
/// fewer than `limit` rows signals the end of the collection.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
        filter: &ListingFilter,
    ) -> Result<Vec<ListingSummary>, RemoteError>;
}
