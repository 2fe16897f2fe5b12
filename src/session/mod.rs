pub mod client;
pub mod identity;

use thiserror::Error;

// Re-export common types
pub use client::Session;

/// Failures while preparing the HTTP session; all of them abort a run before any fetch
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no identities configured")]
    NoIdentities,

    #[error("identity not found: {0}")]
    UnknownIdentity(String),

    #[error("invalid site origin '{0}': {1}")]
    InvalidOrigin(String, #[source] url::ParseError),

    #[error("invalid proxy '{0}': {1}")]
    InvalidProxy(String, #[source] reqwest::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}
