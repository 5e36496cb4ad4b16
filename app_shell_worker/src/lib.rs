//! The service worker: precaching, app-shell routing and runtime caching.
//!
//! Everything here runs against the [`cache::CacheStorage`] and
//! [`fetch::Network`] traits; [`scope`] wires them to the service worker
//! global scope when built for wasm.

pub mod cache;
pub mod expiration;
pub mod fetch;
pub mod precache;
pub mod routing;
pub mod strategies;
pub mod worker;

#[cfg(target_arch = "wasm32")]
pub mod scope;

#[cfg(test)]
mod testing;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Bad response while precaching {url}: status {status}")]
    BadPrecacheResponse { url: String, status: u16 },
    #[error("Conflicting precache revisions for {url}: {first:?} and {second:?}")]
    ConflictingEntries {
        url: String,
        first: String,
        second: String,
    },
    #[error("{0} is not in the precache")]
    NotPrecached(String),
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Failed to do some JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Worker scope error: {0}")]
    Scope(String),
}

pub type Result<T> = std::result::Result<T, Error>;
