pub mod browser;
pub mod config;
pub mod registration;

#[cfg(target_arch = "wasm32")]
pub mod app;
#[cfg(target_arch = "wasm32")]
pub mod web;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Failed to parse url: {0}")]
    Url(#[from] url::ParseError),
    #[error("Unknown deployment mode: {0}")]
    Mode(String),
    #[error("Service worker registration failed: {0}")]
    Registration(String),
    #[error("Network request failed: {0}")]
    Network(String),
    #[error("Failed to unregister service worker: {0}")]
    Unregister(String),
    #[error("Failed to post message to service worker: {0}")]
    Message(String),
    #[error("Browser API unavailable: {0}")]
    Unavailable(String),
    #[error("No element with id `{0}` to mount the app into")]
    MissingMount(String),
}

pub type Result<T> = std::result::Result<T, Error>;
