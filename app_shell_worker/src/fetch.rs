use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: Url,
    pub method: String,
    pub mode: RequestMode,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Request {
            url,
            method: "GET".to_string(),
            mode: RequestMode::default(),
        }
    }

    pub fn navigate(url: Url) -> Self {
        Request {
            mode: RequestMode::Navigate,
            ..Request::get(url)
        }
    }

    /// Caches are keyed by url, without the fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Response {
            status,
            headers: vec![],
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Runtime caches only keep complete responses. Opaque cross-origin
    /// responses (status 0) can't be rebuilt from their parts, so they are
    /// never stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }
}

#[async_trait(?Send)]
pub trait Network {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
