use async_trait::async_trait;

use crate::fetch::Response;
use crate::Result;

/// One named cache, keyed by request url.
#[async_trait(?Send)]
pub trait Cache {
    async fn get(&self, key: &str) -> Result<Option<Response>>;
    /// Replaces any previous entry; the key moves to the end of [`Cache::keys`].
    async fn put(&self, key: &str, response: Response) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Keys in insertion order, oldest first.
    async fn keys(&self) -> Result<Vec<String>>;
}

#[async_trait(?Send)]
pub trait CacheStorage {
    type Cache: Cache + 'static;

    async fn open(&self, name: &str) -> Result<Self::Cache>;
    async fn delete(&self, name: &str) -> Result<bool>;
}
