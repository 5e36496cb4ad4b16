//! In-memory stand-ins for the browser's caches, network and worker scope.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;

use crate::cache::{Cache, CacheStorage};
use crate::fetch::{Network, Request, Response};
use crate::worker::WorkerScope;
use crate::{Error, Result};

type Entries = Rc<RefCell<Vec<(String, Response)>>>;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    caches: Rc<RefCell<HashMap<String, Entries>>>,
    broken_deletes: Rc<Cell<bool>>,
}

impl MemoryStorage {
    pub fn cache(&self, name: &str) -> MemoryCache {
        let entries = self
            .caches
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .clone();
        MemoryCache {
            entries,
            broken_deletes: self.broken_deletes.clone(),
        }
    }

    /// Every entry delete from now on fails, as a quota or storage error would.
    pub fn fail_deletes(&self) {
        self.broken_deletes.set(true);
    }
}

#[async_trait(?Send)]
impl CacheStorage for MemoryStorage {
    type Cache = MemoryCache;

    async fn open(&self, name: &str) -> Result<MemoryCache> {
        Ok(self.cache(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.borrow_mut().remove(name).is_some())
    }
}

#[derive(Clone)]
pub struct MemoryCache {
    entries: Entries,
    broken_deletes: Rc<Cell<bool>>,
}

impl MemoryCache {
    pub fn keys_now(&self) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .borrow()
            .iter()
            .find(|(stored, _)| stored == key)
            .map(|(_, response)| response.body.to_vec())
    }

    pub fn insert(&self, key: &str, response: Response) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(stored, _)| stored != key);
        entries.push((key.to_string(), response));
    }
}

#[async_trait(?Send)]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Response>> {
        Ok(self
            .entries
            .borrow()
            .iter()
            .find(|(stored, _)| stored == key)
            .map(|(_, response)| response.clone()))
    }

    async fn put(&self, key: &str, response: Response) -> Result<()> {
        self.insert(key, response);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        if self.broken_deletes.get() {
            return Err(Error::Cache(format!("cannot delete {key}")));
        }
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(stored, _)| stored != key);
        Ok(entries.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.keys_now())
    }
}

#[derive(Default)]
pub struct MockNetwork {
    responses: RefCell<HashMap<String, Response>>,
    fetched: RefCell<Vec<String>>,
}

impl MockNetwork {
    pub fn serve(&self, url: &str, response: Response) {
        self.responses.borrow_mut().insert(url.to_string(), response);
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched.borrow().iter().filter(|seen| *seen == url).count()
    }

    pub fn total_fetches(&self) -> usize {
        self.fetched.borrow().len()
    }
}

#[async_trait(?Send)]
impl Network for MockNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = request.url.to_string();
        self.fetched.borrow_mut().push(url.clone());
        self.responses
            .borrow()
            .get(&url)
            .cloned()
            .ok_or_else(|| Error::Network(format!("offline: {url}")))
    }
}

/// Tracks what the worker asked the platform to do.
#[derive(Default)]
pub struct MockScope {
    pub skipped_waiting: Cell<usize>,
    pub claimed: Cell<usize>,
}

#[async_trait(?Send)]
impl WorkerScope for MockScope {
    async fn skip_waiting(&self) -> Result<()> {
        self.skipped_waiting.set(self.skipped_waiting.get() + 1);
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        self.claimed.set(self.claimed.get() + 1);
        Ok(())
    }
}
