//! Entry-count bound for runtime caches.
//!
//! Keeps a least-recently-used index of the urls in one cache. Writes and
//! cache hits both count as a use. The index lives in worker memory, so a
//! freshly started worker seeds it from the cache's own key order before the
//! first use.

use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;

use lru::LruCache;

pub struct CacheExpiration {
    index: RefCell<LruCache<String, ()>>,
    hydrated: Cell<bool>,
}

impl CacheExpiration {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        CacheExpiration {
            index: RefCell::new(LruCache::new(capacity)),
            hydrated: Cell::new(false),
        }
    }

    pub fn max_entries(&self) -> usize {
        self.index.borrow().cap().get()
    }

    pub fn len(&self) -> usize {
        self.index.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.borrow().is_empty()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated.get()
    }

    /// Marks the index as seeded. Only the first caller gets `true` and must
    /// follow up with [`CacheExpiration::hydrate`]; claim before reading the
    /// cache's keys so concurrent first uses seed it once.
    pub fn claim_hydration(&self) -> bool {
        !self.hydrated.replace(true)
    }

    /// Seeds the index with keys already in the cache, oldest first.
    /// Returns the keys that no longer fit.
    pub fn hydrate(&self, keys: Vec<String>) -> Vec<String> {
        let mut evicted = vec![];
        let mut index = self.index.borrow_mut();
        for key in keys {
            if index.contains(&key) {
                continue;
            }
            if let Some((old, ())) = index.push(key, ()) {
                evicted.push(old);
            }
        }
        evicted
    }

    /// Records a use of `key`. Returns the entry pushed out, if the index was full.
    pub fn touch(&self, key: &str) -> Option<String> {
        let mut index = self.index.borrow_mut();
        if index.get(key).is_some() {
            return None;
        }
        index.push(key.to_string(), ()).map(|(evicted, ())| evicted)
    }

    pub fn forget(&self, key: &str) {
        self.index.borrow_mut().pop(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(n: usize) -> String {
        format!("https://app.example.com/img/{n}.png")
    }

    #[test]
    fn new_entry_past_the_bound_evicts_the_oldest() {
        let expiration = CacheExpiration::new(50);
        for n in 0..50 {
            assert_eq!(expiration.touch(&url(n)), None);
        }
        assert_eq!(expiration.len(), 50);

        assert_eq!(expiration.touch(&url(50)), Some(url(0)));
        assert_eq!(expiration.len(), 50);
        assert_eq!(expiration.touch(&url(51)), Some(url(1)));
    }

    #[test]
    fn use_refreshes_an_entry() {
        let expiration = CacheExpiration::new(3);
        expiration.touch(&url(0));
        expiration.touch(&url(1));
        expiration.touch(&url(2));

        assert_eq!(expiration.touch(&url(0)), None);
        assert_eq!(expiration.touch(&url(3)), Some(url(1)));
    }

    #[test]
    fn hydrate_trims_an_oversized_cache() {
        let expiration = CacheExpiration::new(2);
        assert!(!expiration.is_hydrated());

        assert!(expiration.claim_hydration());
        let evicted = expiration.hydrate(vec![url(0), url(1), url(2), url(1)]);
        assert!(expiration.is_hydrated());
        assert_eq!(evicted, vec![url(0)]);
        assert_eq!(expiration.len(), 2);
        assert_eq!(expiration.touch(&url(3)), Some(url(1)));
    }

    #[test]
    fn hydration_is_claimed_once() {
        let expiration = CacheExpiration::new(2);
        assert!(expiration.claim_hydration());
        assert!(expiration.is_hydrated());
        assert!(!expiration.claim_hydration());
    }

    #[test]
    fn zero_bound_keeps_one_entry() {
        let expiration = CacheExpiration::new(0);
        assert_eq!(expiration.max_entries(), 1);
        expiration.touch(&url(0));
        assert_eq!(expiration.touch(&url(1)), Some(url(0)));
        expiration.forget(&url(1));
        assert!(expiration.is_empty());
    }
}
