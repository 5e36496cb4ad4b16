//! Build-time precache: every file listed in the manifest is fetched while
//! the worker installs and served cache-first afterwards.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use app_shell_model::PrecacheEntry;
use async_trait::async_trait;
use log::{debug, info, warn};
use url::Url;

use crate::cache::{Cache, CacheStorage};
use crate::fetch::{Network, Request, Response};
use crate::strategies::{Handled, Handler};
use crate::{Error, Result};

pub const PRECACHE_PREFIX: &str = "app-shell-precache-v2";
/// Query parameter carrying the manifest revision inside a cache key.
pub const REVISION_PARAM: &str = "__precache_revision";

fn is_ignored_param(name: &str) -> bool {
    name.starts_with("utm_") || name == "fbclid"
}

#[derive(Debug, Clone)]
struct Precached {
    url: Url,
    cache_key: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub updated: Vec<String>,
    pub not_updated: Vec<String>,
}

pub struct Precache<S, N> {
    storage: Rc<S>,
    network: Rc<N>,
    scope: Url,
    cache_name: String,
    entries: Vec<Precached>,
    keys_by_url: HashMap<String, String>,
}

impl<S, N> Precache<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    pub fn new(storage: Rc<S>, network: Rc<N>, scope: &Url, manifest: &[PrecacheEntry]) -> Result<Self> {
        let mut entries = vec![];
        let mut keys_by_url = HashMap::<String, String>::new();
        for entry in manifest {
            let mut url = scope.join(&entry.url)?;
            url.set_fragment(None);
            let cache_key = match &entry.revision {
                Some(revision) => {
                    let mut keyed = url.clone();
                    keyed.query_pairs_mut().append_pair(REVISION_PARAM, revision);
                    keyed.to_string()
                }
                None => url.to_string(),
            };
            match keys_by_url.get(url.as_str()) {
                Some(existing) if *existing != cache_key => {
                    return Err(Error::ConflictingEntries {
                        url: url.to_string(),
                        first: existing.clone(),
                        second: cache_key,
                    });
                }
                Some(_) => continue,
                None => {
                    keys_by_url.insert(url.to_string(), cache_key.clone());
                    entries.push(Precached { url, cache_key });
                }
            }
        }
        Ok(Precache {
            storage,
            network,
            scope: scope.clone(),
            cache_name: format!("{PRECACHE_PREFIX}-{scope}"),
            entries,
            keys_by_url,
        })
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Finds the cache key for a request url, trying the url as is, without
    /// tracking parameters, with `index.html` appended to a directory, and
    /// with `.html` appended.
    pub fn cache_key_for(&self, url: &Url) -> Option<&str> {
        url_variations(url)
            .into_iter()
            .find_map(|candidate| self.keys_by_url.get(candidate.as_str()))
            .map(String::as_str)
    }

    pub async fn install(&self) -> Result<InstallReport> {
        let cache = self.storage.open(&self.cache_name).await?;
        let present = cache.keys().await?.into_iter().collect::<HashSet<_>>();
        let mut report = InstallReport::default();
        for entry in &self.entries {
            if present.contains(&entry.cache_key) {
                report.not_updated.push(entry.url.to_string());
                continue;
            }
            let response = self.network.fetch(&Request::get(entry.url.clone())).await?;
            if response.status != 200 {
                return Err(Error::BadPrecacheResponse {
                    url: entry.url.to_string(),
                    status: response.status,
                });
            }
            cache.put(&entry.cache_key, response).await?;
            report.updated.push(entry.url.to_string());
        }
        info!(
            "Precached {} files, {} already up to date",
            report.updated.len(),
            report.not_updated.len()
        );
        Ok(report)
    }

    /// Drops cached keys the current manifest no longer lists.
    pub async fn activate(&self) -> Result<Vec<String>> {
        let cache = self.storage.open(&self.cache_name).await?;
        let expected = self
            .entries
            .iter()
            .map(|entry| entry.cache_key.as_str())
            .collect::<HashSet<_>>();
        let mut deleted = vec![];
        for key in cache.keys().await? {
            if !expected.contains(key.as_str()) {
                cache.delete(&key).await?;
                deleted.push(key);
            }
        }
        if !deleted.is_empty() {
            info!("Removed {} outdated precache entries", deleted.len());
        }
        Ok(deleted)
    }

    async fn respond(&self, cache_key: &str, url: &Url) -> Result<Response> {
        let cache = self.storage.open(&self.cache_name).await?;
        if let Some(cached) = cache.get(cache_key).await? {
            return Ok(cached);
        }
        warn!("{url} is missing from the precache, going to the network");
        self.network.fetch(&Request::get(url.clone())).await
    }

    /// A handler that answers every request with the precached `url`.
    pub fn handler_for(self: &Rc<Self>, url: &str) -> Result<BoundHandler<S, N>> {
        let url = self.scope.join(url)?;
        let cache_key = self
            .cache_key_for(&url)
            .ok_or_else(|| Error::NotPrecached(url.to_string()))?
            .to_string();
        Ok(BoundHandler {
            precache: self.clone(),
            url,
            cache_key,
        })
    }
}

fn url_variations(url: &Url) -> Vec<Url> {
    let mut exact = url.clone();
    exact.set_fragment(None);

    let mut stripped = exact.clone();
    let kept = exact
        .query_pairs()
        .filter(|(name, _)| !is_ignored_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut variations = vec![exact, stripped.clone()];
    if stripped.path().ends_with('/') {
        let mut directory_index = stripped.clone();
        directory_index.set_path(&format!("{}index.html", stripped.path()));
        variations.push(directory_index);
    }
    let mut clean = stripped.clone();
    clean.set_path(&format!("{}.html", stripped.path()));
    variations.push(clean);
    variations
}

#[async_trait(?Send)]
impl<S, N> Handler for Precache<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let cache_key = self
            .cache_key_for(&request.url)
            .ok_or_else(|| Error::NotPrecached(request.url.to_string()))?
            .to_string();
        debug!("Serving {} from the precache", request.url);
        Ok(Handled::now(self.respond(&cache_key, &request.url).await?))
    }
}

pub struct BoundHandler<S, N> {
    precache: Rc<Precache<S, N>>,
    url: Url,
    cache_key: String,
}

#[async_trait(?Send)]
impl<S, N> Handler for BoundHandler<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    async fn handle(&self, _request: &Request) -> Result<Handled> {
        Ok(Handled::now(
            self.precache.respond(&self.cache_key, &self.url).await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStorage, MockNetwork};
    use futures::executor::block_on;

    const SCOPE: &str = "https://app.example.com/";

    fn scope() -> Url {
        Url::parse(SCOPE).unwrap()
    }

    fn manifest() -> Vec<PrecacheEntry> {
        vec![
            PrecacheEntry::new("/index.html", Some("r1")),
            PrecacheEntry::new("/static/js/main.4f2a.js", None),
            PrecacheEntry::new("/about.html", Some("r7")),
        ]
    }

    fn setup() -> (Rc<Precache<MemoryStorage, MockNetwork>>, Rc<MemoryStorage>, Rc<MockNetwork>) {
        let storage = Rc::new(MemoryStorage::default());
        let network = Rc::new(MockNetwork::default());
        network.serve("https://app.example.com/index.html", Response::new(200, "<div id=root>"));
        network.serve("https://app.example.com/static/js/main.4f2a.js", Response::new(200, "wasm()"));
        network.serve("https://app.example.com/about.html", Response::new(200, "about"));
        let precache = Precache::new(storage.clone(), network.clone(), &scope(), &manifest()).unwrap();
        (Rc::new(precache), storage, network)
    }

    #[test]
    fn revisioned_entries_get_revision_keys() {
        let (precache, _, _) = setup();
        let index = Url::parse("https://app.example.com/index.html").unwrap();
        assert_eq!(
            precache.cache_key_for(&index),
            Some("https://app.example.com/index.html?__precache_revision=r1")
        );
        let script = Url::parse("https://app.example.com/static/js/main.4f2a.js").unwrap();
        assert_eq!(
            precache.cache_key_for(&script),
            Some("https://app.example.com/static/js/main.4f2a.js")
        );
        assert_eq!(precache.cache_name(), "app-shell-precache-v2-https://app.example.com/");
    }

    #[test]
    fn lookup_tries_url_variations() {
        let (precache, _, _) = setup();
        let expected = Some("https://app.example.com/index.html?__precache_revision=r1");
        for href in [
            "https://app.example.com/",
            "https://app.example.com/?utm_source=mail&fbclid=xyz",
            "https://app.example.com/index.html#section",
            "https://app.example.com/index",
        ] {
            assert_eq!(precache.cache_key_for(&Url::parse(href).unwrap()), expected, "{href}");
        }
        let about = Url::parse("https://app.example.com/about?utm_campaign=x").unwrap();
        assert_eq!(
            precache.cache_key_for(&about),
            Some("https://app.example.com/about.html?__precache_revision=r7")
        );
        let other = Url::parse("https://app.example.com/?page=2").unwrap();
        assert_eq!(precache.cache_key_for(&other), None);
    }

    #[test]
    fn duplicate_entries_collapse_and_conflicts_fail() {
        let storage = Rc::new(MemoryStorage::default());
        let network = Rc::new(MockNetwork::default());
        let duplicated = vec![
            PrecacheEntry::new("/index.html", Some("r1")),
            PrecacheEntry::new("index.html", Some("r1")),
        ];
        let precache = Precache::new(storage.clone(), network.clone(), &scope(), &duplicated).unwrap();
        assert_eq!(precache.len(), 1);

        let conflicting = vec![
            PrecacheEntry::new("/index.html", Some("r1")),
            PrecacheEntry::new("/index.html", Some("r2")),
        ];
        assert!(matches!(
            Precache::new(storage, network, &scope(), &conflicting),
            Err(Error::ConflictingEntries { .. })
        ));
    }

    #[test]
    fn install_fetches_only_missing_entries() {
        let (precache, storage, network) = setup();
        let report = block_on(precache.install()).unwrap();
        assert_eq!(report.updated.len(), 3);
        assert!(report.not_updated.is_empty());
        assert_eq!(storage.cache(precache.cache_name()).keys_now().len(), 3);

        let again = block_on(precache.install()).unwrap();
        assert!(again.updated.is_empty());
        assert_eq!(again.not_updated.len(), 3);
        assert_eq!(network.total_fetches(), 3);
    }

    #[test]
    fn install_fails_on_bad_response() {
        let (precache, _, network) = setup();
        network.serve("https://app.example.com/about.html", Response::new(404, "nope"));
        assert!(matches!(
            block_on(precache.install()),
            Err(Error::BadPrecacheResponse { status: 404, .. })
        ));
    }

    #[test]
    fn activate_removes_outdated_revisions() {
        let (precache, storage, _) = setup();
        let cache = storage.cache(precache.cache_name());
        let stale = "https://app.example.com/index.html?__precache_revision=r0";
        cache.insert(stale, Response::new(200, "old shell"));
        block_on(precache.install()).unwrap();

        let deleted = block_on(precache.activate()).unwrap();
        assert_eq!(deleted, vec![stale.to_string()]);
        assert_eq!(cache.keys_now().len(), 3);
    }

    #[test]
    fn bound_handler_serves_its_url_for_any_request() {
        let (precache, _, network) = setup();
        block_on(precache.install()).unwrap();
        let handler = precache.handler_for("/index.html").unwrap();

        let request = Request::navigate(Url::parse("https://app.example.com/unknown-route").unwrap());
        let handled = block_on(handler.handle(&request)).unwrap();
        assert_eq!(handled.response.body, "<div id=root>");
        assert_eq!(network.total_fetches(), 3);

        assert!(matches!(
            precache.handler_for("/missing.html"),
            Err(Error::NotPrecached(_))
        ));
    }

    #[test]
    fn precache_miss_falls_back_to_network() {
        let (precache, _, network) = setup();
        let request = Request::get(Url::parse("https://app.example.com/about.html").unwrap());
        let handled = block_on(precache.handle(&request)).unwrap();
        assert_eq!(handled.response.body, "about");
        assert_eq!(network.fetch_count("https://app.example.com/about.html"), 1);
    }
}
