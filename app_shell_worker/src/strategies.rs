use std::rc::Rc;

use async_trait::async_trait;
use futures::future::{FutureExt, LocalBoxFuture};
use log::{debug, warn};

use crate::cache::{Cache, CacheStorage};
use crate::expiration::CacheExpiration;
use crate::fetch::{Network, Request, Response};
use crate::Result;

/// A response plus whatever cache work should keep running after it has been
/// handed to the page.
pub struct Handled {
    pub response: Response,
    pub background: Option<LocalBoxFuture<'static, ()>>,
}

impl Handled {
    pub fn now(response: Response) -> Self {
        Handled {
            response,
            background: None,
        }
    }

    /// Waits for the background work, then yields the response.
    pub async fn settle(self) -> Response {
        if let Some(background) = self.background {
            background.await;
        }
        self.response
    }
}

#[async_trait(?Send)]
pub trait Handler {
    async fn handle(&self, request: &Request) -> Result<Handled>;
}

/// Serves from cache when possible and refreshes the entry from the network
/// in the background either way.
pub struct StaleWhileRevalidate<S, N> {
    storage: Rc<S>,
    network: Rc<N>,
    cache_name: String,
    expiration: Option<Rc<CacheExpiration>>,
}

impl<S, N> StaleWhileRevalidate<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    pub fn new(storage: Rc<S>, network: Rc<N>, cache_name: &str) -> Self {
        StaleWhileRevalidate {
            storage,
            network,
            cache_name: cache_name.to_string(),
            expiration: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.expiration = Some(Rc::new(CacheExpiration::new(max_entries)));
        self
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    async fn hydrate(&self, cache: &S::Cache) -> Result<()> {
        let Some(expiration) = &self.expiration else {
            return Ok(());
        };
        if !expiration.claim_hydration() {
            return Ok(());
        }
        for key in expiration.hydrate(cache.keys().await?) {
            debug!("Expiring {key} from {}", self.cache_name);
            cache.delete(&key).await?;
        }
        Ok(())
    }
}

async fn put_and_expire<C: Cache>(
    cache: &C,
    expiration: Option<&CacheExpiration>,
    key: &str,
    response: Response,
) -> Result<()> {
    cache.put(key, response).await?;
    if let Some(evicted) = expiration.and_then(|expiration| expiration.touch(key)) {
        debug!("Expiring {evicted}");
        cache.delete(&evicted).await?;
    }
    Ok(())
}

async fn revalidate<C: Cache, N: Network>(
    cache: C,
    network: Rc<N>,
    expiration: Option<Rc<CacheExpiration>>,
    request: Request,
) {
    let key = request.cache_key();
    let response = match network.fetch(&request).await {
        Ok(response) => response,
        Err(err) => {
            debug!("Revalidating {key} failed: {err}");
            return;
        }
    };
    if !response.is_cacheable() {
        debug!("Not caching {key}: status {}", response.status);
        return;
    }
    if let Err(err) = put_and_expire(&cache, expiration.as_deref(), &key, response).await {
        warn!("Failed to update cache for {key}: {err}");
    }
}

#[async_trait(?Send)]
impl<S, N> Handler for StaleWhileRevalidate<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    async fn handle(&self, request: &Request) -> Result<Handled> {
        let cache = self.storage.open(&self.cache_name).await?;
        self.hydrate(&cache).await?;
        let key = request.cache_key();

        if let Some(cached) = cache.get(&key).await? {
            if let Some(evicted) = self
                .expiration
                .as_ref()
                .and_then(|expiration| expiration.touch(&key))
            {
                cache.delete(&evicted).await?;
            }
            let background = revalidate(
                cache,
                self.network.clone(),
                self.expiration.clone(),
                request.clone(),
            );
            return Ok(Handled {
                response: cached,
                background: Some(background.boxed_local()),
            });
        }

        let response = self.network.fetch(request).await?;
        if !response.is_cacheable() {
            return Ok(Handled::now(response));
        }
        let expiration = self.expiration.clone();
        let stored = response.clone();
        let background = async move {
            if let Err(err) = put_and_expire(&cache, expiration.as_deref(), &key, stored).await {
                warn!("Failed to cache {key}: {err}");
            }
        };
        Ok(Handled {
            response,
            background: Some(background.boxed_local()),
        })
    }
}
