use std::rc::Rc;

use app_shell_model::{PrecacheEntry, WorkerMessage, APP_SHELL_PAGE};
use async_trait::async_trait;
use log::{error, info, warn};
use url::Url;

use crate::cache::CacheStorage;
use crate::fetch::{Network, Request};
use crate::precache::{InstallReport, Precache};
use crate::routing::{is_app_shell_navigation, is_same_origin_image, Router};
use crate::strategies::{Handled, Handler, StaleWhileRevalidate};
use crate::Result;

pub const IMAGE_CACHE: &str = "images";
pub const MAX_IMAGE_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub public_url: String,
    pub image_cache: String,
    pub max_image_entries: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            public_url: String::new(),
            image_cache: IMAGE_CACHE.to_string(),
            max_image_entries: MAX_IMAGE_ENTRIES,
        }
    }
}

impl WorkerConfig {
    pub fn from_build_env() -> Self {
        WorkerConfig {
            public_url: option_env!("PUBLIC_URL")
                .unwrap_or("")
                .trim_end_matches('/')
                .to_string(),
            ..WorkerConfig::default()
        }
    }

    pub fn app_shell_url(&self) -> String {
        format!("{}/{APP_SHELL_PAGE}", self.public_url)
    }
}

/// What the worker can ask of its own global scope.
#[async_trait(?Send)]
pub trait WorkerScope {
    /// Activate this worker now, even while an older one controls pages.
    async fn skip_waiting(&self) -> Result<()>;
    /// Take control of every open page in scope without a reload.
    async fn claim_clients(&self) -> Result<()>;
}

pub struct ShellWorker<S, N> {
    precache: Rc<Precache<S, N>>,
    router: Router,
}

impl<S, N> ShellWorker<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    pub fn new(
        scope: &Url,
        storage: Rc<S>,
        network: Rc<N>,
        manifest: &[PrecacheEntry],
        config: &WorkerConfig,
    ) -> Result<Self> {
        let precache = Rc::new(Precache::new(
            storage.clone(),
            network.clone(),
            scope,
            manifest,
        )?);
        let mut router = Router::default();

        let lookup = precache.clone();
        router.register(
            "precache",
            move |request| lookup.cache_key_for(&request.url).is_some(),
            precache.clone(),
        );

        match precache.handler_for(&config.app_shell_url()) {
            Ok(shell) => router.register("app-shell", is_app_shell_navigation, Rc::new(shell)),
            Err(err) => warn!("{err}, navigations will not fall back to the app shell"),
        }

        let origin = scope.origin();
        let images = StaleWhileRevalidate::new(storage, network, &config.image_cache)
            .with_max_entries(config.max_image_entries);
        router.register(
            "images",
            move |request| is_same_origin_image(request, &origin),
            Rc::new(images),
        );

        Ok(ShellWorker { precache, router })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn on_install(&self) -> Result<InstallReport> {
        self.precache.install().await
    }

    /// Cleans up outdated precache entries and takes control of open pages.
    /// Pages are claimed even when the cleanup fails.
    pub async fn on_activate(&self, scope: &impl WorkerScope) -> Result<()> {
        let cleanup = self.precache.activate().await;
        if let Err(err) = &cleanup {
            error!("Failed to remove outdated precache entries: {err}");
        }
        let claimed = scope.claim_clients().await;
        cleanup?;
        claimed
    }

    pub fn route(&self, request: &Request) -> Option<Rc<dyn Handler>> {
        self.router.find(request)
    }

    pub async fn on_fetch(&self, request: &Request) -> Option<Result<Handled>> {
        self.router.handle(request).await
    }

    /// Returns whether the message was understood.
    pub async fn on_message(
        &self,
        data: &serde_json::Value,
        scope: &impl WorkerScope,
    ) -> Result<bool> {
        match WorkerMessage::from_json(data) {
            Some(WorkerMessage::SkipWaiting) => {
                info!("Skipping the waiting phase on request");
                scope.skip_waiting().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
