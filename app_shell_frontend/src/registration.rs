//! Service worker registration and the install/update handshake.
//!
//! Offline caching is only switched on for production builds served from
//! the same origin as the public base path. On localhost the worker script is
//! verified first, so a dev server that answers every path with the app shell
//! does not leave a stale worker behind.

use std::net::Ipv6Addr;

use app_shell_model::{WorkerMessage, WorkerState, SERVICE_WORKER_SCRIPT};
use futures::future;
use futures::StreamExt;
use log::{debug, error, info, warn};
use url::{Host, Url};

use crate::browser::{BrowserEnv, Registration, ServiceWorker};
use crate::config::DeploymentConfig;
use crate::Result;

type Callback<R> = Box<dyn Fn(&R)>;

/// Host application hooks, invoked once the installing worker is `installed`.
pub struct Config<R> {
    on_success: Option<Callback<R>>,
    on_update: Option<Callback<R>>,
}

impl<R> Default for Config<R> {
    fn default() -> Self {
        Config {
            on_success: None,
            on_update: None,
        }
    }
}

impl<R> Config<R> {
    /// Called after a first install: everything is cached for offline use.
    pub fn on_success(mut self, callback: impl Fn(&R) + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Called when new content is cached but the previous worker still
    /// controls open tabs.
    pub fn on_update(mut self, callback: impl Fn(&R) + 'static) -> Self {
        self.on_update = Some(Box::new(callback));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Not a production build, or no service worker support.
    Disabled,
    /// The public base path lives on another origin.
    CrossOrigin,
    /// Registered; every announced installing worker has been followed.
    Registered,
    /// The script self-check found something else; the page was reloaded.
    Reloaded,
    /// The script self-check could not reach the network.
    Offline,
    Failed,
}

pub struct ServiceWorkerManager<E> {
    env: E,
    deployment: DeploymentConfig,
}

impl<E: BrowserEnv> ServiceWorkerManager<E> {
    pub fn new(env: E, deployment: DeploymentConfig) -> Self {
        ServiceWorkerManager { env, deployment }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn script_url(&self) -> String {
        self.deployment.asset_url(SERVICE_WORKER_SCRIPT)
    }

    pub async fn register(&self, config: Config<E::Registration>) -> RegisterOutcome {
        if !self.deployment.is_production() || !self.env.supports_service_worker() {
            return RegisterOutcome::Disabled;
        }
        let page = match self.env.location() {
            Ok(page) => page,
            Err(err) => {
                error!("Could not read page location: {err}");
                return RegisterOutcome::Failed;
            }
        };
        let public_url = match self.deployment.resolve_public_url(&page) {
            Ok(public_url) => public_url,
            Err(err) => {
                error!("Invalid public url {}: {err}", self.deployment.public_url);
                return RegisterOutcome::Failed;
            }
        };
        if public_url.origin() != page.origin() {
            // Assets served from a CDN: a worker can't be registered there.
            debug!("Public url {public_url} is cross-origin, not registering");
            return RegisterOutcome::CrossOrigin;
        }

        self.env.loaded().await;
        let script_url = self.script_url();

        if is_localhost(&page) {
            let notice = async {
                if self.env.ready().await.is_ok() {
                    info!("This web app is being served cache-first by a service worker.");
                }
            };
            let (outcome, ()) =
                future::join(self.check_valid_service_worker(&script_url, &config), notice).await;
            outcome
        } else {
            self.register_valid_sw(&script_url, &config).await
        }
    }

    pub async fn register_valid_sw(
        &self,
        script_url: &str,
        config: &Config<E::Registration>,
    ) -> RegisterOutcome {
        let registration = match self.env.register(script_url).await {
            Ok(registration) => registration,
            Err(err) => {
                error!("Error during service worker registration: {err}");
                return RegisterOutcome::Failed;
            }
        };
        registration
            .update_found()
            .for_each_concurrent(None, |worker| {
                self.follow_installing(&registration, worker, config)
            })
            .await;
        RegisterOutcome::Registered
    }

    async fn follow_installing(
        &self,
        registration: &E::Registration,
        worker: <E::Registration as Registration>::Worker,
        config: &Config<E::Registration>,
    ) {
        let mut previous = worker.state();
        if previous == WorkerState::Installed {
            self.installed(registration, config);
            return;
        }
        let mut states = worker.state_changes();
        while let Some(state) = states.next().await {
            if !previous.can_become(state) {
                warn!("Service worker jumped from {previous} to {state}");
            }
            previous = state;
            if state == WorkerState::Installed {
                self.installed(registration, config);
                break;
            }
            if state.is_terminal() {
                break;
            }
        }
    }

    fn installed(&self, registration: &E::Registration, config: &Config<E::Registration>) {
        if self.env.has_controller() {
            // The old worker keeps serving the old content until every tab
            // it controls is closed.
            info!("New content is available and will be used when all tabs for this page are closed.");
            if let Some(on_update) = &config.on_update {
                on_update(registration);
            }
        } else {
            info!("Content is cached for offline use.");
            if let Some(on_success) = &config.on_success {
                on_success(registration);
            }
        }
    }

    pub async fn check_valid_service_worker(
        &self,
        script_url: &str,
        config: &Config<E::Registration>,
    ) -> RegisterOutcome {
        let probe = match self.env.probe_script(script_url).await {
            Ok(probe) => probe,
            Err(err) => {
                debug!("Service worker self-check failed: {err}");
                info!("No internet connection found. App is running in offline mode.");
                return RegisterOutcome::Offline;
            }
        };
        if probe.is_missing_script() {
            warn!(
                "{script_url} is not a service worker (status {}, content type {:?}), reloading",
                probe.status, probe.content_type
            );
            match self.unregister_and_reload().await {
                Ok(()) => RegisterOutcome::Reloaded,
                Err(err) => {
                    error!("{err}");
                    RegisterOutcome::Failed
                }
            }
        } else {
            self.register_valid_sw(script_url, config).await
        }
    }

    async fn unregister_and_reload(&self) -> Result<()> {
        let registration = self.env.ready().await?;
        registration.unregister().await?;
        self.env.reload()
    }

    pub async fn unregister(&self) {
        if !self.env.supports_service_worker() {
            return;
        }
        match self.env.ready().await {
            Ok(registration) => {
                if let Err(err) = registration.unregister().await {
                    error!("{err}");
                }
            }
            Err(err) => error!("{err}"),
        }
    }
}

/// Asks the registration's waiting worker to activate now instead of once
/// all controlled tabs are gone. Returns whether a worker was waiting.
pub fn activate_waiting<R: Registration>(registration: &R) -> Result<bool> {
    match registration.waiting() {
        Some(worker) => {
            worker.post_message(&WorkerMessage::SkipWaiting)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

pub fn is_localhost(page: &Url) -> bool {
    match page.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr == Ipv6Addr::LOCALHOST,
        None => false,
    }
}
