//! web-sys backed [`BrowserEnv`].

use std::pin::Pin;
use std::task::{Context, Poll};

use app_shell_model::{WorkerMessage, WorkerState, SCRIPT_INTENT_HEADER, SCRIPT_INTENT_VALUE};
use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::stream::{LocalBoxStream, Stream, StreamExt};
use gloo_net::http::Request;
use log::{debug, warn};
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Event, EventTarget, ServiceWorkerContainer, Window};

use crate::browser::{is_document_loaded, BrowserEnv, Registration, ScriptProbe, ServiceWorker};
use crate::config::DeploymentConfig;
use crate::registration::{Config, ServiceWorkerManager};
use crate::{Error, Result};

fn js_error(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

/// Events of one type from one target, for as long as the stream lives.
pub struct EventStream<T> {
    receiver: UnboundedReceiver<T>,
    target: EventTarget,
    event: &'static str,
    listener: Closure<dyn FnMut(Event)>,
}

impl<T: 'static> EventStream<T> {
    pub fn new(
        target: &EventTarget,
        event: &'static str,
        mut map: impl FnMut(Event) -> Option<T> + 'static,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded();
        let listener = Closure::<dyn FnMut(Event)>::new(move |ev: Event| {
            if let Some(item) = map(ev) {
                let _ = sender.unbounded_send(item);
            }
        });
        if let Err(err) =
            target.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())
        {
            warn!("Failed to listen for {event}: {}", js_error(err));
        }
        EventStream {
            receiver,
            target: target.clone(),
            event,
            listener,
        }
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.listener.as_ref().unchecked_ref());
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_next_unpin(cx)
    }
}

#[derive(Clone)]
pub struct WebEnv {
    window: Window,
}

impl WebEnv {
    pub fn new() -> Result<Self> {
        web_sys::window()
            .map(|window| WebEnv { window })
            .ok_or_else(|| Error::Unavailable("window".to_string()))
    }

    fn container(&self) -> ServiceWorkerContainer {
        self.window.navigator().service_worker()
    }
}

#[async_trait(?Send)]
impl BrowserEnv for WebEnv {
    type Registration = WebRegistration;

    fn location(&self) -> Result<Url> {
        let href = self
            .window
            .location()
            .href()
            .map_err(|err| Error::Unavailable(js_error(err)))?;
        Ok(Url::parse(&href)?)
    }

    fn supports_service_worker(&self) -> bool {
        js_sys::Reflect::has(&self.window.navigator(), &JsValue::from_str("serviceWorker"))
            .unwrap_or(false)
    }

    fn has_controller(&self) -> bool {
        self.container().controller().is_some()
    }

    fn reload(&self) -> Result<()> {
        self.window
            .location()
            .reload()
            .map_err(|err| Error::Unavailable(js_error(err)))
    }

    async fn loaded(&self) {
        let complete = self
            .window
            .document()
            .is_some_and(|document| is_document_loaded(&document.ready_state()));
        if complete {
            return;
        }
        let mut load = EventStream::new(&self.window, "load", |_| Some(()));
        load.next().await;
    }

    async fn register(&self, script_url: &str) -> Result<WebRegistration> {
        let registration = JsFuture::from(self.container().register(script_url))
            .await
            .map_err(|err| Error::Registration(js_error(err)))?;
        Ok(WebRegistration(registration.unchecked_into()))
    }

    async fn ready(&self) -> Result<WebRegistration> {
        let ready = self
            .container()
            .ready()
            .map_err(|err| Error::Unavailable(js_error(err)))?;
        let registration = JsFuture::from(ready)
            .await
            .map_err(|err| Error::Unavailable(js_error(err)))?;
        Ok(WebRegistration(registration.unchecked_into()))
    }

    async fn probe_script(&self, script_url: &str) -> Result<ScriptProbe> {
        let resp = Request::get(script_url)
            .header(SCRIPT_INTENT_HEADER, SCRIPT_INTENT_VALUE)
            .send()
            .await
            .map_err(|err| Error::Network(err.to_string()))?;
        debug!("Service worker self-check: {} {}", resp.status(), resp.url());
        Ok(ScriptProbe {
            status: resp.status(),
            content_type: resp.headers().get("content-type"),
        })
    }
}

#[derive(Clone)]
pub struct WebRegistration(pub web_sys::ServiceWorkerRegistration);

#[async_trait(?Send)]
impl Registration for WebRegistration {
    type Worker = WebWorker;

    fn update_found(&self) -> LocalBoxStream<'static, WebWorker> {
        let registration = self.0.clone();
        EventStream::new(&self.0, "updatefound", move |_| {
            registration.installing().map(WebWorker)
        })
        .boxed_local()
    }

    fn waiting(&self) -> Option<WebWorker> {
        self.0.waiting().map(WebWorker)
    }

    async fn unregister(&self) -> Result<bool> {
        let pending = self
            .0
            .unregister()
            .map_err(|err| Error::Unregister(js_error(err)))?;
        let done = JsFuture::from(pending)
            .await
            .map_err(|err| Error::Unregister(js_error(err)))?;
        Ok(done.as_bool().unwrap_or(false))
    }
}

#[derive(Clone)]
pub struct WebWorker(pub web_sys::ServiceWorker);

fn state_of(worker: &web_sys::ServiceWorker) -> WorkerState {
    use web_sys::ServiceWorkerState as Js;
    match worker.state() {
        Js::Parsed => WorkerState::Parsed,
        Js::Installing => WorkerState::Installing,
        Js::Installed => WorkerState::Installed,
        Js::Activating => WorkerState::Activating,
        Js::Activated => WorkerState::Activated,
        _ => WorkerState::Redundant,
    }
}

impl ServiceWorker for WebWorker {
    fn state(&self) -> WorkerState {
        state_of(&self.0)
    }

    fn state_changes(&self) -> LocalBoxStream<'static, WorkerState> {
        let worker = self.0.clone();
        EventStream::new(&self.0, "statechange", move |_| Some(state_of(&worker))).boxed_local()
    }

    fn post_message(&self, message: &WorkerMessage) -> Result<()> {
        let json = serde_json::to_string(message).map_err(|err| Error::Message(err.to_string()))?;
        let value = js_sys::JSON::parse(&json).map_err(|err| Error::Message(js_error(err)))?;
        self.0
            .post_message(&value)
            .map_err(|err| Error::Message(js_error(err)))
    }
}

/// Registers the worker in the background once the page has loaded.
pub fn register(config: Config<WebRegistration>) {
    let env = match WebEnv::new() {
        Ok(env) => env,
        Err(err) => {
            warn!("{err}");
            return;
        }
    };
    let manager = ServiceWorkerManager::new(env, DeploymentConfig::from_build_env());
    spawn_local(async move {
        let outcome = manager.register(config).await;
        debug!("Service worker registration finished: {outcome:?}");
    });
}

pub fn unregister() {
    let env = match WebEnv::new() {
        Ok(env) => env,
        Err(err) => {
            warn!("{err}");
            return;
        }
    };
    let manager = ServiceWorkerManager::new(env, DeploymentConfig::from_build_env());
    spawn_local(async move { manager.unregister().await });
}
