//! Binds [`ShellWorker`] to the service worker global scope.

use std::rc::Rc;

use app_shell_model::{parse_manifest, PrecacheEntry};
use async_trait::async_trait;
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use js_sys::{Array, Object, Promise, Reflect, Uint8Array, JSON};
use log::{error, info, warn};
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{ExtendableEvent, ExtendableMessageEvent, FetchEvent, ResponseInit, ServiceWorkerGlobalScope};

use crate::cache::{Cache, CacheStorage};
use crate::fetch::{Network, Request, RequestMode, Response};
use crate::worker::{ShellWorker, WorkerConfig, WorkerScope};
use crate::{Error, Result};

/// Global the build step assigns the precache manifest to.
const MANIFEST_GLOBAL: &str = "__WB_MANIFEST";

fn js_error(err: JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}

fn cache_error(err: JsValue) -> Error {
    Error::Cache(js_error(err))
}

fn scope_error(err: JsValue) -> Error {
    Error::Scope(js_error(err))
}

fn to_js(err: Error) -> JsValue {
    JsValue::from_str(&err.to_string())
}

async fn read_response(response: web_sys::Response) -> Result<Response> {
    let mut headers = vec![];
    if let Some(entries) = js_sys::try_iter(&response.headers()).map_err(scope_error)? {
        for entry in entries {
            let pair: Array = entry.map_err(scope_error)?.unchecked_into();
            if let (Some(name), Some(value)) = (pair.get(0).as_string(), pair.get(1).as_string()) {
                headers.push((name, value));
            }
        }
    }
    let pending = response.array_buffer().map_err(scope_error)?;
    let buffer = JsFuture::from(pending).await.map_err(scope_error)?;
    Ok(Response {
        status: response.status(),
        headers,
        body: Uint8Array::new(&buffer).to_vec().into(),
    })
}

fn to_web_response(response: &Response) -> Result<web_sys::Response> {
    let headers = web_sys::Headers::new().map_err(scope_error)?;
    for (name, value) in &response.headers {
        headers.append(name, value).map_err(scope_error)?;
    }
    let init = ResponseInit::new();
    init.set_status(response.status);
    init.set_headers(&headers);
    let body = Uint8Array::from(response.body.as_ref());
    let body: &Object = &body;
    web_sys::Response::new_with_opt_buffer_source_and_init(Some(body), &init).map_err(scope_error)
}

fn read_request(request: &web_sys::Request) -> Result<Request> {
    let mode = match request.mode() {
        web_sys::RequestMode::Navigate => RequestMode::Navigate,
        web_sys::RequestMode::SameOrigin => RequestMode::SameOrigin,
        web_sys::RequestMode::NoCors => RequestMode::NoCors,
        _ => RequestMode::Cors,
    };
    Ok(Request {
        url: Url::parse(&request.url())?,
        method: request.method(),
        mode,
    })
}

pub struct WebCacheStorage(ServiceWorkerGlobalScope);

#[async_trait(?Send)]
impl CacheStorage for WebCacheStorage {
    type Cache = WebCache;

    async fn open(&self, name: &str) -> Result<WebCache> {
        let caches = self.0.caches().map_err(cache_error)?;
        let cache = JsFuture::from(caches.open(name)).await.map_err(cache_error)?;
        Ok(WebCache(cache.unchecked_into()))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let caches = self.0.caches().map_err(cache_error)?;
        let deleted = JsFuture::from(caches.delete(name)).await.map_err(cache_error)?;
        Ok(deleted.as_bool().unwrap_or(false))
    }
}

pub struct WebCache(web_sys::Cache);

#[async_trait(?Send)]
impl Cache for WebCache {
    async fn get(&self, key: &str) -> Result<Option<Response>> {
        let found = JsFuture::from(self.0.match_with_str(key))
            .await
            .map_err(cache_error)?;
        if found.is_undefined() || found.is_null() {
            return Ok(None);
        }
        Ok(Some(read_response(found.unchecked_into()).await?))
    }

    async fn put(&self, key: &str, response: Response) -> Result<()> {
        let response = to_web_response(&response)?;
        JsFuture::from(self.0.put_with_str(key, &response))
            .await
            .map_err(cache_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let deleted = JsFuture::from(self.0.delete_with_str(key))
            .await
            .map_err(cache_error)?;
        Ok(deleted.as_bool().unwrap_or(false))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let requests: Array = JsFuture::from(self.0.keys())
            .await
            .map_err(cache_error)?
            .unchecked_into();
        Ok(requests
            .iter()
            .map(|request| request.unchecked_into::<web_sys::Request>().url())
            .collect())
    }
}

pub struct WebNetwork(ServiceWorkerGlobalScope);

#[async_trait(?Send)]
impl Network for WebNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let response = JsFuture::from(self.0.fetch_with_str(request.url.as_str()))
            .await
            .map_err(|err| Error::Network(js_error(err)))?;
        read_response(response.unchecked_into()).await
    }
}

pub struct WebScope(ServiceWorkerGlobalScope);

#[async_trait(?Send)]
impl WorkerScope for WebScope {
    async fn skip_waiting(&self) -> Result<()> {
        let pending: Promise = self.0.skip_waiting().map_err(scope_error)?;
        JsFuture::from(pending).await.map_err(scope_error)?;
        Ok(())
    }

    async fn claim_clients(&self) -> Result<()> {
        JsFuture::from(self.0.clients().claim())
            .await
            .map_err(scope_error)?;
        Ok(())
    }
}

fn read_manifest(global: &ServiceWorkerGlobalScope) -> Result<Vec<PrecacheEntry>> {
    let manifest = Reflect::get(global, &JsValue::from_str(MANIFEST_GLOBAL)).map_err(scope_error)?;
    if manifest.is_undefined() || manifest.is_null() {
        warn!("No precache manifest in {MANIFEST_GLOBAL}, precaching nothing");
        return Ok(vec![]);
    }
    let json = JSON::stringify(&manifest)
        .map_err(scope_error)?
        .as_string()
        .unwrap_or_else(|| "[]".to_string());
    Ok(parse_manifest(&json)?)
}

fn listen(global: &ServiceWorkerGlobalScope, event: &str, mut handler: impl FnMut(JsValue) + 'static) {
    let listener = Closure::<dyn FnMut(JsValue)>::new(move |ev: JsValue| handler(ev));
    if let Err(err) = global.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref()) {
        error!("Failed to listen for {event}: {}", js_error(err));
    }
    listener.forget();
}

type WebShellWorker = ShellWorker<WebCacheStorage, WebNetwork>;

fn listen_install(global: &ServiceWorkerGlobalScope, worker: Rc<WebShellWorker>) {
    listen(global, "install", move |ev| {
        let event: ExtendableEvent = ev.unchecked_into();
        let worker = worker.clone();
        let promise = future_to_promise(async move {
            worker.on_install().await.map_err(|err| {
                error!("Precaching failed: {err}");
                to_js(err)
            })?;
            Ok(JsValue::UNDEFINED)
        });
        if let Err(err) = event.wait_until(&promise) {
            error!("{}", js_error(err));
        }
    });
}

fn listen_activate(global: &ServiceWorkerGlobalScope, worker: Rc<WebShellWorker>, scope: Rc<WebScope>) {
    listen(global, "activate", move |ev| {
        let event: ExtendableEvent = ev.unchecked_into();
        let worker = worker.clone();
        let scope = scope.clone();
        let promise = future_to_promise(async move {
            worker.on_activate(&*scope).await.map_err(|err| {
                error!("Activation failed: {err}");
                to_js(err)
            })?;
            Ok(JsValue::UNDEFINED)
        });
        if let Err(err) = event.wait_until(&promise) {
            error!("{}", js_error(err));
        }
    });
}

fn listen_fetch(global: &ServiceWorkerGlobalScope, worker: Rc<WebShellWorker>) {
    let global = global.clone();
    listen(&global.clone(), "fetch", move |ev| {
        let event: FetchEvent = ev.unchecked_into();
        let raw = event.request();
        let request = match read_request(&raw) {
            Ok(request) => request,
            Err(err) => {
                warn!("Ignoring fetch: {err}");
                return;
            }
        };
        let Some(handler) = worker.route(&request) else {
            return;
        };

        // Cache writes outlive the response; keep the worker alive for them.
        let (sender, receiver) = oneshot::channel::<LocalBoxFuture<'static, ()>>();
        let fallback = global.clone();
        let respond = future_to_promise(async move {
            match handler.handle(&request).await {
                Ok(handled) => {
                    if let Some(background) = handled.background {
                        let _ = sender.send(background);
                    }
                    to_web_response(&handled.response)
                        .map(JsValue::from)
                        .map_err(to_js)
                }
                Err(err) => {
                    warn!("{} failed: {err}, going to the network", request.url);
                    JsFuture::from(fallback.fetch_with_request(&raw)).await
                }
            }
        });
        let background = future_to_promise(async move {
            if let Ok(background) = receiver.await {
                background.await;
            }
            Ok(JsValue::UNDEFINED)
        });
        if let Err(err) = event.respond_with(&respond) {
            error!("{}", js_error(err));
        }
        if let Err(err) = event.wait_until(&background) {
            error!("{}", js_error(err));
        }
    });
}

fn listen_message(global: &ServiceWorkerGlobalScope, worker: Rc<WebShellWorker>, scope: Rc<WebScope>) {
    listen(global, "message", move |ev| {
        let event: ExtendableMessageEvent = ev.unchecked_into();
        let data = JSON::stringify(&event.data())
            .ok()
            .and_then(|json| json.as_string())
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or(serde_json::Value::Null);
        let worker = worker.clone();
        let scope = scope.clone();
        let promise = future_to_promise(async move {
            worker.on_message(&data, &*scope).await.map_err(to_js)?;
            Ok(JsValue::UNDEFINED)
        });
        if let Err(err) = event.wait_until(&promise) {
            error!("{}", js_error(err));
        }
    });
}

/// Installs the lifecycle, fetch and message listeners. Must run during the
/// worker script's initial evaluation.
pub fn start() -> Result<()> {
    let global = js_sys::global()
        .dyn_into::<ServiceWorkerGlobalScope>()
        .map_err(|_| Error::Scope("not running in a service worker".to_string()))?;
    let scope = Url::parse(&global.registration().scope())?;
    let manifest = read_manifest(&global)?;
    let worker = Rc::new(ShellWorker::new(
        &scope,
        Rc::new(WebCacheStorage(global.clone())),
        Rc::new(WebNetwork(global.clone())),
        &manifest,
        &WorkerConfig::from_build_env(),
    )?);
    let web_scope = Rc::new(WebScope(global.clone()));

    listen_install(&global, worker.clone());
    listen_activate(&global, worker.clone(), web_scope.clone());
    listen_fetch(&global, worker.clone());
    listen_message(&global, worker, web_scope);

    info!("Service worker for {scope} started, {} files to precache", manifest.len());
    Ok(())
}
