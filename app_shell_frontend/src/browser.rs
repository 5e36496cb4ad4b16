//! Capabilities the lifecycle manager needs from the page's host environment.
//!
//! The web-sys backed implementation lives in [`crate::web`]; tests supply
//! their own.

use app_shell_model::{WorkerMessage, WorkerState};
use async_trait::async_trait;
use futures::stream::LocalBoxStream;
use url::Url;

use crate::Result;

/// What came back from the script self-check request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProbe {
    pub status: u16,
    pub content_type: Option<String>,
}

impl ScriptProbe {
    /// A 404, or a content type that is present but not javascript, means the
    /// server handed back something other than the worker script.
    pub fn is_missing_script(&self) -> bool {
        self.status == 404
            || self
                .content_type
                .as_deref()
                .is_some_and(|content_type| !content_type.contains("javascript"))
    }
}

/// `document.readyState` once the `load` event has already fired.
pub fn is_document_loaded(ready_state: &str) -> bool {
    ready_state == "complete"
}

#[async_trait(?Send)]
pub trait BrowserEnv {
    type Registration: Registration;

    /// Full url of the current page.
    fn location(&self) -> Result<Url>;
    fn supports_service_worker(&self) -> bool;
    /// Whether a service worker currently controls this page.
    fn has_controller(&self) -> bool;
    fn reload(&self) -> Result<()>;

    /// Resolves once the page's `load` event has fired.
    async fn loaded(&self);
    async fn register(&self, script_url: &str) -> Result<Self::Registration>;
    /// Resolves with the registration once it has an active worker.
    async fn ready(&self) -> Result<Self::Registration>;
    async fn probe_script(&self, script_url: &str) -> Result<ScriptProbe>;
}

#[async_trait(?Send)]
pub trait Registration {
    type Worker: ServiceWorker;

    /// Installing workers, one per `updatefound` event.
    fn update_found(&self) -> LocalBoxStream<'static, Self::Worker>;
    fn waiting(&self) -> Option<Self::Worker>;
    async fn unregister(&self) -> Result<bool>;
}

pub trait ServiceWorker {
    fn state(&self) -> WorkerState;
    fn state_changes(&self) -> LocalBoxStream<'static, WorkerState>;
    fn post_message(&self, message: &WorkerMessage) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(status: u16, content_type: Option<&str>) -> ScriptProbe {
        ScriptProbe {
            status,
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn script_probe_classification() {
        assert!(probe(404, Some("application/javascript")).is_missing_script());
        assert!(probe(200, Some("text/html; charset=utf-8")).is_missing_script());
        assert!(!probe(200, Some("application/javascript")).is_missing_script());
        assert!(!probe(200, Some("text/javascript; charset=utf-8")).is_missing_script());
        assert!(!probe(200, None).is_missing_script());
        assert!(!probe(304, Some("application/javascript")).is_missing_script());
    }

    #[test]
    fn only_complete_documents_are_loaded() {
        assert!(is_document_loaded("complete"));
        assert!(!is_document_loaded("interactive"));
        assert!(!is_document_loaded("loading"));
    }
}
