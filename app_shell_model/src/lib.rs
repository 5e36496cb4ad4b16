use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// File name of the worker script, relative to the public base path.
pub const SERVICE_WORKER_SCRIPT: &str = "service-worker.js";
/// File name of the application shell page, relative to the public base path.
pub const APP_SHELL_PAGE: &str = "index.html";
/// Header sent with the script self-check request.
pub const SCRIPT_INTENT_HEADER: &str = "Service-Worker";
pub const SCRIPT_INTENT_VALUE: &str = "script";
/// Paths under this prefix are never answered with the application shell.
pub const RESERVED_PATH_PREFIX: &str = "/_";

static FILE_EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[^/?]+\.[^/]+$").expect("file extension pattern is valid"));

/// True when the last segment of `path` carries a file extension, i.e. the
/// path addresses a static resource rather than a client-side route.
pub fn looks_like_file(path: &str) -> bool {
    FILE_EXTENSION.is_match(path)
}

/// Control messages a page can post to its service worker.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
}

impl WorkerMessage {
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    /// Whether a worker in this state may move to `next` without skipping a step.
    pub fn can_become(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
                | (Parsed | Installing | Installed | Activating | Activated, Redundant)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Activated | WorkerState::Redundant)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the build-generated precache manifest.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "ManifestEntry")]
pub struct PrecacheEntry {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

impl PrecacheEntry {
    pub fn new(url: impl Into<String>, revision: Option<&str>) -> Self {
        PrecacheEntry {
            url: url.into(),
            revision: revision.map(str::to_string),
        }
    }
}

// The manifest lists either bare urls (already revisioned by file name) or
// url/revision pairs.
#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestEntry {
    Url(String),
    Entry {
        url: String,
        #[serde(default)]
        revision: Option<String>,
    },
}

impl From<ManifestEntry> for PrecacheEntry {
    fn from(entry: ManifestEntry) -> Self {
        match entry {
            ManifestEntry::Url(url) => PrecacheEntry {
                url,
                revision: None,
            },
            ManifestEntry::Entry { url, revision } => PrecacheEntry { url, revision },
        }
    }
}

pub fn parse_manifest(json: &str) -> serde_json::Result<Vec<PrecacheEntry>> {
    serde_json::from_str(json)
}
