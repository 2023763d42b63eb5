use crate::error::BridgeError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Which host runtime family we are embedded in. Probed once at startup; no
/// duck-typed dispatch at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFlavor {
    Chromium,
    Gecko,
}

/// What the host runtime advertises. Gecko-family hosts expose both
/// namespaces, so the promise-native one wins when present.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe {
    pub has_browser_namespace: bool,
    pub has_chrome_namespace: bool,
}

pub fn detect_flavor(probe: &HostProbe) -> Option<HostFlavor> {
    if probe.has_browser_namespace {
        Some(HostFlavor::Gecko)
    } else if probe.has_chrome_namespace {
        Some(HostFlavor::Chromium)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: u64,
    pub url: String,
    pub active: bool,
}

/// The single capability interface every host integration goes through.
/// Concrete providers wrap the host runtime selected by `detect_flavor`;
/// `MemoryCapabilities` stands in where no host runtime exists.
#[async_trait]
pub trait HostCapabilities: Send + Sync {
    async fn storage_get(&self, key: &str) -> Result<Option<Value>, BridgeError>;

    async fn storage_set(&self, key: &str, value: Value) -> Result<(), BridgeError>;

    /// Fire a message at the other extension contexts. `Ok(None)` is the
    /// empty-signal case: the bus accepted the message but nobody answered.
    async fn send_message(&self, message: Value) -> Result<Option<Value>, BridgeError>;

    fn get_url(&self, path: &str) -> String;

    async fn tabs_query(&self, url_pattern: &str) -> Result<Vec<TabInfo>, BridgeError>;

    async fn tabs_reload(&self, tab_id: u64) -> Result<(), BridgeError>;
}

/// In-memory provider: backs tests and headless runs. Message answers are
/// queued ahead of time; an exhausted queue answers with the empty signal.
#[derive(Debug, Default)]
pub struct MemoryCapabilities {
    base_url: String,
    storage: Mutex<HashMap<String, Value>>,
    message_answers: Mutex<VecDeque<Option<Value>>>,
    tabs: Mutex<Vec<TabInfo>>,
}

impl MemoryCapabilities {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn queue_answer(&self, answer: Option<Value>) {
        self.lock(&self.message_answers).push_back(answer);
    }

    pub fn add_tab(&self, tab: TabInfo) {
        self.lock(&self.tabs).push(tab);
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HostCapabilities for MemoryCapabilities {
    async fn storage_get(&self, key: &str) -> Result<Option<Value>, BridgeError> {
        Ok(self.lock(&self.storage).get(key).cloned())
    }

    async fn storage_set(&self, key: &str, value: Value) -> Result<(), BridgeError> {
        self.lock(&self.storage).insert(key.to_string(), value);
        Ok(())
    }

    async fn send_message(&self, _message: Value) -> Result<Option<Value>, BridgeError> {
        Ok(self.lock(&self.message_answers).pop_front().flatten())
    }

    fn get_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn tabs_query(&self, url_pattern: &str) -> Result<Vec<TabInfo>, BridgeError> {
        let needle = url_pattern.trim_matches('*').to_ascii_lowercase();
        Ok(self
            .lock(&self.tabs)
            .iter()
            .filter(|tab| tab.url.to_ascii_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn tabs_reload(&self, tab_id: u64) -> Result<(), BridgeError> {
        let known = self.lock(&self.tabs).iter().any(|tab| tab.id == tab_id);
        if known {
            Ok(())
        } else {
            Err(BridgeError::Storage(format!("no such tab: {tab_id}")))
        }
    }
}
