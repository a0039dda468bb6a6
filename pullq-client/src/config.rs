use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::errors::Result;

const DEFAULT_PULL_REQUEST_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_ACK_FLUSH_INTERVAL_MS: u64 = 1_000;
const DEFAULT_ACK_BATCH_SIZE: usize = 32;
const DEFAULT_DESTROY_DRAIN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_OFFLINE_FLUSH_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 200;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 5_000;

/// configuration settings loaded from the client config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Request timeout for pulls of subjects without an override
    pub pull_request_timeout_ms: u64,
    /// Period of the background ack flush
    pub ack_flush_interval_ms: u64,
    /// Number of completed acks that triggers an early flush
    pub ack_batch_size: usize,
    /// Bound of the ack drain performed when a pull entry is destroyed
    pub destroy_drain_timeout_ms: u64,
    /// Bound of the ack flush performed when a pull entry goes offline
    pub offline_flush_timeout_ms: u64,
    /// Backoff applied after a failed ack flush
    pub retry_base_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    /// Per-subject overrides
    pub subjects: HashMap<String, SubjectConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            pull_request_timeout_ms: DEFAULT_PULL_REQUEST_TIMEOUT_MS,
            ack_flush_interval_ms: DEFAULT_ACK_FLUSH_INTERVAL_MS,
            ack_batch_size: DEFAULT_ACK_BATCH_SIZE,
            destroy_drain_timeout_ms: DEFAULT_DESTROY_DRAIN_TIMEOUT_MS,
            offline_flush_timeout_ms: DEFAULT_OFFLINE_FLUSH_TIMEOUT_MS,
            retry_base_backoff_ms: DEFAULT_RETRY_BASE_BACKOFF_MS,
            retry_max_backoff_ms: DEFAULT_RETRY_MAX_BACKOFF_MS,
            subjects: HashMap::new(),
        }
    }
}

/// Per-subject configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectConfig {
    pub pull_request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn pull_request_timeout(&self, subject: &str) -> Duration {
        let millis = self
            .subjects
            .get(subject)
            .and_then(|s| s.pull_request_timeout_ms)
            .unwrap_or(self.pull_request_timeout_ms);
        Duration::from_millis(millis)
    }

    pub fn ack_flush_interval(&self) -> Duration {
        Duration::from_millis(self.ack_flush_interval_ms.max(1))
    }

    pub fn destroy_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.destroy_drain_timeout_ms)
    }

    pub fn offline_flush_timeout(&self) -> Duration {
        Duration::from_millis(self.offline_flush_timeout_ms)
    }
}

/// A value together with the config version that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Hot-reloadable configuration value.
///
/// Clones share the same slot: readers call `get` on every use and observe the
/// latest `set` without being recreated.
#[derive(Debug)]
pub struct ConfigCell<T> {
    slot: Arc<ArcSwap<Versioned<T>>>,
}

impl<T> Clone for ConfigCell<T> {
    fn clone(&self) -> Self {
        ConfigCell {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> ConfigCell<T> {
    pub fn new(value: T) -> Self {
        ConfigCell {
            slot: Arc::new(ArcSwap::from_pointee(Versioned { version: 0, value })),
        }
    }

    pub fn get(&self) -> T {
        self.slot.load().value.clone()
    }

    pub fn snapshot(&self) -> Arc<Versioned<T>> {
        self.slot.load_full()
    }

    pub fn set(&self, value: T) {
        self.slot.rcu(|current| Versioned {
            version: current.version + 1,
            value: value.clone(),
        });
    }
}

/// Per-subject pull settings shared by every pull entry of a client
#[derive(Debug)]
pub struct PullSubjectsConfig {
    defaults: ArcSwap<ClientConfig>,
    pull_request_timeouts: DashMap<String, ConfigCell<Duration>>,
}

impl PullSubjectsConfig {
    pub fn new(config: ClientConfig) -> Self {
        PullSubjectsConfig {
            defaults: ArcSwap::from_pointee(config),
            pull_request_timeouts: DashMap::new(),
        }
    }

    /// Returns the live timeout cell for `subject`, created from the current config on first use.
    pub fn pull_request_timeout(&self, subject: &str) -> ConfigCell<Duration> {
        self.pull_request_timeouts
            .entry(subject.to_string())
            .or_insert_with(|| ConfigCell::new(self.defaults.load().pull_request_timeout(subject)))
            .clone()
    }

    /// Current client-wide settings
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.defaults.load_full()
    }

    /// Swap in a reloaded config, updating every timeout cell already handed out.
    pub fn apply(&self, config: ClientConfig) {
        for cell in self.pull_request_timeouts.iter() {
            let timeout = config.pull_request_timeout(cell.key());
            if cell.value().get() != timeout {
                info!(subject = %cell.key(), timeout_ms = timeout.as_millis() as u64, "pull request timeout reloaded");
                cell.value().set(timeout);
            }
        }
        self.defaults.store(Arc::new(config));
    }

    pub fn reload(&self, path: impl AsRef<Path>) -> Result<()> {
        let config = ClientConfig::load(path)?;
        self.apply(config);
        Ok(())
    }
}

impl Default for PullSubjectsConfig {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}
