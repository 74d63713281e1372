use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::types::DEFAULT_COLLECTION;

/// Configuration for a [`TransferManager`](crate::TransferManager)
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Partition used when an operation does not name one
    pub default_collection: String,

    /// How often the progress sampler observes a running transfer
    pub progress_interval: Duration,

    /// Largest object that may be downloaded into memory
    pub max_in_memory_bytes: u64,

    /// Capacity of the broadcast channel behind `subscribe()`
    pub event_capacity: usize,

    /// If true: deleting a missing file completes instead of crashing
    pub tolerate_missing_on_delete: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            default_collection: DEFAULT_COLLECTION.to_string(),
            progress_interval: Duration::from_millis(100),
            max_in_memory_bytes: i32::MAX as u64,
            event_capacity: 1024,
            tolerate_missing_on_delete: false,
        }
    }
}

impl TransferConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default partition name (blank names are ignored)
    pub fn with_default_collection<S: Into<String>>(mut self, name: S) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.default_collection = name;
        }
        self
    }

    /// Set the sampler poll interval
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the in-memory download limit
    pub fn with_max_in_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_in_memory_bytes = bytes;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Treat deleting a missing file as success
    pub fn tolerate_missing_on_delete(mut self) -> Self {
        self.tolerate_missing_on_delete = true;
        self
    }

    /// Build a config from defaults overridden by `<PREFIX><KEY>` environment variables.
    ///
    /// ```bash
    /// export DOGFILES__PROGRESS_INTERVAL_MS=250
    /// export DOGFILES__DEFAULT_COLLECTION=media
    /// ```
    pub fn from_env(prefix: &str) -> Self {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Same as [`from_env`](Self::from_env) over an explicit set of variables
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(prefix) else {
                continue;
            };
            let value = value.as_ref().trim();

            match name.to_ascii_uppercase().as_str() {
                "DEFAULT_COLLECTION" => {
                    config = config.with_default_collection(value);
                }
                "PROGRESS_INTERVAL_MS" => {
                    if let Some(ms) = parse_var::<u64>(name, value) {
                        config = config.with_progress_interval(Duration::from_millis(ms));
                    }
                }
                "MAX_IN_MEMORY_BYTES" => {
                    if let Some(bytes) = parse_var::<u64>(name, value) {
                        config = config.with_max_in_memory_bytes(bytes);
                    }
                }
                "EVENT_CAPACITY" => {
                    if let Some(capacity) = parse_var::<usize>(name, value) {
                        config = config.with_event_capacity(capacity);
                    }
                }
                "TOLERATE_MISSING_ON_DELETE" => {
                    if let Some(flag) = parse_var::<bool>(name, value) {
                        config.tolerate_missing_on_delete = flag;
                    }
                }
                _ => {}
            }
        }

        config
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Option<T> {
    match value.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(variable = name, value, "ignoring unparsable configuration value");
            None
        }
    }
}
