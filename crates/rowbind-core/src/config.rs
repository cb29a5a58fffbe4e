//! Registry configuration.

use serde::{Deserialize, Serialize};

/// Default name of the persistence worker thread.
pub const DEFAULT_WORKER_THREAD_NAME: &str = "rowbind-persist";

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name of the background persistence thread.
    pub worker_thread_name: String,

    /// Log schema creation statements at debug level while opening databases.
    pub log_statements: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
            log_statements: false,
        }
    }
}

impl RegistryConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread name.
    pub fn with_worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    /// Enable or disable statement logging.
    pub fn with_log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }
}
