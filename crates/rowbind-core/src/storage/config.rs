//! Storage configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the SQLite storage engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the database file. None opens a private in-memory database.
    pub path: Option<PathBuf>,

    /// How long a statement waits on a locked database before failing.
    #[serde(with = "duration_millis")]
    pub busy_timeout: Duration,

    /// Enforce foreign key constraints.
    pub foreign_keys: bool,

    /// Use write-ahead logging. Ignored for in-memory databases.
    pub wal: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
            wal: true,
        }
    }
}

impl SqliteConfig {
    /// Create a configuration for the database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Create an in-memory configuration for testing.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Enable or disable foreign key enforcement.
    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Enable or disable write-ahead logging.
    pub fn with_wal(mut self, enabled: bool) -> Self {
        self.wal = enabled;
        self
    }

    /// Check if this configuration opens an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
