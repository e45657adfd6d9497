//! Node Configuration
//!
//! Options supplied to the node at startup. Every field has a default, so a
//! partial (or absent) JSON file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Column-store endpoints.
    pub backend_hosts: Vec<String>,
    /// Schema namespace holding the `bitmap` table.
    pub keyspace: String,
    /// Max batch age before an automatic flush. Carried for a deferred flush
    /// policy; every `end_batch` currently flushes.
    pub batch_time_window_secs: u64,
    /// Max batch rows before an automatic flush. Not applied, as above.
    pub batch_max_size: usize,
    /// Upper bound for a single backend call.
    pub backend_timeout_secs: u64,
    pub ping_timeout_secs: u64,
    /// Prefix for storage timer names (`<prefix>_Fetch`, ...).
    pub metric_prefix: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            backend_hosts: vec!["localhost".to_string()],
            keyspace: "hotbox".to_string(),
            batch_time_window_secs: 5,
            batch_max_size: 15,
            backend_timeout_secs: 3,
            ping_timeout_secs: 60,
            metric_prefix: "bitmap_storage".to_string(),
        }
    }
}

impl NodeConfig {
    /// Loads the configuration from a JSON file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;

        tracing::info!(
            "Loaded config from {} (keyspace={}, hosts={:?})",
            path.display(),
            config.keyspace,
            config.backend_hosts
        );
        Ok(config)
    }

    pub fn batch_time_window(&self) -> Duration {
        Duration::from_secs(self.batch_time_window_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}
