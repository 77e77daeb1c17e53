// ─── Core Configuration ───
// Frozen runtime settings shared by the integrity cache, the download
// manager and the pipeline runner.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

const APP_DIR_NAME: &str = "releasegraph";
pub const DEFAULT_USER_AGENT: &str = "releasegraph/0.1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    /// Base directory for materialized artifacts.
    pub data_dir: PathBuf,
    /// Hash files and compare them against expected checksums.
    pub verify_checksums: bool,
    /// Memoize computed digests keyed by path and modification time.
    pub cache_checksums: bool,
    /// Delete local files whose checksum does not match instead of warning.
    pub remove_invalid_files: bool,
    /// Extra attempts after the first transfer when retrying is enabled.
    pub max_retries: u32,
    /// Fixed pause between attempts.
    pub retry_backoff_ms: u64,
    /// Concurrent connections per origin host, unless the first request to
    /// that host carries its own limit.
    pub default_host_concurrency: usize,
    /// Versions processed concurrently by the pipeline runner.
    pub workers: usize,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            verify_checksums: true,
            cache_checksums: true,
            remove_invalid_files: true,
            max_retries: 3,
            retry_backoff_ms: 500,
            default_host_concurrency: 4,
            workers: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl CoreConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new(CoreConfig::default())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

type ConfigEdit = Box<dyn FnOnce(&mut CoreConfig) + Send>;

/// Collects edits in registration order and applies them once in [`build`].
///
/// Nothing can change the configuration after it has been built; components
/// only ever see the frozen `Arc<CoreConfig>`.
///
/// [`build`]: ConfigBuilder::build
pub struct ConfigBuilder {
    base: CoreConfig,
    edits: Vec<ConfigEdit>,
}

impl ConfigBuilder {
    pub fn new(base: CoreConfig) -> Self {
        Self {
            base,
            edits: Vec::new(),
        }
    }

    pub fn edit(mut self, edit: impl FnOnce(&mut CoreConfig) + Send + 'static) -> Self {
        self.edits.push(Box::new(edit));
        self
    }

    pub fn data_dir(self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.edit(move |c| c.data_dir = dir)
    }

    pub fn workers(self, n: usize) -> Self {
        self.edit(move |c| c.workers = n.max(1))
    }

    pub fn pending_edits(&self) -> usize {
        self.edits.len()
    }

    pub fn build(self) -> Arc<CoreConfig> {
        let mut config = self.base;
        let applied = self.edits.len();
        for edit in self.edits {
            edit(&mut config);
        }
        debug!("Configuration frozen after {} edit(s): {:?}", applied, config);
        Arc::new(config)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
