use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::core::config::CoreConfig;
use crate::core::downloader::{DownloadManager, HttpTransport, Transport};
use crate::core::error::CoreResult;
use crate::core::http::build_http_client;
use crate::core::integrity::ChecksumCache;

/// Everything a pipeline run shares: frozen config, checksum cache,
/// download manager and HTTP client. Passed by reference, never global.
pub struct AppContext {
    pub config: Arc<CoreConfig>,
    pub checksums: Arc<ChecksumCache>,
    pub downloads: Arc<DownloadManager>,
    pub http_client: Client,
}

impl AppContext {
    pub fn new(config: Arc<CoreConfig>) -> CoreResult<Self> {
        let http_client = build_http_client(&config)?;
        let transport = Arc::new(HttpTransport::new(http_client.clone()));
        Ok(Self::assemble(config, http_client, transport))
    }

    /// Same wiring with a caller-supplied transport for artifact fetches.
    pub fn with_transport(
        config: Arc<CoreConfig>,
        transport: Arc<dyn Transport>,
    ) -> CoreResult<Self> {
        let http_client = build_http_client(&config)?;
        Ok(Self::assemble(config, http_client, transport))
    }

    fn assemble(config: Arc<CoreConfig>, http_client: Client, transport: Arc<dyn Transport>) -> Self {
        let checksums = Arc::new(ChecksumCache::new(Arc::clone(&config)));
        let downloads = DownloadManager::new(Arc::clone(&config), Arc::clone(&checksums), transport);
        info!("Core context ready, data dir {:?}", config.data_dir);
        Self {
            config,
            checksums,
            downloads,
            http_client,
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }

    /// Default location of per-version pipeline outputs.
    pub fn versions_dir(&self) -> PathBuf {
        self.config.data_dir.join("versions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::testing::MockTransport;

    #[test]
    fn context_shares_one_checksum_cache() {
        let config = CoreConfig::builder().data_dir("/tmp/releasegraph-test").build();
        let app = AppContext::with_transport(config, Arc::new(MockTransport::new(b""))).unwrap();
        assert!(std::ptr::eq(app.downloads.checksums(), app.checksums.as_ref()));
        assert_eq!(app.versions_dir(), PathBuf::from("/tmp/releasegraph-test/versions"));
    }
}
