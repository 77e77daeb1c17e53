pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::config::{ConfigBuilder, CoreConfig};
pub use crate::core::downloader::{DownloadManager, FetchError, FetchRequest, LocalFileInfo};
pub use crate::core::error::{CoreError, CoreResult};
pub use crate::core::graph::{DirectedGraph, VersionGraph};
pub use crate::core::integrity::{ChecksumCache, IntegrityAlgorithm};
pub use crate::core::pipeline::{
    DirectoryStorageRoot, Pipeline, PipelineReport, PipelineRunner, Step, StepContext, StorageKey,
    StorageRoot,
};
pub use crate::core::state::AppContext;
pub use crate::core::status::StepStatus;
pub use crate::core::version::{MetadataProvider, ProviderRegistry, Version, VersionRecord};

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,releasegraph=debug")),
        )
        .try_init();

    tracing::debug!("releasegraph logging initialized");
}
