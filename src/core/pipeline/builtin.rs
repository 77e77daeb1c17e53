use std::path::Path;

use async_trait::async_trait;

use super::step::{Step, StepContext};
use super::storage::StorageKey;
use crate::core::downloader::{FetchRequest, LocalFileInfo};
use crate::core::error::{CoreError, CoreResult};
use crate::core::integrity::IntegrityAlgorithm;
use crate::core::status::StepStatus;
use crate::core::version::{RemoteArtifact, Version};

/// Downloads one named artifact of each version into `artifact/<name>`.
///
/// Versions without that artifact are skipped. Artifacts published without
/// a checksum are accepted as downloaded.
pub struct FetchArtifactStep {
    name: String,
    artifact: String,
    output: StorageKey,
    algorithm: IntegrityAlgorithm,
}

impl FetchArtifactStep {
    pub fn new(artifact: impl Into<String>) -> Self {
        let artifact = artifact.into();
        Self {
            name: format!("fetch-{artifact}"),
            output: StorageKey::new("artifact", artifact.clone()),
            artifact,
            algorithm: IntegrityAlgorithm::Sha1,
        }
    }

    pub fn output_key(&self) -> &StorageKey {
        &self.output
    }

    fn remote<'v>(&self, version: &'v Version) -> CoreResult<&'v RemoteArtifact> {
        version
            .artifact(&self.artifact)
            .ok_or_else(|| CoreError::MissingArtifact {
                version: version.id().to_string(),
                artifact: self.artifact.clone(),
            })
    }

    fn local_info(&self, ctx: &StepContext<'_>, remote: &RemoteArtifact) -> LocalFileInfo {
        LocalFileInfo::new(ctx.path_of(&self.output), self.algorithm)
            .with_checksum(remote.sha1.clone())
            .describe(self.artifact.as_str(), ctx.version.id())
    }
}

#[async_trait]
impl Step for FetchArtifactStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn outputs(&self) -> Vec<StorageKey> {
        vec![self.output.clone()]
    }

    fn applies_to(&self, version: &Version) -> bool {
        version.artifact(&self.artifact).is_some()
    }

    async fn output_is_valid(
        &self,
        ctx: &StepContext<'_>,
        _key: &StorageKey,
        _path: &Path,
    ) -> CoreResult<bool> {
        let remote = self.remote(ctx.version)?;
        let info = self.local_info(ctx, remote);
        Ok(ctx
            .app
            .downloads
            .checksum_check_file_is_valid_and_exists(&info, true)
            .await?)
    }

    async fn run(&self, ctx: &StepContext<'_>) -> CoreResult<StepStatus> {
        let remote = self.remote(ctx.version)?;
        let request = FetchRequest::new(remote.url.clone(), self.local_info(ctx, remote))
            .tolerate_missing_checksum();
        Ok(ctx.app.downloads.fetch(request).await?)
    }
}
