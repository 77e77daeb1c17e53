use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::storage::{StorageKey, StorageRoot};
use crate::core::error::{CoreError, CoreResult};
use crate::core::state::AppContext;
use crate::core::status::StepStatus;
use crate::core::version::Version;

/// Outputs and statuses recorded for one version, in step order.
#[derive(Debug, Clone, Default)]
pub struct StepResults {
    outputs: BTreeMap<StorageKey, PathBuf>,
    statuses: Vec<(String, StepStatus)>,
}

impl StepResults {
    pub fn output(&self, key: &StorageKey) -> Option<&Path> {
        self.outputs.get(key).map(PathBuf::as_path)
    }

    pub fn outputs(&self) -> &BTreeMap<StorageKey, PathBuf> {
        &self.outputs
    }

    pub fn status(&self, step: &str) -> Option<StepStatus> {
        self.statuses
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, status)| *status)
    }

    pub fn statuses(&self) -> &[(String, StepStatus)] {
        &self.statuses
    }

    pub fn merged(&self) -> StepStatus {
        self.statuses.iter().map(|(_, status)| *status).collect()
    }

    pub(crate) fn record_output(&mut self, key: StorageKey, path: PathBuf) {
        self.outputs.insert(key, path);
    }

    pub(crate) fn record_status(&mut self, step: &str, status: StepStatus) {
        self.statuses.push((step.to_string(), status));
    }
}

/// What a step body sees while running for one version.
pub struct StepContext<'a> {
    pub version: &'a Version,
    pub app: &'a AppContext,
    pub storage: &'a dyn StorageRoot,
    /// Results of earlier steps for this version.
    pub results: &'a StepResults,
    /// Results of the version's graph predecessors. Only populated when the
    /// pipeline runs in order.
    pub predecessors: &'a [(Version, Arc<StepResults>)],
}

impl StepContext<'_> {
    /// Where `key` lives for the current version.
    pub fn path_of(&self, key: &StorageKey) -> PathBuf {
        self.storage.resolve(key, self.version)
    }

    /// Path of an input produced by an earlier step.
    pub fn input(&self, key: &StorageKey) -> CoreResult<&Path> {
        self.results.output(key).ok_or_else(|| CoreError::MissingArtifact {
            version: self.version.id().to_string(),
            artifact: key.to_string(),
        })
    }
}

/// One unit of per-version work.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn inputs(&self) -> Vec<StorageKey> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<StorageKey>;

    /// Steps that read predecessor results force the runner to walk the
    /// graph in topological order.
    fn order_sensitive(&self) -> bool {
        false
    }

    /// Versions this step does not apply to are reported `NotRun`.
    fn applies_to(&self, _version: &Version) -> bool {
        true
    }

    /// Extra check on an existing, non-empty output before it is reused.
    async fn output_is_valid(
        &self,
        _ctx: &StepContext<'_>,
        _key: &StorageKey,
        _path: &Path,
    ) -> CoreResult<bool> {
        Ok(true)
    }

    async fn run(&self, ctx: &StepContext<'_>) -> CoreResult<StepStatus>;
}
