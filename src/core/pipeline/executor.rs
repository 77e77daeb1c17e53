use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use super::step::{Step, StepContext, StepResults};
use super::storage::{StorageKey, StorageRoot};
use super::Pipeline;
use crate::core::error::CoreResult;
use crate::core::graph::VersionGraph;
use crate::core::state::AppContext;
use crate::core::status::StepStatus;
use crate::core::version::Version;

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
    pub elapsed: Duration,
    pub error: Option<String>,
}

/// Everything that happened to one version.
#[derive(Debug, Clone)]
pub struct VersionOutcome {
    pub version: Version,
    pub steps: Vec<StepReport>,
    pub results: Arc<StepResults>,
    /// Failed predecessor that kept this version from running.
    pub blocked_by: Option<String>,
}

impl VersionOutcome {
    fn blocked(pipeline: &Pipeline, version: &Version, blocker: &Version) -> Self {
        let mut results = StepResults::default();
        let steps = pipeline
            .steps()
            .iter()
            .map(|step| {
                results.record_status(step.name(), StepStatus::NotRun);
                StepReport {
                    step: step.name().to_string(),
                    status: StepStatus::NotRun,
                    elapsed: Duration::ZERO,
                    error: None,
                }
            })
            .collect();
        Self {
            version: version.clone(),
            steps,
            results: Arc::new(results),
            blocked_by: Some(blocker.id().to_string()),
        }
    }

    pub fn status(&self) -> StepStatus {
        self.steps.iter().map(|s| s.status).collect()
    }

    pub fn outputs(&self) -> &BTreeMap<StorageKey, PathBuf> {
        self.results.outputs()
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == name)
    }

    fn halted(&self) -> bool {
        self.blocked_by.is_some() || self.status().is_failed()
    }
}

/// Result of one pipeline run, versions in topological order.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<VersionOutcome>,
}

impl PipelineReport {
    pub fn status(&self) -> StepStatus {
        self.outcomes.iter().map(VersionOutcome::status).collect()
    }

    /// Number of versions whose merged status is `status`.
    pub fn count(&self, status: StepStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status() == status).count()
    }

    pub fn failed_versions(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status().is_failed())
            .map(|o| o.version.id())
            .collect()
    }

    pub fn outcome(&self, id: &str) -> Option<&VersionOutcome> {
        self.outcomes.iter().find(|o| o.version.id() == id)
    }
}

pub struct PipelineRunner<'a> {
    app: &'a AppContext,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(app: &'a AppContext) -> Self {
        Self { app }
    }

    /// Run every step of `pipeline` for every version of `graph`.
    ///
    /// Step failures are recorded in the report; only graph errors abort the
    /// run.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        storage: &dyn StorageRoot,
        graph: &VersionGraph,
    ) -> CoreResult<PipelineReport> {
        let started_at = Utc::now();
        let versions = graph.ordered_versions()?;
        let ordered = pipeline.order_sensitive();
        info!(
            "Running pipeline '{}' over {} versions ({})",
            pipeline.name(),
            versions.len(),
            if ordered {
                "ordered".to_string()
            } else {
                format!("{} workers", self.app.config.workers)
            }
        );

        let outcomes = if ordered {
            self.run_ordered(pipeline, storage, graph, &versions).await
        } else {
            self.run_concurrent(pipeline, storage, &versions).await
        };

        let report = PipelineReport {
            pipeline: pipeline.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!(
            "Pipeline '{}' finished: {} ({} failed, {} up to date, {} succeeded)",
            report.pipeline,
            report.status(),
            report.count(StepStatus::Failed),
            report.count(StepStatus::UpToDate),
            report.count(StepStatus::Success)
        );
        Ok(report)
    }

    async fn run_ordered(
        &self,
        pipeline: &Pipeline,
        storage: &dyn StorageRoot,
        graph: &VersionGraph,
        versions: &[&Version],
    ) -> Vec<VersionOutcome> {
        let mut finished: HashMap<Version, Arc<StepResults>> = HashMap::new();
        let mut halted: HashSet<Version> = HashSet::new();
        let mut outcomes = Vec::with_capacity(versions.len());

        for &version in versions {
            let previous = graph.previous(version);
            let outcome = match previous.iter().find(|p| halted.contains(*p)) {
                Some(blocker) => {
                    warn!(
                        "Skipping {}: predecessor {} did not complete",
                        version, blocker
                    );
                    VersionOutcome::blocked(pipeline, version, blocker)
                }
                None => {
                    let predecessors: Vec<(Version, Arc<StepResults>)> = previous
                        .iter()
                        .filter_map(|p| finished.get(p).map(|r| (p.clone(), Arc::clone(r))))
                        .collect();
                    self.run_version(pipeline, storage, version, &predecessors)
                        .await
                }
            };

            if outcome.halted() {
                halted.insert(version.clone());
            }
            finished.insert(version.clone(), Arc::clone(&outcome.results));
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_concurrent(
        &self,
        pipeline: &Pipeline,
        storage: &dyn StorageRoot,
        versions: &[&Version],
    ) -> Vec<VersionOutcome> {
        let mut indexed: Vec<(usize, VersionOutcome)> = stream::iter(versions.iter().enumerate())
            .map(|(index, &version)| async move {
                (index, self.run_version(pipeline, storage, version, &[]).await)
            })
            .buffer_unordered(self.app.config.workers.max(1))
            .collect()
            .await;

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    async fn run_version(
        &self,
        pipeline: &Pipeline,
        storage: &dyn StorageRoot,
        version: &Version,
        predecessors: &[(Version, Arc<StepResults>)],
    ) -> VersionOutcome {
        let mut results = StepResults::default();
        let mut reports = Vec::with_capacity(pipeline.steps().len());
        let mut failed = false;

        for step in pipeline.steps() {
            let step = step.as_ref();
            let started = Instant::now();
            let mut step_error = None;

            let status = if failed || !step.applies_to(version) {
                StepStatus::NotRun
            } else if let Some(missing) = step.inputs().into_iter().find(|k| results.output(k).is_none()) {
                debug!(
                    "{} {}: input {} unavailable, not running",
                    step.name(),
                    version,
                    missing
                );
                StepStatus::NotRun
            } else {
                let ctx = StepContext {
                    version,
                    app: self.app,
                    storage,
                    results: &results,
                    predecessors,
                };
                match self.execute_step(step, &ctx).await {
                    Ok(status) => status,
                    Err(e) => {
                        error!("{} {} failed: {}", step.name(), version, e);
                        step_error = Some(e.to_string());
                        StepStatus::Failed
                    }
                }
            };

            if status.is_failed() {
                failed = true;
            } else if status.produced_output() {
                for key in step.outputs() {
                    let path = storage.resolve(&key, version);
                    results.record_output(key, path);
                }
            }
            results.record_status(step.name(), status);
            reports.push(StepReport {
                step: step.name().to_string(),
                status,
                elapsed: started.elapsed(),
                error: step_error,
            });
        }

        let outcome = VersionOutcome {
            version: version.clone(),
            steps: reports,
            results: Arc::new(results),
            blocked_by: None,
        };
        info!("{} {}: {}", pipeline.name(), version, outcome.status());
        outcome
    }

    /// Short-circuit with `UpToDate` when every declared output is already
    /// present and accepted by the step.
    async fn execute_step(&self, step: &dyn Step, ctx: &StepContext<'_>) -> CoreResult<StepStatus> {
        if self.outputs_up_to_date(step, ctx).await? {
            debug!("{} {}: outputs up to date", step.name(), ctx.version);
            return Ok(StepStatus::UpToDate);
        }
        step.run(ctx).await
    }

    async fn outputs_up_to_date(&self, step: &dyn Step, ctx: &StepContext<'_>) -> CoreResult<bool> {
        let outputs = step.outputs();
        if outputs.is_empty() {
            return Ok(false);
        }
        for key in &outputs {
            let path = ctx.path_of(key);
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {}
                _ => return Ok(false),
            }
            if !step.output_is_valid(ctx, key, &path).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
