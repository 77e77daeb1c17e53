// ─── Step Pipeline ───
// Declarative per-version task lists run over a version graph.
//
//   storage.rs   artifact keys and where they live on disk
//   step.rs      the Step trait and the context handed to step bodies
//   executor.rs  caching, status composition and graph traversal
//   builtin.rs   steps shipped with the crate

pub mod builtin;
pub mod executor;
pub mod step;
pub mod storage;

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::core::error::{CoreError, CoreResult};

pub use builtin::FetchArtifactStep;
pub use executor::{PipelineReport, PipelineRunner, StepReport, VersionOutcome};
pub use step::{Step, StepContext, StepResults};
pub use storage::{DirectoryStorageRoot, StorageKey, StorageRoot};

/// A validated, ordered list of steps.
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    /// True when any step needs predecessor results.
    pub fn order_sensitive(&self) -> bool {
        self.steps.iter().any(|s| s.order_sensitive())
    }
}

pub struct PipelineBuilder {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl PipelineBuilder {
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn boxed_step(mut self, step: Box<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Reject duplicate step names, inputs no earlier step produces and
    /// outputs produced twice.
    pub fn build(self) -> CoreResult<Pipeline> {
        if self.steps.is_empty() {
            return Err(CoreError::PipelineDefinition(format!(
                "pipeline '{}' has no steps",
                self.name
            )));
        }

        let mut names = HashSet::new();
        let mut produced: BTreeMap<StorageKey, &str> = BTreeMap::new();
        for step in &self.steps {
            if !names.insert(step.name()) {
                return Err(CoreError::PipelineDefinition(format!(
                    "step name '{}' is used twice",
                    step.name()
                )));
            }
            for input in step.inputs() {
                if !produced.contains_key(&input) {
                    return Err(CoreError::PipelineDefinition(format!(
                        "step '{}' consumes {} which no earlier step produces",
                        step.name(),
                        input
                    )));
                }
            }
            for output in step.outputs() {
                if let Some(previous) = produced.insert(output.clone(), step.name()) {
                    return Err(CoreError::PipelineDefinition(format!(
                        "{} is produced by both '{}' and '{}'",
                        output,
                        previous,
                        step.name()
                    )));
                }
            }
        }

        debug!(
            "Pipeline '{}' validated: {} step(s), {} output(s)",
            self.name,
            self.steps.len(),
            produced.len()
        );
        Ok(Pipeline {
            name: self.name,
            steps: self.steps,
        })
    }
}
