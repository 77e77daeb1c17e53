use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one unit of pipeline or download work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Nothing applicable or available for this version.
    NotRun,
    /// Output already present and valid; no work done.
    UpToDate,
    /// New work happened.
    Success,
    Failed,
}

impl StepStatus {
    fn precedence(self) -> u8 {
        match self {
            StepStatus::NotRun => 0,
            StepStatus::UpToDate => 1,
            StepStatus::Success => 2,
            StepStatus::Failed => 3,
        }
    }

    /// Combine two sub-results: `Failed` absorbs, then `Success`, then
    /// `UpToDate`, then `NotRun`.
    pub fn merge(self, other: StepStatus) -> StepStatus {
        if self.precedence() >= other.precedence() {
            self
        } else {
            other
        }
    }

    pub fn merge_all(statuses: impl IntoIterator<Item = StepStatus>) -> StepStatus {
        statuses
            .into_iter()
            .fold(StepStatus::NotRun, StepStatus::merge)
    }

    pub fn is_failed(self) -> bool {
        self == StepStatus::Failed
    }

    /// True when the step's outputs are usable by later steps.
    pub fn produced_output(self) -> bool {
        matches!(self, StepStatus::UpToDate | StepStatus::Success)
    }
}

impl FromIterator<StepStatus> for StepStatus {
    fn from_iter<I: IntoIterator<Item = StepStatus>>(iter: I) -> Self {
        StepStatus::merge_all(iter)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::NotRun => "NOT_RUN",
            StepStatus::UpToDate => "UP_TO_DATE",
            StepStatus::Success => "SUCCESS",
            StepStatus::Failed => "FAILED",
        };
        f.write_str(label)
    }
}
