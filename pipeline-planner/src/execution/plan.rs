// Execution Plan
// Ordered, filtered and fully resolved steps ready for a runner

use crate::dependency::{DependencyWarning, UnresolvedNeed};
use crate::filter::FilterResult;
use crate::runners::RunnerSelectionResult;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Result of a planning pass
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub pipeline_name: Option<String>,
    pub runner: RunnerSelectionResult,
    pub jobs: Vec<PlannedJob>,
    pub warnings: Vec<PlanWarning>,
}

impl ExecutionPlan {
    /// Steps that will run, across all jobs
    pub fn executing_steps(&self) -> impl Iterator<Item = (&PlannedJob, &PlannedStep)> {
        self.jobs
            .iter()
            .flat_map(|job| job.executing().map(move |step| (job, step)))
    }

    pub fn total_steps(&self) -> usize {
        self.jobs.iter().map(|job| job.steps.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedJob {
    pub id: String,
    pub name: String,
    pub runs_on: Option<String>,
    /// Every step in dependency order, skipped ones included
    pub steps: Vec<PlannedStep>,
}

impl PlannedJob {
    pub fn executing(&self) -> impl Iterator<Item = &PlannedStep> {
        self.steps.iter().filter(|step| step.verdict.should_execute)
    }
}

/// A step with its filter verdict
///
/// `run`, `with` and `env` hold expanded values for executing steps and the
/// text as written for skipped ones.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    /// 1-based position in the job
    pub index: usize,
    pub id: String,
    pub name: String,
    pub step_type: String,
    pub verdict: FilterResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Non-fatal findings attached to a plan
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PlanWarning {
    Runner { message: String },
    SkippedDependency(DependencyWarning),
    UnresolvedNeed(UnresolvedNeed),
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::Runner { message } => f.write_str(message),
            PlanWarning::SkippedDependency(warning) => write!(f, "{}", warning),
            PlanWarning::UnresolvedNeed(need) => write!(
                f,
                "step '{}' (#{}) in job '{}' needs '{}', which matches no step",
                need.step_id, need.step_index, need.job_name, need.reference
            ),
        }
    }
}
