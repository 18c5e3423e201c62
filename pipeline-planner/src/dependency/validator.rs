// Dependency Validator
// Warns when selected steps depend on steps the filter skips

use crate::dependency::graph::{DependencyGraph, StepNode, UnresolvedNeed};
use crate::filter::step_filter::{SkipReason, StepFilter};
use crate::pipeline::models::{Job, Pipeline};

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A selected step transitively depends on a step that will be skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyWarning {
    pub step: StepNode,
    pub dependency: StepNode,
    pub dependency_skip_reason: SkipReason,
}

impl fmt::Display for DependencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "step '{}' (#{}) in job '{}' depends on '{}' (#{}), which is skipped: {}",
            self.step.display_name,
            self.step.index,
            self.step.job_name,
            self.dependency.display_name,
            self.dependency.index,
            self.dependency_skip_reason
        )
    }
}

pub struct DependencyValidator;

impl DependencyValidator {
    /// Emit one warning per (executing step, skipped transitive dependency) pair
    pub fn validate_job(filter: &StepFilter, job: &Job) -> Vec<DependencyWarning> {
        let graph = DependencyGraph::build(job);

        let mut skipped: HashMap<usize, SkipReason> = HashMap::new();
        let mut executing = Vec::new();

        for (pos, step) in job.steps.iter().enumerate() {
            let index = pos + 1;
            let result = filter.should_execute(step, index, job);
            match result.skip_reason {
                Some(reason) if !result.should_execute => {
                    skipped.insert(index, reason);
                }
                _ => executing.push(index),
            }
        }

        let mut warnings = Vec::new();
        for index in executing {
            let Some(step) = graph.node_at(index) else {
                continue;
            };
            for dep_index in graph.transitive_dependency_indices(index) {
                let (Some(&reason), Some(dependency)) =
                    (skipped.get(&dep_index), graph.node_at(dep_index))
                else {
                    continue;
                };
                tracing::warn!(
                    job = %job.id,
                    step = %step.id,
                    dependency = %dependency.id,
                    reason = %reason,
                    "selected step depends on a skipped step"
                );
                warnings.push(DependencyWarning {
                    step: step.clone(),
                    dependency: dependency.clone(),
                    dependency_skip_reason: reason,
                });
            }
        }

        warnings
    }

    /// Validate every job of a pipeline, in job order
    pub fn validate_pipeline(filter: &StepFilter, pipeline: &Pipeline) -> Vec<DependencyWarning> {
        pipeline
            .jobs
            .iter()
            .flat_map(|job| Self::validate_job(filter, job))
            .collect()
    }

    /// `needs` references in a job that match no step
    pub fn unresolved_needs(job: &Job) -> Vec<UnresolvedNeed> {
        DependencyGraph::build(job).unresolved_needs().to_vec()
    }
}
