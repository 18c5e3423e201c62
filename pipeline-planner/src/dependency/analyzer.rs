// Dependency Analyzer
// Expands step selections so required predecessors are never silently skipped

use crate::dependency::graph::DependencyGraph;
use crate::filter::options::FilterOptions;
use crate::filter::step_filter::StepFilter;
use crate::pipeline::models::Pipeline;

use std::collections::{BTreeMap, BTreeSet};

pub struct DependencyAnalyzer;

impl DependencyAnalyzer {
    /// Add every transitive dependency of the selected steps to the selection
    ///
    /// Returns the options unchanged unless `include_dependencies` is set and at least one
    /// inclusion criterion is present. Otherwise the result selects exactly the expanded
    /// 1-based step indices of each job; names and ranges are cleared, skips and job
    /// filters kept.
    pub fn expand_with_dependencies(options: &FilterOptions, pipeline: &Pipeline) -> FilterOptions {
        if !options.include_dependencies() || !options.has_inclusion_criteria() {
            return options.clone();
        }

        let filter = StepFilter::new(options.clone());
        let mut expanded = BTreeMap::new();

        for job in &pipeline.jobs {
            let graph = DependencyGraph::build(job);
            let mut indices = BTreeSet::new();

            for (pos, step) in job.steps.iter().enumerate() {
                let index = pos + 1;
                if !filter.should_execute(step, index, job).should_execute {
                    continue;
                }
                indices.insert(index);
                indices.extend(graph.transitive_dependency_indices(index));
            }

            if !indices.is_empty() {
                expanded.insert(job.id.clone(), indices);
            }
        }

        // An empty selection would read as "no criteria" and select everything
        if expanded.is_empty() {
            tracing::debug!("step selection matched nothing; leaving filter unexpanded");
            return options.clone();
        }

        tracing::debug!(
            indices = ?expanded,
            "expanded step selection with dependencies"
        );

        options.with_expanded_indices(expanded)
    }
}
