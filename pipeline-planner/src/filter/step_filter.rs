// Step Filter
// Per-step execute/skip verdicts from filter options

use crate::filter::options::FilterOptions;
use crate::pipeline::models::{Job, Step};

use serde::Serialize;
use std::fmt;

/// Why a step will not execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SkipReason {
    /// No inclusion criterion matched the step
    FilteredOut,
    /// The step is named in the skip list
    ExplicitlySkipped,
    /// The step's job is not in the job filter
    JobNotSelected,
    /// A step this one depends on is skipped
    DependencySkipped,
}

impl SkipReason {
    pub fn description(&self) -> &'static str {
        match self {
            SkipReason::FilteredOut => "not matched by the step filter",
            SkipReason::ExplicitlySkipped => "explicitly skipped",
            SkipReason::JobNotSelected => "job not selected",
            SkipReason::DependencySkipped => "a dependency is skipped",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Verdict for a single step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    pub should_execute: bool,
    pub reason: String,
    pub skip_reason: Option<SkipReason>,
}

impl FilterResult {
    pub fn execute(reason: impl Into<String>) -> Self {
        Self {
            should_execute: true,
            reason: reason.into(),
            skip_reason: None,
        }
    }

    pub fn skip(skip_reason: SkipReason, reason: impl Into<String>) -> Self {
        Self {
            should_execute: false,
            reason: reason.into(),
            skip_reason: Some(skip_reason),
        }
    }
}

/// Predicate built from [`FilterOptions`]
#[derive(Debug, Clone)]
pub struct StepFilter {
    options: FilterOptions,
}

impl StepFilter {
    pub fn new(options: FilterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Decide whether the step at `index` (1-based) of `job` runs
    pub fn should_execute(&self, step: &Step, index: usize, job: &Job) -> FilterResult {
        let options = &self.options;

        if options.has_job_filter() && !options.job_names().iter().any(|j| job.matches_name(j)) {
            return FilterResult::skip(
                SkipReason::JobNotSelected,
                format!("job '{}' is not selected", job.display_name()),
            );
        }

        if let Some(skip) = options.skip_steps().iter().find(|s| step.matches_name(s)) {
            return FilterResult::skip(
                SkipReason::ExplicitlySkipped,
                format!("skipped by --skip '{}'", skip),
            );
        }

        if !options.has_inclusion_criteria() {
            return FilterResult::execute("no step filter applied");
        }

        if let Some(name) = options.step_names().iter().find(|n| step.matches_name(n)) {
            return FilterResult::execute(format!("selected by name '{}'", name));
        }

        if options.selects_index(&job.id, index) {
            return FilterResult::execute(format!("selected by index {}", index));
        }

        if let Some(range) = options.step_ranges().iter().find(|r| r.contains(index, job)) {
            return FilterResult::execute(format!("selected by range {}", range));
        }

        FilterResult::skip(
            SkipReason::FilteredOut,
            format!("step {} does not match any step filter", index),
        )
    }
}
