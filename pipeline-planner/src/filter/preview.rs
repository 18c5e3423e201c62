// Filter Preview
// Per-step verdicts, totals and dependency warnings across a whole pipeline

use crate::dependency::validator::{DependencyValidator, DependencyWarning};
use crate::filter::step_filter::{FilterResult, StepFilter};
use crate::pipeline::models::Pipeline;

use serde::Serialize;

/// Verdict for one step in the preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPreview {
    pub job_id: String,
    pub job_name: String,
    pub index: usize,
    pub step_id: String,
    pub step_name: String,
    pub step_type: String,
    pub result: FilterResult,
}

/// What a filter would do to a pipeline, without running anything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPreview {
    pub steps: Vec<StepPreview>,
    pub total: usize,
    pub executed: usize,
    pub skipped: usize,
    pub warnings: Vec<DependencyWarning>,
}

impl FilterPreview {
    pub fn generate(filter: &StepFilter, pipeline: &Pipeline) -> Self {
        let mut preview = FilterPreview::default();

        for job in &pipeline.jobs {
            for (pos, step) in job.steps.iter().enumerate() {
                let index = pos + 1;
                let result = filter.should_execute(step, index, job);

                if result.should_execute {
                    preview.executed += 1;
                } else {
                    preview.skipped += 1;
                }

                preview.steps.push(StepPreview {
                    job_id: job.id.clone(),
                    job_name: job.display_name().to_string(),
                    index,
                    step_id: step.key(index),
                    step_name: step.display_name(index),
                    step_type: step.step_type.clone(),
                    result,
                });
            }

            preview
                .warnings
                .extend(DependencyValidator::validate_job(filter, job));
        }

        preview.total = preview.steps.len();
        preview
    }

    /// Steps that will run, in pipeline order
    pub fn executing(&self) -> impl Iterator<Item = &StepPreview> {
        self.steps.iter().filter(|s| s.result.should_execute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::options::FilterOptions;
    use crate::filter::step_filter::SkipReason;
    use crate::pipeline::models::{Job, Step};

    fn pipeline() -> Pipeline {
        Pipeline {
            name: Some("ci".to_string()),
            jobs: vec![
                Job::new(
                    "build",
                    vec![
                        Step::of_type("checkout", "Checkout"),
                        Step::script("Compile", "make"),
                        Step::script("Test", "make test"),
                    ],
                ),
                Job::new("lint", vec![Step::script("Clippy", "cargo clippy")]),
            ],
        }
    }

    #[test]
    fn test_preview_counts() {
        let filter = StepFilter::new(
            FilterOptions::new()
                .with_job_names(["build"])
                .with_skip_steps(["compile"]),
        );
        let preview = FilterPreview::generate(&filter, &pipeline());

        assert_eq!(preview.total, 4);
        assert_eq!(preview.executed, 2);
        assert_eq!(preview.skipped, 2);
        assert_eq!(preview.steps[0].step_type, "checkout");
        assert_eq!(
            preview.steps[3].result.skip_reason,
            Some(SkipReason::JobNotSelected)
        );

        let running: Vec<_> = preview.executing().map(|s| s.step_name.as_str()).collect();
        assert_eq!(running, vec!["Checkout", "Test"]);
    }

    #[test]
    fn test_preview_collects_warnings() {
        let filter = StepFilter::new(FilterOptions::new().with_step_names(["test"]));
        let preview = FilterPreview::generate(&filter, &pipeline());

        assert_eq!(preview.executed, 1);
        assert_eq!(preview.warnings.len(), 2);
        assert!(preview.warnings.iter().all(|w| w.step.id == "Test"));
    }
}
