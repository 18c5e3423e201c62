// Execution Planner
// Turns a pipeline, filter options and a runner request into an ExecutionPlan

use crate::config::{Configuration, UnresolvedNeedsPolicy};
use crate::dependency::{DependencyAnalyzer, DependencyGraph, DependencyValidator};
use crate::error::{PlannerError, PlannerResult};
use crate::execution::events::{NullReporter, PlanEvent, PlanReporter};
use crate::execution::plan::{ExecutionPlan, PlanWarning, PlannedJob, PlannedStep};
use crate::filter::{FilterOptions, FilterResult, StepFilter};
use crate::pipeline::models::{Job, Pipeline, Step};
use crate::runners::{AvailabilityProbe, RunnerCapabilities, RunnerSelectionResult, RunnerSelector, RunnerType};
use crate::variables::{ScopedVariables, VariableExpander, VariableResolver};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct ExecutionPlanner {
    config: Configuration,
    resolver: Arc<VariableResolver>,
    selector: RunnerSelector,
    expander: VariableExpander,
    reporter: Arc<dyn PlanReporter>,
}

impl ExecutionPlanner {
    pub fn new(
        config: Configuration,
        resolver: Arc<VariableResolver>,
        probe: Arc<dyn AvailabilityProbe>,
    ) -> Self {
        let selector = RunnerSelector::new(config.runner.clone(), probe);
        let expander = VariableExpander::with_max_depth(config.planner.max_expansion_depth);
        Self {
            config,
            resolver,
            selector,
            expander,
            reporter: NullReporter::shared(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn PlanReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn resolver(&self) -> &VariableResolver {
        &self.resolver
    }

    /// Build a plan
    ///
    /// Fails on an unknown job name or a runner selection failure. For a job
    /// with executing steps it also fails on a capability mismatch, a dependency
    /// cycle, unresolved `needs` under the `error` policy, or a variable
    /// expansion failure in an executing step.
    pub async fn plan(
        &self,
        pipeline: &Pipeline,
        options: &FilterOptions,
        mode: RunnerType,
        cancel: &CancellationToken,
    ) -> PlannerResult<ExecutionPlan> {
        let start = Instant::now();
        let pipeline_name = pipeline.name.clone().unwrap_or_else(|| "pipeline".to_string());

        self.reporter.report(PlanEvent::PlanningStarted {
            pipeline_name: pipeline_name.clone(),
            total_jobs: pipeline.jobs.len(),
        });

        Self::check_job_names(options, pipeline)?;

        let options = DependencyAnalyzer::expand_with_dependencies(options, pipeline);
        let filter = StepFilter::new(options);

        let runner = self.selector.select(mode, None, cancel).await?;
        self.reporter.report(PlanEvent::RunnerSelected {
            runner: runner.runner,
            is_fallback: runner.is_fallback,
            reason: runner.reason.clone(),
        });

        let mut warnings = Vec::new();
        if let Some(message) = &runner.warning {
            self.reporter.report(PlanEvent::warning(message.clone(), None));
            warnings.push(PlanWarning::Runner {
                message: message.clone(),
            });
        }

        let mut jobs = Vec::with_capacity(pipeline.jobs.len());
        for job in &pipeline.jobs {
            if cancel.is_cancelled() {
                return Err(PlannerError::Cancelled);
            }
            jobs.push(self.plan_job(pipeline, job, &filter, &runner, &mut warnings)?);
        }

        let plan = ExecutionPlan {
            pipeline_name: pipeline.name.clone(),
            runner,
            jobs,
            warnings,
        };

        let executing_steps = plan.executing_steps().count();
        tracing::info!(
            pipeline = %pipeline_name,
            runner = %plan.runner.runner,
            executing_steps,
            total_steps = plan.total_steps(),
            "execution plan ready"
        );
        self.reporter.report(PlanEvent::PlanningCompleted {
            pipeline_name,
            executing_steps,
            duration: start.elapsed(),
        });

        Ok(plan)
    }

    /// Fail with [`PlannerError::UnknownJob`] for a job filter entry that matches no job
    pub fn check_job_names(options: &FilterOptions, pipeline: &Pipeline) -> PlannerResult<()> {
        for name in options.job_names() {
            if !pipeline.jobs.iter().any(|job| job.matches_name(name)) {
                return Err(PlannerError::UnknownJob(name.clone()));
            }
        }
        Ok(())
    }

    fn plan_job(
        &self,
        pipeline: &Pipeline,
        job: &Job,
        filter: &StepFilter,
        runner: &RunnerSelectionResult,
        warnings: &mut Vec<PlanWarning>,
    ) -> PlannerResult<PlannedJob> {
        let graph = DependencyGraph::build(job);

        let verdicts: Vec<_> = job
            .steps
            .iter()
            .enumerate()
            .map(|(pos, step)| filter.should_execute(step, pos + 1, job))
            .collect();
        let executing = verdicts.iter().filter(|v| v.should_execute).count();

        let unresolved = graph.unresolved_needs();
        if !unresolved.is_empty() {
            match self.config.planner.unresolved_needs {
                UnresolvedNeedsPolicy::Error if executing > 0 => {
                    return Err(PlannerError::UnresolvedNeeds {
                        job: job.display_name().to_string(),
                        references: unresolved.iter().map(|n| n.reference.clone()).collect(),
                    });
                }
                UnresolvedNeedsPolicy::Error => {
                    tracing::debug!(job = %job.id, "unresolved needs in a job with nothing to run");
                }
                UnresolvedNeedsPolicy::Warn => {
                    for need in unresolved {
                        let warning = PlanWarning::UnresolvedNeed(need.clone());
                        tracing::warn!(job = %job.id, step = %need.step_id, "{}", warning);
                        self.reporter
                            .report(PlanEvent::warning(warning.to_string(), Some(job.id.clone())));
                        warnings.push(warning);
                    }
                }
            }
        }

        // A job with nothing to run keeps its steps in index order
        let order = match graph.topological_order() {
            Some(order) => order,
            None if executing == 0 => graph.nodes().iter().collect(),
            None => {
                return Err(PlannerError::CyclicSteps {
                    job: job.display_name().to_string(),
                })
            }
        };

        if executing > 0 {
            RunnerCapabilities::validate_job(runner.runner, job)?;
        }

        for warning in DependencyValidator::validate_job(filter, job) {
            self.reporter
                .report(PlanEvent::warning(warning.to_string(), Some(job.id.clone())));
            warnings.push(PlanWarning::SkippedDependency(warning));
        }

        let job_env = if executing > 0 {
            let scope = self.job_scope(pipeline, job, runner.runner);
            self.expander
                .expand_map(&job.env, &scope)
                .map_err(|source| PlannerError::JobExpansion {
                    job: job.display_name().to_string(),
                    source,
                })?
        } else {
            job.env.clone()
        };

        let mut steps = Vec::with_capacity(order.len());
        for node in order {
            let pos = node.index - 1;
            let step = &job.steps[pos];
            let verdict = verdicts[pos].clone();

            self.reporter.report(PlanEvent::StepPlanned {
                job_id: job.id.clone(),
                step_index: node.index,
                step_name: node.display_name.clone(),
                should_execute: verdict.should_execute,
                reason: verdict.reason.clone(),
            });

            let planned = if verdict.should_execute {
                let scope = self.job_scope(pipeline, job, runner.runner);
                self.materialize(scope, job, step, node.index, verdict, &job_env)?
            } else {
                Self::unexpanded(step, node.index, verdict, &job.env)
            };

            steps.push(planned);
        }

        self.reporter.report(PlanEvent::JobPlanned {
            job_id: job.id.clone(),
            executing,
            skipped: job.steps.len() - executing,
        });

        Ok(PlannedJob {
            id: job.id.clone(),
            name: job.display_name().to_string(),
            runs_on: job.runs_on.clone(),
            steps,
        })
    }

    fn job_scope<'a>(
        &'a self,
        pipeline: &Pipeline,
        job: &Job,
        runner: RunnerType,
    ) -> ScopedVariables<'a> {
        ScopedVariables::new(&self.resolver)
            .with(
                "PIPELINE_NAME",
                pipeline.name.clone().unwrap_or_default(),
            )
            .with("JOB_ID", job.id.clone())
            .with("JOB_NAME", job.display_name())
            .with("RUNNER_TYPE", runner.as_str())
    }

    /// Expand `run`, `with` and `env` of an executing step
    fn materialize(
        &self,
        scope: ScopedVariables<'_>,
        job: &Job,
        step: &Step,
        index: usize,
        verdict: FilterResult,
        job_env: &BTreeMap<String, String>,
    ) -> PlannerResult<PlannedStep> {
        let key = step.key(index);
        let scope = scope
            .with("STEP_ID", key.clone())
            .with("STEP_NAME", step.display_name(index))
            .with("STEP_INDEX", index.to_string());

        let step_error = |source| PlannerError::StepExpansion {
            job: job.display_name().to_string(),
            step: step.display_name(index),
            source,
        };

        let run = step
            .run
            .as_deref()
            .map(|run| self.expander.expand(run, &scope))
            .transpose()
            .map_err(step_error)?;
        let with = self.expander.expand_map(&step.with, &scope).map_err(step_error)?;

        let mut env = job_env.clone();
        env.extend(self.expander.expand_map(&step.env, &scope).map_err(step_error)?);

        Ok(PlannedStep {
            index,
            id: key,
            name: step.display_name(index),
            step_type: step.step_type.clone(),
            verdict,
            run,
            with,
            env,
        })
    }

    fn unexpanded(
        step: &Step,
        index: usize,
        verdict: FilterResult,
        job_env: &BTreeMap<String, String>,
    ) -> PlannedStep {
        let mut env = job_env.clone();
        env.extend(step.env.clone());

        PlannedStep {
            index,
            id: step.key(index),
            name: step.display_name(index),
            step_type: step.step_type.clone(),
            verdict,
            run: step.run.clone(),
            with: step.with.clone(),
            env,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FallbackPolicy;
    use crate::execution::events::plan_channel;
    use crate::filter::SkipReason;
    use crate::runners::{BackendStatus, RunnerError, UnavailableReason};
    use crate::variables::{ExpansionError, VariableSource};

    struct StaticProbe(BackendStatus);

    #[async_trait::async_trait]
    impl AvailabilityProbe for StaticProbe {
        async fn status(&self, _cancel: &CancellationToken) -> Result<BackendStatus, RunnerError> {
            Ok(self.0.clone())
        }

        async fn refresh(&self, _cancel: &CancellationToken) -> Result<BackendStatus, RunnerError> {
            Ok(self.0.clone())
        }
    }

    fn docker_up() -> Arc<dyn AvailabilityProbe> {
        Arc::new(StaticProbe(BackendStatus::available(
            Some("27.1.1".to_string()),
            None,
        )))
    }

    fn docker_down() -> Arc<dyn AvailabilityProbe> {
        Arc::new(StaticProbe(BackendStatus::unavailable(
            UnavailableReason::NotRunning,
            "Cannot connect to the Docker daemon",
        )))
    }

    fn resolver() -> Arc<VariableResolver> {
        Arc::new(VariableResolver::with_builtins(BTreeMap::new()))
    }

    fn pipeline() -> Pipeline {
        Pipeline {
            name: Some("ci".to_string()),
            jobs: vec![Job::new(
                "build",
                vec![
                    Step::script("install", "npm ci").with_id("install"),
                    Step::script("test", "npm test -- --region ${REGION}")
                        .with_id("test")
                        .with_needs(["install"]),
                    Step::script("deploy", "deploy --to ${TARGET:?deploy target required}")
                        .with_id("deploy")
                        .with_needs(["test"])
                        .with_env("STEP", "${STEP_NAME}"),
                ],
            )],
        }
    }

    #[tokio::test]
    async fn test_plan_expands_executing_steps() {
        let resolver = resolver();
        resolver.set_variable("REGION", "eu-west-1", VariableSource::Cli);
        resolver.set_variable("TARGET", "staging", VariableSource::Configuration);

        let planner = ExecutionPlanner::new(Configuration::default(), resolver, docker_up());
        let plan = planner
            .plan(&pipeline(), &FilterOptions::new(), RunnerType::Auto, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(plan.runner.runner, RunnerType::Docker);
        assert!(plan.warnings.is_empty());

        let steps = &plan.jobs[0].steps;
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].run.as_deref(), Some("npm test -- --region eu-west-1"));
        assert_eq!(steps[2].run.as_deref(), Some("deploy --to staging"));
        assert_eq!(steps[2].env.get("STEP").map(String::as_str), Some("deploy"));
        assert!(steps.iter().all(|s| s.verdict.should_execute));
    }

    #[tokio::test]
    async fn test_skipped_steps_are_not_expanded() {
        let planner = ExecutionPlanner::new(Configuration::default(), resolver(), docker_up());
        let options = FilterOptions::new().with_skip_steps(["deploy"]);

        let plan = planner
            .plan(&pipeline(), &options, RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap();

        let deploy = &plan.jobs[0].steps[2];
        assert!(!deploy.verdict.should_execute);
        assert_eq!(deploy.verdict.skip_reason, Some(SkipReason::ExplicitlySkipped));
        assert_eq!(
            deploy.run.as_deref(),
            Some("deploy --to ${TARGET:?deploy target required}")
        );
        assert_eq!(plan.executing_steps().count(), 2);
    }

    #[tokio::test]
    async fn test_required_variable_fails_executing_step() {
        let planner = ExecutionPlanner::new(Configuration::default(), resolver(), docker_up());

        let err = planner
            .plan(&pipeline(), &FilterOptions::new(), RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PlannerError::StepExpansion { step, source, .. } => {
                assert_eq!(step, "deploy");
                assert!(matches!(source, ExpansionError::RequiredVariableMissing { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_include_dependencies_selects_predecessors() {
        let resolver = resolver();
        resolver.set_variable("REGION", "us-east-1", VariableSource::Cli);
        let planner = ExecutionPlanner::new(Configuration::default(), resolver, docker_up());
        let options = FilterOptions::new()
            .with_step_names(["test"])
            .with_include_dependencies(true);

        let plan = planner
            .plan(&pipeline(), &options, RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap();

        let executing: Vec<_> = plan.executing_steps().map(|(_, s)| s.id.as_str()).collect();
        assert_eq!(executing, ["install", "test"]);
        assert!(plan.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_dependency_is_reported() {
        let resolver = resolver();
        resolver.set_variable("REGION", "us-east-1", VariableSource::Cli);
        let planner = ExecutionPlanner::new(Configuration::default(), resolver, docker_up());
        let options = FilterOptions::new().with_step_names(["test"]);

        let plan = planner
            .plan(&pipeline(), &options, RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(plan.warnings.len(), 1);
        assert!(matches!(
            &plan.warnings[0],
            PlanWarning::SkippedDependency(w) if w.dependency.id == "install"
        ));
    }

    #[tokio::test]
    async fn test_fallback_warning_in_plan() {
        let resolver = resolver();
        resolver.set_variable("REGION", "us-east-1", VariableSource::Cli);
        resolver.set_variable("TARGET", "prod", VariableSource::Cli);
        let (tx, mut rx) = plan_channel();

        let planner = ExecutionPlanner::new(Configuration::default(), resolver, docker_down())
            .with_reporter(Arc::new(tx));
        let plan = planner
            .plan(&pipeline(), &FilterOptions::new(), RunnerType::Auto, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(plan.runner.runner, RunnerType::Host);
        assert!(plan.runner.is_fallback);
        assert!(matches!(plan.warnings[0], PlanWarning::Runner { .. }));

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(PlanEvent::PlanningStarted { .. })));
        assert!(matches!(events.last(), Some(PlanEvent::PlanningCompleted { executing_steps: 3, .. })));
    }

    #[tokio::test]
    async fn test_no_fallback_policy_fails() {
        let mut config = Configuration::default();
        config.runner.fallback = FallbackPolicy::None;
        let planner = ExecutionPlanner::new(config, resolver(), docker_down());

        let err = planner
            .plan(&pipeline(), &FilterOptions::new(), RunnerType::Auto, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Runner(RunnerError::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_host_capability_mismatch() {
        let planner = ExecutionPlanner::new(Configuration::default(), resolver(), docker_up());
        let pipeline = Pipeline {
            name: None,
            jobs: vec![Job::new(
                "integration",
                vec![Step::of_type("service-container", "postgres")],
            )],
        };

        let err = planner
            .plan(&pipeline, &FilterOptions::new(), RunnerType::Host, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlannerError::Runner(RunnerError::CapabilityMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_cycle_aborts_job() {
        let planner = ExecutionPlanner::new(Configuration::default(), resolver(), docker_up());
        let pipeline = Pipeline {
            name: None,
            jobs: vec![Job::new(
                "loop",
                vec![
                    Step::script("a", "a").with_needs(["b"]),
                    Step::script("b", "b"),
                ],
            )],
        };

        let err = planner
            .plan(&pipeline, &FilterOptions::new(), RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::CyclicSteps { job } if job == "loop"));
    }

    #[tokio::test]
    async fn test_unresolved_needs_policy() {
        let pipeline = Pipeline {
            name: None,
            jobs: vec![Job::new(
                "build",
                vec![Step::script("a", "a"), Step::script("b", "b").with_needs(["lint"])],
            )],
        };

        let planner = ExecutionPlanner::new(Configuration::default(), resolver(), docker_up());
        let plan = planner
            .plan(&pipeline, &FilterOptions::new(), RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(&plan.warnings[0], PlanWarning::UnresolvedNeed(n) if n.reference == "lint"));

        let mut config = Configuration::default();
        config.planner.unresolved_needs = UnresolvedNeedsPolicy::Error;
        let planner = ExecutionPlanner::new(config, resolver(), docker_up());
        let err = planner
            .plan(&pipeline, &FilterOptions::new(), RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::UnresolvedNeeds { references, .. } if references == ["lint"]));
    }

    #[tokio::test]
    async fn test_unknown_job_name() {
        let planner = ExecutionPlanner::new(Configuration::default(), resolver(), docker_up());
        let options = FilterOptions::new().with_job_names(["release"]);

        let err = planner
            .plan(&pipeline(), &options, RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::UnknownJob(name) if name == "release"));
    }

    #[test]
    fn test_check_job_names() {
        let pipeline = Pipeline {
            name: None,
            jobs: vec![Job::new("build", vec![Step::script("a", "a")]).with_name("Build Job")],
        };

        let by_id = FilterOptions::new().with_job_names(["build"]);
        let by_name = FilterOptions::new().with_job_names(["build job"]);
        assert!(ExecutionPlanner::check_job_names(&by_id, &pipeline).is_ok());
        assert!(ExecutionPlanner::check_job_names(&by_name, &pipeline).is_ok());

        let typo = FilterOptions::new().with_job_names(["build", "biuld"]);
        let err = ExecutionPlanner::check_job_names(&typo, &pipeline).unwrap_err();
        assert!(matches!(err, PlannerError::UnknownJob(name) if name == "biuld"));
    }

    #[tokio::test]
    async fn test_plan_serializes_to_json() {
        let resolver = resolver();
        resolver.set_variable("REGION", "us-east-1", VariableSource::Cli);
        resolver.set_variable("TARGET", "prod", VariableSource::Cli);
        let planner = ExecutionPlanner::new(Configuration::default(), resolver, docker_up());

        let plan = planner
            .plan(&pipeline(), &FilterOptions::new(), RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap();
        let json = serde_json::to_value(&plan).unwrap();

        assert_eq!(json["runner"]["runner"], "docker");
        assert_eq!(json["jobs"][0]["steps"][0]["verdict"]["shouldExecute"], true);
        assert_eq!(json["jobs"][0]["steps"][1]["stepType"], "script");
    }

    #[tokio::test]
    async fn test_deselected_job_does_not_abort_plan() {
        let pipeline = Pipeline {
            name: None,
            jobs: vec![
                Job::new("build", vec![Step::script("a", "make")]),
                Job::new(
                    "other",
                    vec![
                        Step::script("x", "x").with_needs(["y", "missing"]),
                        Step::script("y", "y"),
                    ],
                ),
            ],
        };
        let options = FilterOptions::new().with_job_names(["build"]);

        let mut config = Configuration::default();
        config.planner.unresolved_needs = UnresolvedNeedsPolicy::Error;
        let planner = ExecutionPlanner::new(config, resolver(), docker_up());

        let plan = planner
            .plan(&pipeline, &options, RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap();

        let executing: Vec<_> = plan
            .executing_steps()
            .map(|(job, step)| (job.id.as_str(), step.id.as_str()))
            .collect();
        assert_eq!(executing, [("build", "a")]);

        let other: Vec<_> = plan.jobs[1].steps.iter().map(|s| s.index).collect();
        assert_eq!(other, [1, 2]);
        assert!(plan.jobs[1].steps.iter().all(|s| !s.verdict.should_execute));

        let only_other = FilterOptions::new().with_job_names(["other"]);
        let err = planner
            .plan(&pipeline, &only_other, RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::UnresolvedNeeds { job, .. } if job == "other"));
    }

    #[tokio::test]
    async fn test_include_dependencies_leaves_other_jobs_alone() {
        let pipeline = Pipeline {
            name: None,
            jobs: vec![
                Job::new(
                    "build",
                    vec![Step::script("a", "a"), Step::script("b", "b"), Step::script("c", "c")],
                ),
                Job::new(
                    "lint",
                    vec![Step::script("x", "x"), Step::script("y", "y"), Step::script("z", "z")],
                ),
            ],
        };
        let options = FilterOptions::new()
            .with_step_names(["c"])
            .with_include_dependencies(true);
        let planner = ExecutionPlanner::new(Configuration::default(), resolver(), docker_up());

        let plan = planner
            .plan(&pipeline, &options, RunnerType::Docker, &CancellationToken::new())
            .await
            .unwrap();

        let executing: Vec<_> = plan
            .executing_steps()
            .map(|(job, step)| format!("{}:{}", job.id, step.name))
            .collect();
        assert_eq!(executing, ["build:a", "build:b", "build:c"]);
        assert!(plan.jobs[1]
            .steps
            .iter()
            .all(|s| s.verdict.skip_reason == Some(SkipReason::FilteredOut)));
    }
}
