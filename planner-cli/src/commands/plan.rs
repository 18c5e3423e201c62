use crate::output;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use pipeline_planner::execution::{plan_channel, ExecutionPlan};
use pipeline_planner::filter::parse_step_index;
use pipeline_planner::{
    Configuration, DependencyAnalyzer, DockerProbe, ExecutionPlanner, FilterOptions,
    FilterPreview, PipelineParser, PlanEvent, RunnerType, StepFilter, StepRange,
    VariableResolver,
};

/// Build an execution plan for a pipeline
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the pipeline YAML or JSON file
    pub pipeline: PathBuf,

    /// Plan only these jobs (id or name, can be repeated)
    #[arg(long = "job", value_name = "JOB")]
    pub jobs: Vec<String>,

    /// Select steps by id or name (can be repeated)
    #[arg(long = "step", value_name = "NAME")]
    pub steps: Vec<String>,

    /// Select steps by 1-based position (can be repeated)
    #[arg(long = "index", value_name = "N", value_parser = parse_step_index)]
    pub indices: Vec<usize>,

    /// Select a range of steps, e.g. 2-4 or build..test (can be repeated)
    #[arg(long = "range", value_name = "START..END")]
    pub ranges: Vec<StepRange>,

    /// Skip steps by id or name (can be repeated)
    #[arg(long = "skip", value_name = "NAME")]
    pub skip: Vec<String>,

    /// Also select every step the selected steps depend on
    #[arg(long)]
    pub include_deps: bool,

    /// Execution backend: auto, docker or host
    #[arg(long, value_name = "RUNNER", default_value = "auto")]
    pub runner: RunnerType,

    /// Configuration file (default: ~/.pipeline-planner/config.yaml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Set a variable (can be repeated, format: name=value)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub variables: Vec<String>,

    /// Show which steps the filter selects without selecting a runner
    #[arg(long)]
    pub preview: bool,

    /// Show the selection and ask before planning
    #[arg(long)]
    pub confirm: bool,

    /// Print machine-readable JSON on stdout
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: PlanArgs) -> Result<()> {
    let config = Configuration::load_or_default(args.config.as_deref())?;

    output::status("Parsing", &format!("{}", args.pipeline.display()));
    let pipeline = PipelineParser::from_file(&args.pipeline)?;

    let resolver = Arc::new(VariableResolver::new());
    resolver.load_configuration(&config);
    resolver.load_process_environment();
    resolver.load_cli_overrides(parse_assignments(&args.variables)?);

    let options = FilterOptions::new()
        .with_job_names(args.jobs.iter().cloned())
        .with_step_names(args.steps.iter().cloned())
        .with_step_indices(args.indices.iter().copied())
        .with_step_ranges(args.ranges.iter().cloned())
        .with_skip_steps(args.skip.iter().cloned())
        .with_include_dependencies(args.include_deps)
        .with_preview(args.preview)
        .with_confirm(args.confirm);

    if options.preview() || options.confirm() {
        if let Err(err) = ExecutionPlanner::check_job_names(&options, &pipeline) {
            output::error(&err.to_string());
            std::process::exit(1);
        }

        let expanded = DependencyAnalyzer::expand_with_dependencies(&options, &pipeline);
        let preview = FilterPreview::generate(&StepFilter::new(expanded), &pipeline);

        if args.json && options.preview() {
            println!("{}", serde_json::to_string_pretty(&preview)?);
            return Ok(());
        }
        print_preview(&preview);

        if options.preview() {
            return Ok(());
        }
        if !confirm(&format!("Plan {} of {} steps?", preview.executed, preview.total))? {
            output::warning("Cancelled");
            return Ok(());
        }
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let probe = Arc::new(DockerProbe::new(Duration::from_secs(
        config.runner.probe_timeout_secs,
    )));
    let (tx, mut rx) = plan_channel();
    let planner = ExecutionPlanner::new(config, Arc::clone(&resolver), probe)
        .with_reporter(Arc::new(tx));

    let runner = args.runner;
    let plan_handle = tokio::spawn(async move {
        planner.plan(&pipeline, &options, runner, &cancel).await
    });

    while let Some(event) = rx.recv().await {
        match event {
            PlanEvent::RunnerSelected { runner, reason, .. } => {
                output::status("Runner", &format!("{} ({})", runner, reason));
            }
            PlanEvent::Warning { message, .. } => output::warning(&message),
            PlanEvent::PlanningCompleted {
                executing_steps,
                duration,
                ..
            } => {
                output::success(&format!(
                    "Planned {} steps in {:.2}s",
                    executing_steps,
                    duration.as_secs_f64()
                ));
            }
            _ => {}
        }
    }

    let plan = match plan_handle.await? {
        Ok(plan) => plan,
        Err(err) => {
            output::error(&err.to_string());
            if let Some(hint) = err.remediation() {
                output::info(hint);
            }
            std::process::exit(1);
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&plan)?;
        println!("{}", resolver.mask(&json));
    } else {
        print_plan(&plan, &resolver);
    }

    Ok(())
}

fn parse_assignments(assignments: &[String]) -> Result<Vec<(String, String)>> {
    assignments
        .iter()
        .map(|assignment| match assignment.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => color_eyre::eyre::bail!(
                "Invalid variable format '{}'. Expected name=value",
                assignment
            ),
        })
        .collect()
}

fn confirm(question: &str) -> Result<bool> {
    eprint!("{} [y/N] ", question);
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn print_preview(preview: &FilterPreview) {
    output::header(&format!(
        "{} of {} steps selected",
        preview.executed, preview.total
    ));

    let mut current_job = None;
    for step in &preview.steps {
        if current_job != Some(&step.job_id) {
            current_job = Some(&step.job_id);
            let executing = preview
                .steps
                .iter()
                .filter(|s| s.job_id == step.job_id && s.result.should_execute)
                .count();
            let total = preview.steps.iter().filter(|s| s.job_id == step.job_id).count();
            output::job_header(&step.job_name, executing, total);
        }
        output::step(
            step.index,
            &step.step_name,
            step.result.should_execute,
            &step.result.reason,
        );
    }

    for warning in &preview.warnings {
        output::warning(&warning.to_string());
    }
}

fn print_plan(plan: &ExecutionPlan, resolver: &VariableResolver) {
    println!();
    output::header(&format!(
        "Plan for '{}' on {}{}",
        plan.pipeline_name.as_deref().unwrap_or("pipeline"),
        plan.runner.runner,
        if plan.runner.is_fallback { " (fallback)" } else { "" }
    ));
    if let Some(version) = &plan.runner.backend_version {
        output::dim(&format!("  docker {}", version));
    }

    for job in &plan.jobs {
        output::job_header(&job.name, job.executing().count(), job.steps.len());
        for step in &job.steps {
            output::step(
                step.index,
                &step.name,
                step.verdict.should_execute,
                &step.verdict.reason,
            );
            if !step.verdict.should_execute {
                continue;
            }
            if let Some(run) = &step.run {
                for line in resolver.mask(run).lines() {
                    output::step_detail(line);
                }
            }
        }
    }
}
