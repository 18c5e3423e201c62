// Pipeline Planner Library
// Step selection, dependency analysis, runner selection and variable expansion
// for running CI/CD pipelines locally

pub mod config;
pub mod dependency;
pub mod error;
pub mod execution;
pub mod filter;
pub mod pipeline;
pub mod runners;
pub mod variables;

// Re-export commonly used types
pub use config::{Configuration, FallbackPolicy, RunnerSettings, UnresolvedNeedsPolicy};
pub use error::{PlannerError, PlannerResult};

// Re-export model types
pub use pipeline::{Job, Pipeline, PipelineParser, Step};

// Re-export dependency and filter types
pub use dependency::{DependencyAnalyzer, DependencyGraph, DependencyValidator, DependencyWarning};
pub use filter::{FilterOptions, FilterPreview, FilterResult, SkipReason, StepFilter, StepRange};

// Re-export runner types
pub use runners::{
    DockerProbe, ExecutorRegistry, JobRunner, RunnerCapabilities, RunnerError, RunnerRegistry,
    RunnerSelectionResult, RunnerSelector, RunnerType, StepExecutor,
};

// Re-export variable types
pub use variables::{ExpansionError, VariableExpander, VariableResolver, VariableSource};

// Re-export planning types
pub use execution::{ExecutionPlan, ExecutionPlanner, PlanEvent, PlanReporter};
