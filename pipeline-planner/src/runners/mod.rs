// Runners Module
// Backend selection, capability checks and the runner/executor registries

pub mod capabilities;
pub mod error;
pub mod probe;
pub mod selector;

// Re-export key types
pub use capabilities::RunnerCapabilities;
pub use error::{RunnerError, UnavailableReason};
pub use probe::{AvailabilityProbe, BackendStatus, DockerProbe};
pub use selector::{RunnerSelectionResult, RunnerSelector, HOST_MODE_WARNING};

use crate::execution::plan::{PlannedJob, PlannedStep};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Requested or selected execution backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerType {
    /// Pick Docker when available, otherwise apply the fallback policy
    #[default]
    Auto,
    /// Isolated container execution
    Docker,
    /// Direct execution on this machine
    Host,
}

impl RunnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerType::Auto => "auto",
            RunnerType::Docker => "docker",
            RunnerType::Host => "host",
        }
    }

    /// Concrete types can be instantiated; `Auto` cannot
    pub fn is_concrete(&self) -> bool {
        !matches!(self, RunnerType::Auto)
    }
}

impl fmt::Display for RunnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(RunnerType::Auto),
            "docker" => Ok(RunnerType::Docker),
            "host" => Ok(RunnerType::Host),
            other => Err(format!(
                "unknown runner '{}', expected one of: auto, docker, host",
                other
            )),
        }
    }
}

/// Outcome reported by a step executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Executes one kind of step (keyed by step type tag)
#[async_trait::async_trait]
pub trait StepExecutor: Send + Sync {
    /// Step type tag this executor handles
    fn step_type(&self) -> &str;

    async fn execute(&self, step: &PlannedStep, working_dir: &Path) -> StepOutcome;
}

/// Runs the planned steps of a job on one backend
#[async_trait::async_trait]
pub trait JobRunner: Send + Sync {
    fn runner_type(&self) -> RunnerType;

    async fn run_job(
        &self,
        job: &PlannedJob,
        executors: &ExecutorRegistry,
        working_dir: &Path,
    ) -> Vec<StepOutcome>;
}

/// Job runners keyed by concrete runner type
#[derive(Default, Clone)]
pub struct RunnerRegistry {
    runners: HashMap<RunnerType, Arc<dyn JobRunner>>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner; `Auto` runners are rejected
    pub fn register(&mut self, runner: Arc<dyn JobRunner>) -> Result<(), RunnerError> {
        let runner_type = runner.runner_type();
        if !runner_type.is_concrete() {
            return Err(RunnerError::UnresolvedAuto);
        }
        self.runners.insert(runner_type, runner);
        Ok(())
    }

    /// Look up the runner for a concrete type
    pub fn get(&self, runner_type: RunnerType) -> Result<Arc<dyn JobRunner>, RunnerError> {
        if !runner_type.is_concrete() {
            return Err(RunnerError::UnresolvedAuto);
        }
        self.runners
            .get(&runner_type)
            .cloned()
            .ok_or(RunnerError::NotRegistered(runner_type))
    }
}

/// Step executors keyed by lowercase step type tag
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn StepExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn StepExecutor>) {
        self.executors
            .insert(executor.step_type().to_ascii_lowercase(), executor);
    }

    pub fn get(&self, step_type: &str) -> Option<Arc<dyn StepExecutor>> {
        self.executors.get(&step_type.to_ascii_lowercase()).cloned()
    }

    pub fn supports(&self, step_type: &str) -> bool {
        self.executors.contains_key(&step_type.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct EchoExecutor;

    #[async_trait::async_trait]
    impl StepExecutor for EchoExecutor {
        fn step_type(&self) -> &str {
            "Script"
        }

        async fn execute(&self, step: &PlannedStep, _working_dir: &Path) -> StepOutcome {
            StepOutcome {
                success: true,
                exit_code: Some(0),
                output: step.run.clone().unwrap_or_default(),
            }
        }
    }

    struct SequentialRunner(RunnerType);

    #[async_trait::async_trait]
    impl JobRunner for SequentialRunner {
        fn runner_type(&self) -> RunnerType {
            self.0
        }

        async fn run_job(
            &self,
            job: &PlannedJob,
            executors: &ExecutorRegistry,
            working_dir: &Path,
        ) -> Vec<StepOutcome> {
            let mut outcomes = Vec::new();
            for step in job.steps.iter().filter(|s| s.verdict.should_execute) {
                if let Some(executor) = executors.get(&step.step_type) {
                    outcomes.push(executor.execute(step, working_dir).await);
                }
            }
            outcomes
        }
    }

    fn planned_step(run: &str) -> PlannedStep {
        PlannedStep {
            index: 1,
            id: "echo".to_string(),
            name: "echo".to_string(),
            step_type: "script".to_string(),
            verdict: crate::filter::FilterResult::execute("no step filter applied"),
            run: Some(run.to_string()),
            with: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn test_runner_type_parse_and_display() {
        assert_eq!("Docker".parse::<RunnerType>().unwrap(), RunnerType::Docker);
        assert_eq!(" host ".parse::<RunnerType>().unwrap(), RunnerType::Host);
        assert!("podman".parse::<RunnerType>().is_err());
        assert_eq!(RunnerType::Auto.to_string(), "auto");
        assert!(!RunnerType::Auto.is_concrete());
    }

    #[test]
    fn test_registry_rejects_auto() {
        let mut registry = RunnerRegistry::new();
        let result = registry.register(Arc::new(SequentialRunner(RunnerType::Auto)));
        assert!(matches!(result, Err(RunnerError::UnresolvedAuto)));
        assert!(matches!(
            registry.get(RunnerType::Auto),
            Err(RunnerError::UnresolvedAuto)
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = RunnerRegistry::new();
        registry
            .register(Arc::new(SequentialRunner(RunnerType::Host)))
            .unwrap();

        assert_eq!(
            registry.get(RunnerType::Host).unwrap().runner_type(),
            RunnerType::Host
        );
        assert!(matches!(
            registry.get(RunnerType::Docker),
            Err(RunnerError::NotRegistered(RunnerType::Docker))
        ));
    }

    #[tokio::test]
    async fn test_runner_dispatches_to_executor_by_tag() {
        let mut executors = ExecutorRegistry::new();
        executors.register(Arc::new(EchoExecutor));
        assert!(executors.supports("SCRIPT"));
        assert!(!executors.supports("checkout"));

        let job = PlannedJob {
            id: "build".to_string(),
            name: "build".to_string(),
            runs_on: None,
            steps: vec![planned_step("echo hi")],
        };

        let runner = SequentialRunner(RunnerType::Host);
        let outcomes = runner.run_job(&job, &executors, Path::new(".")).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].output, "echo hi");
    }
}
