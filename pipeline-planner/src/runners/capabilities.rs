// Runner Capabilities
// Static classification of job features into universal and container-only

use crate::pipeline::models::Job;
use crate::runners::{RunnerError, RunnerType};

/// Step types every backend can run
const UNIVERSAL_STEP_TYPES: &[&str] = &[
    "script",
    "run",
    "bash",
    "sh",
    "shell",
    "pwsh",
    "powershell",
    "cmd",
    "checkout",
    "artifact",
    "upload-artifact",
    "download-artifact",
    "publish",
    "download",
    "cache",
    "variables",
    "set-variable",
    "secret",
    "secrets",
    "docker-build",
    "npm",
    "yarn",
    "cargo",
    "dotnet",
    "make",
    "git",
];

/// Tool installer families (`setup-node`, `setup-python`, ...)
const UNIVERSAL_STEP_PREFIXES: &[&str] = &["setup-", "install-"];

/// Step types that need the isolated backend
const ISOLATED_ONLY_STEP_TYPES: &[&str] = &[
    "service",
    "services",
    "service-container",
    "container",
    "container-job",
    "custom-image",
    "network",
    "network-isolation",
];

/// Target-runner labels the host backend accepts
const HOST_LABELS: &[&str] = &[
    "local",
    "host",
    "self-hosted",
    "linux",
    "windows",
    "macos",
];

const HOST_LABEL_PREFIXES: &[&str] = &["ubuntu-", "windows-", "macos-"];

pub struct RunnerCapabilities;

impl RunnerCapabilities {
    pub fn is_isolated_only(step_type: &str) -> bool {
        let step_type = step_type.trim().to_ascii_lowercase();
        ISOLATED_ONLY_STEP_TYPES.contains(&step_type.as_str())
    }

    pub fn is_universal(step_type: &str) -> bool {
        let step_type = step_type.trim().to_ascii_lowercase();
        UNIVERSAL_STEP_TYPES.contains(&step_type.as_str())
            || UNIVERSAL_STEP_PREFIXES
                .iter()
                .any(|prefix| step_type.starts_with(prefix))
    }

    /// Unknown step types are assumed to run anywhere
    pub fn supports_step_type(runner: RunnerType, step_type: &str) -> bool {
        match runner {
            RunnerType::Host => {
                if !Self::is_universal(step_type) && !Self::is_isolated_only(step_type) {
                    tracing::debug!(step_type, "unclassified step type, treating as universal");
                }
                !Self::is_isolated_only(step_type)
            }
            RunnerType::Docker | RunnerType::Auto => true,
        }
    }

    /// Whether a `runs-on` label can be honored on the host
    pub fn is_standard_runner_label(label: &str) -> bool {
        let label = label.trim().to_ascii_lowercase();
        label.is_empty()
            || HOST_LABELS.contains(&label.as_str())
            || HOST_LABEL_PREFIXES
                .iter()
                .any(|prefix| label.starts_with(prefix))
    }

    /// Every feature of `job` the runner cannot provide, in job order
    pub fn unsupported_features(runner: RunnerType, job: &Job) -> Vec<String> {
        if runner != RunnerType::Host {
            return Vec::new();
        }

        let mut features = Vec::new();

        if let Some(runs_on) = &job.runs_on {
            if !Self::is_standard_runner_label(runs_on) {
                features.push(format!("runs-on '{}'", runs_on));
            }
        }
        if let Some(image) = &job.container {
            features.push(format!("container image '{}'", image));
        }
        if !job.services.is_empty() {
            features.push(format!("services: {}", job.services.join(", ")));
        }

        for (pos, step) in job.steps.iter().enumerate() {
            if !Self::supports_step_type(runner, &step.step_type) {
                features.push(format!(
                    "step type '{}' (step '{}')",
                    step.step_type,
                    step.display_name(pos + 1)
                ));
            }
        }

        features
    }

    /// Fail with every unsupported feature at once
    pub fn validate_job(runner: RunnerType, job: &Job) -> Result<(), RunnerError> {
        if !runner.is_concrete() {
            return Err(RunnerError::UnresolvedAuto);
        }

        let features = Self::unsupported_features(runner, job);
        if features.is_empty() {
            return Ok(());
        }

        Err(RunnerError::CapabilityMismatch {
            runner,
            job: job.display_name().to_string(),
            features,
        })
    }
}
