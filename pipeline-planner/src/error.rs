// Planner Errors
// Top-level error type for loading and planning a pipeline

use crate::config::ConfigError;
use crate::runners::RunnerError;
use crate::variables::{ExpansionError, SecretError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pipeline YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pipeline JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no job matches '{0}'")]
    UnknownJob(String),

    #[error("steps in job '{job}' form a dependency cycle")]
    CyclicSteps { job: String },

    #[error("job '{job}' has step needs that match no step: {}", .references.join(", "))]
    UnresolvedNeeds { job: String, references: Vec<String> },

    #[error("failed to expand variables in job '{job}': {source}")]
    JobExpansion {
        job: String,
        #[source]
        source: ExpansionError,
    },

    #[error("failed to expand variables in step '{step}' of job '{job}': {source}")]
    StepExpansion {
        job: String,
        step: String,
        #[source]
        source: ExpansionError,
    },

    #[error("planning was cancelled")]
    Cancelled,
}

impl PlannerError {
    /// Remediation hint for errors that have one
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            PlannerError::Runner(err) => err.remediation(),
            PlannerError::UnresolvedNeeds { .. } => {
                Some("Check the step ids and names listed in 'needs', or set planner.unresolvedNeeds to 'warn'")
            }
            PlannerError::StepExpansion {
                source: ExpansionError::RequiredVariableMissing { .. },
                ..
            } => Some("Provide the variable with --var NAME=value, VAR_NAME in the environment, or the config file"),
            _ => None,
        }
    }
}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
