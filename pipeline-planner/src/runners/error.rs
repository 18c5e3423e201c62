// Runner error types
// Backend availability and capability failures with remediation hints

use crate::runners::RunnerType;

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a backend could not be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnavailableReason {
    NotInstalled,
    NotRunning,
    PermissionDenied,
    Unknown,
}

impl UnavailableReason {
    /// What the user can do about it
    pub fn remediation(&self) -> &'static str {
        match self {
            UnavailableReason::NotInstalled => {
                "Install Docker (https://docs.docker.com/get-docker/) or run with --runner host"
            }
            UnavailableReason::NotRunning => {
                "Start the Docker daemon (e.g. 'sudo systemctl start docker' or open Docker Desktop)"
            }
            UnavailableReason::PermissionDenied => {
                "Add your user to the 'docker' group ('sudo usermod -aG docker $USER') and log in again"
            }
            UnavailableReason::Unknown => {
                "Run 'docker version' to inspect the problem, or run with --runner host"
            }
        }
    }
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::NotInstalled => "not installed",
            UnavailableReason::NotRunning => "not running",
            UnavailableReason::PermissionDenied => "permission denied",
            UnavailableReason::Unknown => "unknown error",
        };
        f.write_str(text)
    }
}

/// Errors produced while selecting or validating a runner
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("{runner} backend is unavailable ({reason}): {message}")]
    BackendUnavailable {
        runner: RunnerType,
        reason: UnavailableReason,
        message: String,
    },

    #[error(
        "job '{job}' requires features the {runner} runner does not support: {}",
        .features.join(", ")
    )]
    CapabilityMismatch {
        runner: RunnerType,
        job: String,
        features: Vec<String>,
    },

    #[error("runner availability probe was cancelled")]
    Cancelled,

    #[error("runner type 'auto' must be resolved to docker or host before use")]
    UnresolvedAuto,

    #[error("no {0} runner is registered")]
    NotRegistered(RunnerType),
}

impl RunnerError {
    /// Remediation text for availability failures
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            RunnerError::BackendUnavailable { reason, .. } => Some(reason.remediation()),
            RunnerError::CapabilityMismatch { .. } => {
                Some("Run with --runner docker, or remove the container-only features from the job")
            }
            _ => None,
        }
    }
}
