// Backend Availability Probe
// Checks whether the Docker daemon can be reached, with a cached result

use crate::runners::{RunnerError, UnavailableReason};

use serde::Serialize;
use std::io;
use std::process::Output;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Result of one availability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendStatus {
    pub available: bool,
    pub version: Option<String>,
    pub platform: Option<String>,
    pub error_kind: Option<UnavailableReason>,
    pub error_message: Option<String>,
}

impl BackendStatus {
    pub fn available(version: Option<String>, platform: Option<String>) -> Self {
        Self {
            available: true,
            version,
            platform,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn unavailable(reason: UnavailableReason, message: impl Into<String>) -> Self {
        Self {
            available: false,
            version: None,
            platform: None,
            error_kind: Some(reason),
            error_message: Some(message.into()),
        }
    }
}

/// Reports whether a backend can be used
///
/// `status` may serve a cached result; `refresh` always probes. Cancellation
/// surfaces as [`RunnerError::Cancelled`], never as an unavailable status.
#[async_trait::async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn status(&self, cancel: &CancellationToken) -> Result<BackendStatus, RunnerError>;

    async fn refresh(&self, cancel: &CancellationToken) -> Result<BackendStatus, RunnerError>;
}

/// Probes the Docker daemon through the `docker` CLI
pub struct DockerProbe {
    binary: String,
    timeout: Duration,
    cached: Mutex<Option<BackendStatus>>,
}

impl DockerProbe {
    pub fn new(timeout: Duration) -> Self {
        Self::with_binary("docker", timeout)
    }

    /// Probe a specific CLI binary (name on PATH or absolute path)
    pub fn with_binary(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            cached: Mutex::new(None),
        }
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<BackendStatus, RunnerError> {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let binary = self.binary.clone();
        let lookup = tokio::task::spawn_blocking(move || which::which(binary));
        let found = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
            found = lookup => found,
        };

        match found {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => {
                return Ok(BackendStatus::unavailable(
                    UnavailableReason::NotInstalled,
                    format!("'{}' was not found on PATH", self.binary),
                ));
            }
            Err(err) => {
                return Ok(BackendStatus::unavailable(
                    UnavailableReason::Unknown,
                    format!("looking up '{}' failed: {}", self.binary, err),
                ));
            }
        }

        let mut command = tokio::process::Command::new(&self.binary);
        command
            .arg("version")
            .arg("--format")
            .arg("{{.Server.Version}}|{{.Server.Os}}/{{.Server.Arch}}")
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
            result = tokio::time::timeout(self.timeout, command.output()) => result,
        };

        let status = match output {
            Err(_) => BackendStatus::unavailable(
                UnavailableReason::NotRunning,
                format!(
                    "the Docker daemon did not respond within {}s",
                    self.timeout.as_secs()
                ),
            ),
            Ok(Err(err)) => Self::classify_spawn_error(&err),
            Ok(Ok(output)) => Self::classify_output(&output),
        };

        tracing::debug!(
            available = status.available,
            version = status.version.as_deref().unwrap_or("-"),
            "docker availability probed"
        );

        Ok(status)
    }

    fn classify_spawn_error(err: &io::Error) -> BackendStatus {
        let reason = match err.kind() {
            io::ErrorKind::NotFound => UnavailableReason::NotInstalled,
            io::ErrorKind::PermissionDenied => UnavailableReason::PermissionDenied,
            _ => UnavailableReason::Unknown,
        };
        BackendStatus::unavailable(reason, err.to_string())
    }

    fn classify_output(output: &Output) -> BackendStatus {
        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let line = stdout.trim();
            let (version, platform) = match line.split_once('|') {
                Some((version, platform)) => (version.trim(), platform.trim()),
                None => (line, ""),
            };
            let non_empty = |s: &str| (!s.is_empty() && s != "/").then(|| s.to_string());
            return BackendStatus::available(non_empty(version), non_empty(platform));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr.trim();
        BackendStatus::unavailable(classify_failure(message), message)
    }
}

/// Map `docker` CLI error output to an unavailable classification
pub fn classify_failure(stderr: &str) -> UnavailableReason {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("permission denied") {
        UnavailableReason::PermissionDenied
    } else if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("error during connect")
        || lower.contains("connection refused")
    {
        UnavailableReason::NotRunning
    } else {
        UnavailableReason::Unknown
    }
}

#[async_trait::async_trait]
impl AvailabilityProbe for DockerProbe {
    async fn status(&self, cancel: &CancellationToken) -> Result<BackendStatus, RunnerError> {
        let mut cached = self.cached.lock().await;
        if let Some(status) = cached.as_ref() {
            return Ok(status.clone());
        }

        let status = self.probe(cancel).await?;
        *cached = Some(status.clone());
        Ok(status)
    }

    async fn refresh(&self, cancel: &CancellationToken) -> Result<BackendStatus, RunnerError> {
        let mut cached = self.cached.lock().await;
        let status = self.probe(cancel).await?;
        *cached = Some(status.clone());
        Ok(status)
    }
}
