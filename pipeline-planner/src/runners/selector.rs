// Runner Selector
// Resolves a requested runner type to a concrete backend

use crate::config::{FallbackPolicy, RunnerSettings};
use crate::pipeline::models::Job;
use crate::runners::capabilities::RunnerCapabilities;
use crate::runners::probe::{AvailabilityProbe, BackendStatus};
use crate::runners::{RunnerError, RunnerType, UnavailableReason};

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Security notice shown whenever steps run directly on the host
pub const HOST_MODE_WARNING: &str = "Host mode runs steps directly on this machine with your \
user's permissions. Steps are not isolated from your files or network.";

/// Outcome of runner selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSelectionResult {
    /// Always `Docker` or `Host`
    pub runner: RunnerType,
    pub reason: String,
    pub is_fallback: bool,
    pub warning: Option<String>,
    pub backend_version: Option<String>,
}

pub struct RunnerSelector {
    settings: RunnerSettings,
    probe: Arc<dyn AvailabilityProbe>,
}

impl RunnerSelector {
    pub fn new(settings: RunnerSettings, probe: Arc<dyn AvailabilityProbe>) -> Self {
        Self { settings, probe }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Select a backend, then check `job` against its capabilities when given
    pub async fn select(
        &self,
        requested: RunnerType,
        job: Option<&Job>,
        cancel: &CancellationToken,
    ) -> Result<RunnerSelectionResult, RunnerError> {
        let selection = match requested {
            RunnerType::Host => self.host("host runner requested", false, None),
            RunnerType::Docker => self.docker_explicit(cancel).await?,
            RunnerType::Auto => self.auto(cancel).await?,
        };

        tracing::info!(
            requested = %requested,
            runner = %selection.runner,
            fallback = selection.is_fallback,
            reason = %selection.reason,
            "runner selected"
        );

        if let Some(job) = job {
            RunnerCapabilities::validate_job(selection.runner, job)?;
        }

        Ok(selection)
    }

    async fn docker_explicit(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RunnerSelectionResult, RunnerError> {
        let status = self.probe.status(cancel).await?;
        if status.available {
            return Ok(Self::docker("docker runner requested", &status));
        }
        Err(Self::unavailable(&status))
    }

    async fn auto(&self, cancel: &CancellationToken) -> Result<RunnerSelectionResult, RunnerError> {
        if self.settings.default == RunnerType::Host {
            return Ok(self.host("host is the configured default runner", false, None));
        }

        if !self.settings.docker_availability_check {
            return Ok(RunnerSelectionResult {
                runner: RunnerType::Docker,
                reason: "docker availability check disabled; assuming docker is available"
                    .to_string(),
                is_fallback: false,
                warning: None,
                backend_version: None,
            });
        }

        let status = self.probe.status(cancel).await?;
        if status.available {
            return Ok(Self::docker("docker is available", &status));
        }

        let err = Self::unavailable(&status);
        match self.settings.fallback {
            FallbackPolicy::None => Err(err),
            FallbackPolicy::Host => {
                tracing::warn!(error = %err, "docker unavailable, falling back to host");
                Ok(self.host(
                    "docker unavailable; falling back to host",
                    true,
                    Some(format!("{}. Falling back to host execution.", err)),
                ))
            }
        }
    }

    fn docker(reason: &str, status: &BackendStatus) -> RunnerSelectionResult {
        RunnerSelectionResult {
            runner: RunnerType::Docker,
            reason: reason.to_string(),
            is_fallback: false,
            warning: None,
            backend_version: status.version.clone(),
        }
    }

    fn host(&self, reason: &str, is_fallback: bool, cause: Option<String>) -> RunnerSelectionResult {
        let notice = self
            .settings
            .show_host_mode_warnings
            .then_some(HOST_MODE_WARNING);

        let warning = match (cause, notice) {
            (Some(cause), Some(notice)) => Some(format!("{} {}", cause, notice)),
            (Some(cause), None) => Some(cause),
            (None, notice) => notice.map(str::to_string),
        };

        RunnerSelectionResult {
            runner: RunnerType::Host,
            reason: reason.to_string(),
            is_fallback,
            warning,
            backend_version: None,
        }
    }

    fn unavailable(status: &BackendStatus) -> RunnerError {
        RunnerError::BackendUnavailable {
            runner: RunnerType::Docker,
            reason: status.error_kind.unwrap_or(UnavailableReason::Unknown),
            message: status
                .error_message
                .clone()
                .unwrap_or_else(|| "docker is unavailable".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::models::Step;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProbe {
        status: BackendStatus,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn up() -> Arc<Self> {
            Arc::new(Self {
                status: BackendStatus::available(Some("27.1.1".to_string()), None),
                calls: AtomicUsize::new(0),
            })
        }

        fn down(reason: UnavailableReason) -> Arc<Self> {
            Arc::new(Self {
                status: BackendStatus::unavailable(reason, "Cannot connect to the Docker daemon"),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl AvailabilityProbe for FakeProbe {
        async fn status(&self, cancel: &CancellationToken) -> Result<BackendStatus, RunnerError> {
            if cancel.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.status.clone())
        }

        async fn refresh(&self, cancel: &CancellationToken) -> Result<BackendStatus, RunnerError> {
            self.status(cancel).await
        }
    }

    fn settings(fallback: FallbackPolicy) -> RunnerSettings {
        RunnerSettings {
            fallback,
            ..RunnerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_host_request_carries_security_warning() {
        let probe = FakeProbe::up();
        let selector = RunnerSelector::new(RunnerSettings::default(), probe.clone());

        let result = selector
            .select(RunnerType::Host, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.runner, RunnerType::Host);
        assert!(!result.is_fallback);
        assert_eq!(result.warning.as_deref(), Some(HOST_MODE_WARNING));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_host_warning_can_be_disabled() {
        let settings = RunnerSettings {
            show_host_mode_warnings: false,
            ..RunnerSettings::default()
        };
        let selector = RunnerSelector::new(settings, FakeProbe::up());

        let result = selector
            .select(RunnerType::Host, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.warning.is_none());
    }

    #[tokio::test]
    async fn test_explicit_docker_unavailable_never_falls_back() {
        let selector = RunnerSelector::new(
            settings(FallbackPolicy::Host),
            FakeProbe::down(UnavailableReason::NotRunning),
        );

        let err = selector
            .select(RunnerType::Docker, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunnerError::BackendUnavailable {
                reason: UnavailableReason::NotRunning,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_explicit_docker_available() {
        let selector = RunnerSelector::new(RunnerSettings::default(), FakeProbe::up());
        let result = selector
            .select(RunnerType::Docker, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.runner, RunnerType::Docker);
        assert_eq!(result.backend_version.as_deref(), Some("27.1.1"));
        assert!(result.warning.is_none());
    }

    #[tokio::test]
    async fn test_auto_unavailable_with_no_fallback_errors() {
        let selector = RunnerSelector::new(
            settings(FallbackPolicy::None),
            FakeProbe::down(UnavailableReason::NotInstalled),
        );

        let err = selector
            .select(RunnerType::Auto, None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunnerError::BackendUnavailable {
                reason: UnavailableReason::NotInstalled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_auto_unavailable_falls_back_to_host() {
        let selector = RunnerSelector::new(
            settings(FallbackPolicy::Host),
            FakeProbe::down(UnavailableReason::NotRunning),
        );

        let result = selector
            .select(RunnerType::Auto, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.runner, RunnerType::Host);
        assert!(result.is_fallback);
        let warning = result.warning.unwrap();
        assert!(warning.contains("Cannot connect to the Docker daemon"));
        assert!(warning.contains(HOST_MODE_WARNING));
    }

    #[tokio::test]
    async fn test_auto_with_host_default_skips_probe() {
        let probe = FakeProbe::up();
        let settings = RunnerSettings {
            default: RunnerType::Host,
            ..RunnerSettings::default()
        };
        let selector = RunnerSelector::new(settings, probe.clone());

        let result = selector
            .select(RunnerType::Auto, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.runner, RunnerType::Host);
        assert!(!result.is_fallback);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_with_check_disabled_assumes_docker() {
        let probe = FakeProbe::down(UnavailableReason::NotRunning);
        let settings = RunnerSettings {
            docker_availability_check: false,
            ..RunnerSettings::default()
        };
        let selector = RunnerSelector::new(settings, probe.clone());

        let result = selector
            .select(RunnerType::Auto, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.runner, RunnerType::Docker);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_never_returns_auto() {
        for probe in [FakeProbe::up(), FakeProbe::down(UnavailableReason::Unknown)] {
            let selector = RunnerSelector::new(RunnerSettings::default(), probe);
            let result = selector
                .select(RunnerType::Auto, None, &CancellationToken::new())
                .await
                .unwrap();
            assert!(result.runner.is_concrete());
        }
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let selector = RunnerSelector::new(RunnerSettings::default(), FakeProbe::up());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = selector
            .select(RunnerType::Auto, None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, RunnerError::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_auto_does_not_fall_back_without_docker() {
        let probe = Arc::new(crate::runners::DockerProbe::with_binary(
            "definitely-not-a-real-docker-binary",
            std::time::Duration::from_secs(1),
        ));
        let selector = RunnerSelector::new(RunnerSettings::default(), probe);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = selector
            .select(RunnerType::Auto, None, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, RunnerError::Cancelled);
    }

    #[tokio::test]
    async fn test_host_rejects_isolated_only_step() {
        let selector = RunnerSelector::new(RunnerSettings::default(), FakeProbe::up());
        let job = Job::new(
            "integration",
            vec![
                Step::script("build", "make"),
                Step::of_type("service-container", "postgres"),
            ],
        );

        let err = selector
            .select(RunnerType::Host, Some(&job), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            RunnerError::CapabilityMismatch { features, .. } => {
                assert_eq!(features.len(), 1);
                assert!(features[0].contains("service-container"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_docker_accepts_isolated_only_step() {
        let selector = RunnerSelector::new(RunnerSettings::default(), FakeProbe::up());
        let job = Job::new(
            "integration",
            vec![Step::of_type("service-container", "postgres")],
        );

        let result = selector
            .select(RunnerType::Auto, Some(&job), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.runner, RunnerType::Docker);
    }
}
