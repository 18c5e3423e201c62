// Planner Configuration
// Variables, runner defaults and planning policy loaded from YAML

use crate::runners::RunnerType;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// What automatic selection does when Docker is unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Run on the host instead
    #[default]
    Host,
    /// Fail the planning pass
    None,
}

/// How unresolved step `needs` references are surfaced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedNeedsPolicy {
    /// Add a warning to the plan
    #[default]
    Warn,
    /// Abort planning for the job
    Error,
}

/// Runner selection defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerSettings {
    /// Mode used when the caller asks for `auto`
    pub default: RunnerType,
    pub fallback: FallbackPolicy,
    /// Probe Docker before selecting it; when off Docker is assumed available
    pub docker_availability_check: bool,
    pub show_host_mode_warnings: bool,
    /// Upper bound on a single availability probe
    pub probe_timeout_secs: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default: RunnerType::Auto,
            fallback: FallbackPolicy::Host,
            docker_availability_check: true,
            show_host_mode_warnings: true,
            probe_timeout_secs: 5,
        }
    }
}

/// Planning policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannerSettings {
    pub max_expansion_depth: usize,
    pub unresolved_needs: UnresolvedNeedsPolicy,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_expansion_depth: crate::variables::DEFAULT_MAX_DEPTH,
            unresolved_needs: UnresolvedNeedsPolicy::Warn,
        }
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    /// Variables loaded at `Configuration` precedence
    pub variables: BTreeMap<String, String>,
    pub runner: RunnerSettings,
    pub planner: PlannerSettings,
}

impl Configuration {
    /// Default location: ~/.pipeline-planner/config.yaml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pipeline-planner")
            .join("config.yaml")
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes as null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Load a configuration file that must exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let config = Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load an explicit file, or the default file when present, or built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}
