// Pipeline Model
// Provider-neutral jobs and steps consumed by the planning core

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named collection of jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// Pipeline name
    #[serde(default)]
    pub name: Option<String>,

    /// Jobs in declaration order
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// A job: an ordered sequence of steps sharing a target runner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Job identifier
    pub id: String,

    /// Display name in output
    #[serde(default)]
    pub name: Option<String>,

    /// Target runner label (e.g. "ubuntu-latest")
    #[serde(default)]
    pub runs_on: Option<String>,

    /// Job-level dependencies (informational, not expanded by the planner)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Custom container image the job runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Service containers started alongside the job
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,

    /// Job-level environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Steps in execution order
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    /// Create a job with the given identifier and steps
    pub fn new(id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            steps,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_runs_on(mut self, runs_on: impl Into<String>) -> Self {
        self.runs_on = Some(runs_on.into());
        self
    }

    /// Name shown to users: display name, falling back to the identifier
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Check whether `candidate` names this job (id or display name, case-insensitive)
    pub fn matches_name(&self, candidate: &str) -> bool {
        self.id.eq_ignore_ascii_case(candidate)
            || self
                .name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(candidate))
    }
}

/// A single unit of work within a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step identifier for references
    #[serde(default)]
    pub id: Option<String>,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    /// Kind of action the step performs (e.g. "checkout", "script", "docker-build")
    #[serde(rename = "type", default = "default_step_type")]
    pub step_type: String,

    /// Explicit predecessors within the same job, by id or name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Script body for script-like steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Action arguments
    #[serde(default, rename = "with", skip_serializing_if = "BTreeMap::is_empty")]
    pub with: BTreeMap<String, String>,

    /// Step-level environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_step_type() -> String {
    "script".to_string()
}

impl Default for Step {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            step_type: default_step_type(),
            needs: Vec::new(),
            run: None,
            with: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}

impl Step {
    /// Create a script step with a display name
    pub fn script(name: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            run: Some(run.into()),
            ..Default::default()
        }
    }

    /// Create a step of the given type with a display name
    pub fn of_type(step_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            step_type: step_type.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_needs<I, S>(mut self, needs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.needs = needs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with.insert(name.into(), value.into());
        self
    }

    /// Graph key: id, then name, then `step_<index>` (index is 1-based)
    pub fn key(&self, index: usize) -> String {
        self.id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("step_{}", index))
    }

    /// Name shown to users
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| format!("step_{}", index))
    }

    /// Check whether `candidate` names this step (id or name, case-insensitive)
    pub fn matches_name(&self, candidate: &str) -> bool {
        self.id
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case(candidate))
            || self
                .name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(candidate))
    }
}
