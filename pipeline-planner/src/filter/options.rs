// Filter Options
// Immutable step selection criteria: names, indices, ranges, skips and jobs

use crate::pipeline::models::Job;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing filter criteria
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid step index '{0}': indices are 1-based positive integers")]
    InvalidIndex(String),

    #[error("invalid step range '{0}': expected 'N-M' or 'first..last'")]
    InvalidRange(String),
}

/// A contiguous run of steps, by position or by boundary step names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepRange {
    /// Inclusive 1-based index range
    Indices { start: usize, end: usize },
    /// Inclusive range between two named steps of the same job
    Names { start: String, end: String },
}

impl StepRange {
    pub fn indices(start: usize, end: usize) -> Self {
        StepRange::Indices { start, end }
    }

    pub fn names(start: impl Into<String>, end: impl Into<String>) -> Self {
        StepRange::Names {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Check whether the step at `index` (1-based) in `job` falls within this range
    pub fn contains(&self, index: usize, job: &Job) -> bool {
        let bounds = match self {
            StepRange::Indices { start, end } => Some((*start, *end)),
            StepRange::Names { start, end } => {
                let find = |name: &str| {
                    job.steps
                        .iter()
                        .position(|s| s.matches_name(name))
                        .map(|pos| pos + 1)
                };
                find(start).zip(find(end))
            }
        };

        match bounds {
            Some((a, b)) => (a.min(b)..=a.max(b)).contains(&index),
            None => false,
        }
    }
}

impl FromStr for StepRange {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some((start, end)) = s.split_once("..") {
            let (start, end) = (start.trim(), end.trim());
            if start.is_empty() || end.is_empty() {
                return Err(FilterError::InvalidRange(s.to_string()));
            }
            return match (start.parse::<usize>(), end.parse::<usize>()) {
                (Ok(a), Ok(b)) if a > 0 && b > 0 => Ok(StepRange::indices(a, b)),
                _ => Ok(StepRange::names(start, end)),
            };
        }

        if let Some((start, end)) = s.split_once('-') {
            if let (Ok(a), Ok(b)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>()) {
                if a > 0 && b > 0 {
                    return Ok(StepRange::indices(a, b));
                }
            }
        }

        Err(FilterError::InvalidRange(s.to_string()))
    }
}

impl fmt::Display for StepRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepRange::Indices { start, end } => write!(f, "{}-{}", start, end),
            StepRange::Names { start, end } => write!(f, "{}..{}", start, end),
        }
    }
}

/// Parse a 1-based step index
pub fn parse_step_index(s: &str) -> Result<usize, FilterError> {
    match s.trim().parse::<usize>() {
        Ok(index) if index > 0 => Ok(index),
        _ => Err(FilterError::InvalidIndex(s.to_string())),
    }
}

/// Step selection criteria
///
/// A step executes if it matches at least one inclusion criterion (or none are given),
/// is not named in the skip list, and its job passes the job filter (if any).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    step_names: Vec<String>,
    step_indices: BTreeSet<usize>,
    /// 1-based indices per job id, set by dependency expansion
    job_step_indices: BTreeMap<String, BTreeSet<usize>>,
    step_ranges: Vec<StepRange>,
    skip_steps: Vec<String>,
    job_names: Vec<String>,
    include_dependencies: bool,
    preview: bool,
    confirm: bool,
}

impl FilterOptions {
    /// Options that select every step
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.step_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_step_indices<I>(mut self, indices: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        self.step_indices.extend(indices);
        self
    }

    pub fn with_step_ranges<I>(mut self, ranges: I) -> Self
    where
        I: IntoIterator<Item = StepRange>,
    {
        self.step_ranges.extend(ranges);
        self
    }

    pub fn with_skip_steps<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_steps.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_job_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.job_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_include_dependencies(mut self, include: bool) -> Self {
        self.include_dependencies = include;
        self
    }

    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    /// Replace every inclusion criterion with exact index sets keyed by job id,
    /// keeping skips and job filters
    ///
    /// Jobs missing from `indices` have no step selected.
    pub fn with_expanded_indices(&self, indices: BTreeMap<String, BTreeSet<usize>>) -> Self {
        Self {
            step_names: Vec::new(),
            step_indices: BTreeSet::new(),
            job_step_indices: indices,
            step_ranges: Vec::new(),
            ..self.clone()
        }
    }

    pub fn step_names(&self) -> &[String] {
        &self.step_names
    }

    pub fn step_indices(&self) -> &BTreeSet<usize> {
        &self.step_indices
    }

    pub fn job_step_indices(&self) -> &BTreeMap<String, BTreeSet<usize>> {
        &self.job_step_indices
    }

    /// Whether `index` is selected for the job `job_id`, by a global or per-job index
    pub fn selects_index(&self, job_id: &str, index: usize) -> bool {
        self.step_indices.contains(&index)
            || self
                .job_step_indices
                .get(job_id)
                .is_some_and(|indices| indices.contains(&index))
    }

    pub fn step_ranges(&self) -> &[StepRange] {
        &self.step_ranges
    }

    pub fn skip_steps(&self) -> &[String] {
        &self.skip_steps
    }

    pub fn job_names(&self) -> &[String] {
        &self.job_names
    }

    pub fn include_dependencies(&self) -> bool {
        self.include_dependencies
    }

    pub fn preview(&self) -> bool {
        self.preview
    }

    pub fn confirm(&self) -> bool {
        self.confirm
    }

    /// True when any name, index or range criterion is present
    pub fn has_inclusion_criteria(&self) -> bool {
        !self.step_names.is_empty()
            || !self.step_indices.is_empty()
            || !self.job_step_indices.is_empty()
            || !self.step_ranges.is_empty()
    }

    pub fn has_job_filter(&self) -> bool {
        !self.job_names.is_empty()
    }

    /// True when the options select everything
    pub fn is_empty(&self) -> bool {
        !self.has_inclusion_criteria() && self.skip_steps.is_empty() && !self.has_job_filter()
    }
}
