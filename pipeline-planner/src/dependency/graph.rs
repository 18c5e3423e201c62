// Step Dependency Graph
// Per-job graph of step ordering constraints built from sequencing and `needs`

use crate::pipeline::models::Job;

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// A step in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepNode {
    /// Graph key (`id`, then `name`, then `step_<index>`)
    pub id: String,
    /// Name shown to users
    pub display_name: String,
    /// 1-based position within the job
    pub index: usize,
    /// Owning job identifier
    pub job_name: String,
}

/// A `needs` entry that matched no step in the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedNeed {
    pub job_name: String,
    pub step_id: String,
    pub step_index: usize,
    pub reference: String,
}

/// Directed graph where an edge `a -> b` means "a depends on b"
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    job_name: String,
    nodes: Vec<StepNode>,
    /// Lookup of node position by key
    node_indices: HashMap<String, usize>,
    /// Position -> positions it depends on
    dependencies: Vec<Vec<usize>>,
    /// Position -> positions that depend on it
    dependents: Vec<Vec<usize>>,
    unresolved: Vec<UnresolvedNeed>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Build the step graph for a job
    pub fn build(job: &Job) -> Self {
        let count = job.steps.len();
        let mut nodes = Vec::with_capacity(count);
        let mut node_indices = HashMap::with_capacity(count);

        for (pos, step) in job.steps.iter().enumerate() {
            let index = pos + 1;
            let id = step.key(index);
            node_indices.insert(id.clone(), pos);
            nodes.push(StepNode {
                id,
                display_name: step.display_name(index),
                index,
                job_name: job.id.clone(),
            });
        }

        let mut graph = Self {
            job_name: job.id.clone(),
            nodes,
            node_indices,
            dependencies: vec![Vec::new(); count],
            dependents: vec![Vec::new(); count],
            unresolved: Vec::new(),
        };

        // Implicit sequencing: every step waits for the one before it
        for pos in 1..count {
            graph.add_edge(pos, pos - 1);
        }

        for (pos, step) in job.steps.iter().enumerate() {
            for reference in &step.needs {
                match Self::resolve_reference(job, reference) {
                    Some(target) => graph.add_edge(pos, target),
                    None => {
                        tracing::debug!(
                            job = %job.id,
                            step = %graph.nodes[pos].id,
                            reference = %reference,
                            "ignoring unresolved step reference"
                        );
                        graph.unresolved.push(UnresolvedNeed {
                            job_name: job.id.clone(),
                            step_id: graph.nodes[pos].id.clone(),
                            step_index: pos + 1,
                            reference: reference.clone(),
                        });
                    }
                }
            }
        }

        graph
    }

    /// Resolve a `needs` entry: id match first, then display name (case-insensitive)
    fn resolve_reference(job: &Job, reference: &str) -> Option<usize> {
        job.steps
            .iter()
            .position(|s| {
                s.id
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(reference))
            })
            .or_else(|| {
                job.steps.iter().position(|s| {
                    s.name
                        .as_deref()
                        .is_some_and(|name| name.eq_ignore_ascii_case(reference))
                })
            })
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if !self.dependencies[from].contains(&to) {
            self.dependencies[from].push(to);
            self.dependents[to].push(from);
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by key
    pub fn node(&self, id: &str) -> Option<&StepNode> {
        self.node_indices.get(id).map(|&pos| &self.nodes[pos])
    }

    /// Get a node by 1-based index
    pub fn node_at(&self, index: usize) -> Option<&StepNode> {
        index.checked_sub(1).and_then(|pos| self.nodes.get(pos))
    }

    /// References that matched no step
    pub fn unresolved_needs(&self) -> &[UnresolvedNeed] {
        &self.unresolved
    }

    pub fn direct_dependencies(&self, id: &str) -> Vec<&StepNode> {
        self.neighbours(id, &self.dependencies)
    }

    pub fn direct_dependents(&self, id: &str) -> Vec<&StepNode> {
        self.neighbours(id, &self.dependents)
    }

    /// Every step `id` depends on, directly or through other steps, in index order
    pub fn transitive_dependencies(&self, id: &str) -> Vec<&StepNode> {
        self.closure(id, &self.dependencies)
    }

    /// Every step that depends on `id`, directly or through other steps, in index order
    pub fn transitive_dependents(&self, id: &str) -> Vec<&StepNode> {
        self.closure(id, &self.dependents)
    }

    /// 1-based indices of every transitive dependency of the step at `index`
    pub fn transitive_dependency_indices(&self, index: usize) -> BTreeSet<usize> {
        match index.checked_sub(1).filter(|&pos| pos < self.nodes.len()) {
            Some(pos) => self
                .reachable(pos, &self.dependencies)
                .into_iter()
                .map(|p| p + 1)
                .collect(),
            None => BTreeSet::new(),
        }
    }

    fn neighbours<'a>(&'a self, id: &str, adjacency: &[Vec<usize>]) -> Vec<&'a StepNode> {
        let Some(&pos) = self.node_indices.get(id) else {
            return Vec::new();
        };
        let mut positions = adjacency[pos].clone();
        positions.sort_unstable();
        positions.into_iter().map(|p| &self.nodes[p]).collect()
    }

    fn closure<'a>(&'a self, id: &str, adjacency: &[Vec<usize>]) -> Vec<&'a StepNode> {
        let Some(&pos) = self.node_indices.get(id) else {
            return Vec::new();
        };
        self.reachable(pos, adjacency)
            .into_iter()
            .map(|p| &self.nodes[p])
            .collect()
    }

    /// Positions reachable from `start` (excluding `start` itself)
    fn reachable(&self, start: usize, adjacency: &[Vec<usize>]) -> BTreeSet<usize> {
        let mut visited = BTreeSet::new();
        let mut stack = adjacency[start].clone();

        while let Some(pos) = stack.pop() {
            if pos == start || !visited.insert(pos) {
                continue;
            }
            stack.extend(adjacency[pos].iter().copied());
        }

        visited
    }

    /// Detect a cycle using DFS with a recursion stack
    pub fn has_cycle(&self) -> bool {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (position, next edge to explore)
            let mut stack = vec![(root, 0usize)];
            marks[root] = Mark::InProgress;

            while let Some(frame) = stack.last_mut() {
                let (pos, next) = *frame;
                if let Some(&dep) = self.dependencies[pos].get(next) {
                    frame.1 += 1;
                    match marks[dep] {
                        Mark::InProgress => return true,
                        Mark::Unvisited => {
                            marks[dep] = Mark::InProgress;
                            stack.push((dep, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[pos] = Mark::Done;
                    stack.pop();
                }
            }
        }

        false
    }

    /// Steps ordered so dependencies precede dependents, or `None` if the graph has a cycle
    pub fn topological_order(&self) -> Option<Vec<&StepNode>> {
        if self.has_cycle() {
            return None;
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut post_order = Vec::with_capacity(self.nodes.len());

        for root in 0..self.nodes.len() {
            if visited[root] {
                continue;
            }

            let mut stack = vec![(root, 0usize)];
            visited[root] = true;

            while let Some(frame) = stack.last_mut() {
                let (pos, next) = *frame;
                let mut children = self.dependents[pos].clone();
                children.sort_unstable();

                if let Some(&child) = children.get(next) {
                    frame.1 += 1;
                    if !visited[child] {
                        visited[child] = true;
                        stack.push((child, 0));
                    }
                } else {
                    post_order.push(pos);
                    stack.pop();
                }
            }
        }

        post_order.reverse();
        Some(post_order.into_iter().map(|p| &self.nodes[p]).collect())
    }
}
