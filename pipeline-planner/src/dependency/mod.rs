// Dependency Analysis Module
// Step graphs, selection expansion and skipped-dependency validation

pub mod analyzer;
pub mod graph;
pub mod validator;

pub use analyzer::DependencyAnalyzer;
pub use graph::{DependencyGraph, StepNode, UnresolvedNeed};
pub use validator::{DependencyValidator, DependencyWarning};
