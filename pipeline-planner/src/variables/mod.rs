// Variables Module
// Layered variable resolution and ${...} expansion

pub mod expander;
pub mod resolver;
pub mod secrets;

// Re-export key types
pub use expander::{ExpansionError, VariableExpander};
pub use resolver::{ScopedVariables, VariableLookup, VariableResolver, VariableSource, VariableValue};
pub use secrets::{InMemorySecretProvider, SecretError, SecretProvider};

/// Nesting limit for recursive expansion
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Replacement text for masked secret values
pub const SECRET_MASK: &str = "***";
