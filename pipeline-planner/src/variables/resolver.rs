// Variable Resolver
// Precedence-guarded variable store shared across planning tasks

use crate::config::Configuration;
use crate::variables::secrets::{SecretError, SecretProvider};
use crate::variables::SECRET_MASK;

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;

const SECRET_PREFIX: &str = "SECRET_";
const VAR_PREFIX: &str = "VAR_";

/// Where a variable value came from, lowest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableSource {
    BuiltIn,
    Configuration,
    Environment,
    Secret,
    Cli,
}

impl fmt::Display for VariableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VariableSource::BuiltIn => "built-in",
            VariableSource::Configuration => "configuration",
            VariableSource::Environment => "environment",
            VariableSource::Secret => "secret",
            VariableSource::Cli => "cli",
        };
        f.write_str(text)
    }
}

/// A stored value together with its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableValue {
    pub value: String,
    pub source: VariableSource,
}

/// Read access to variables by exact (case-sensitive) name
pub trait VariableLookup {
    fn lookup(&self, name: &str) -> Option<String>;
}

impl VariableLookup for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl VariableLookup for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Layered variable store
///
/// Built-ins are fixed at construction and sit beneath every stored value.
/// Stored values are replaced only by writes of equal or higher precedence,
/// decided under the write lock.
#[derive(Debug)]
pub struct VariableResolver {
    builtins: BTreeMap<String, String>,
    values: RwLock<HashMap<String, VariableValue>>,
}

impl Default for VariableResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableResolver {
    /// Resolver seeded with the default built-ins (`CI`, `RUNNER_OS`, `RUNNER_ARCH`)
    pub fn new() -> Self {
        Self::with_builtins(Self::default_builtins())
    }

    pub fn with_builtins(builtins: BTreeMap<String, String>) -> Self {
        Self {
            builtins,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_builtins() -> BTreeMap<String, String> {
        let os = match std::env::consts::OS {
            "linux" => "Linux",
            "macos" => "macOS",
            "windows" => "Windows",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "X64",
            "x86" => "X86",
            "aarch64" => "ARM64",
            "arm" => "ARM",
            other => other,
        };

        BTreeMap::from([
            ("CI".to_string(), "true".to_string()),
            ("RUNNER_OS".to_string(), os.to_string()),
            ("RUNNER_ARCH".to_string(), arch.to_string()),
        ])
    }

    /// Stored value, falling back to built-ins
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.value)
    }

    pub fn get(&self, name: &str) -> Option<VariableValue> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        if let Some(value) = values.get(name) {
            return Some(value.clone());
        }
        self.builtins.get(name).map(|value| VariableValue {
            value: value.clone(),
            source: VariableSource::BuiltIn,
        })
    }

    pub fn source_of(&self, name: &str) -> Option<VariableSource> {
        self.get(name).map(|v| v.source)
    }

    /// Store a value unless a higher-precedence one is already present
    ///
    /// Returns whether the write was applied.
    pub fn set_variable(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
        source: VariableSource,
    ) -> bool {
        let name = name.into();
        let value = value.into();
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());

        match values.entry(name) {
            Entry::Occupied(mut entry) => {
                if source < entry.get().source {
                    tracing::trace!(
                        name = %entry.key(),
                        existing = %entry.get().source,
                        attempted = %source,
                        "ignored lower-precedence variable"
                    );
                    return false;
                }
                entry.insert(VariableValue { value, source });
            }
            Entry::Vacant(entry) => {
                entry.insert(VariableValue { value, source });
            }
        }
        true
    }

    /// Remove every stored value that came from `source`
    pub fn clear_source(&self, source: VariableSource) -> usize {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        let before = values.len();
        values.retain(|_, v| v.source != source);
        before - values.len()
    }

    /// Built-ins overlaid with every stored value
    pub fn all_variables(&self) -> BTreeMap<String, String> {
        let mut all = self.builtins.clone();
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        for (name, value) in values.iter() {
            all.insert(name.clone(), value.value.clone());
        }
        all
    }

    pub fn load_configuration(&self, config: &Configuration) {
        for (name, value) in &config.variables {
            self.set_variable(name.clone(), value.clone(), VariableSource::Configuration);
        }
    }

    /// Load environment pairs
    ///
    /// `SECRET_X` is stored as `X` at Secret precedence, `VAR_X` as `X` at
    /// Environment precedence. Other names are captured verbatim first, so a
    /// prefixed value wins over a verbatim one with the same stripped name.
    pub fn load_environment<I, K, V>(&self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut prefixed = Vec::new();

        for (name, value) in vars {
            let name = name.into();
            let value = value.into();
            if let Some(stripped) = name.strip_prefix(SECRET_PREFIX).filter(|s| !s.is_empty()) {
                prefixed.push((stripped.to_string(), value, VariableSource::Secret));
            } else if let Some(stripped) = name.strip_prefix(VAR_PREFIX).filter(|s| !s.is_empty()) {
                prefixed.push((stripped.to_string(), value, VariableSource::Environment));
            } else {
                self.set_variable(name, value, VariableSource::Environment);
            }
        }

        for (name, value, source) in prefixed {
            self.set_variable(name, value, source);
        }
    }

    pub fn load_process_environment(&self) {
        self.load_environment(std::env::vars());
    }

    pub fn load_secrets(&self, provider: &dyn SecretProvider) -> Result<usize, SecretError> {
        let secrets = provider.secrets()?;
        let count = secrets.len();
        for (name, value) in secrets {
            self.set_variable(name, value, VariableSource::Secret);
        }
        tracing::debug!(provider = provider.name(), count, "loaded secrets");
        Ok(count)
    }

    pub fn load_cli_overrides<I, K, V>(&self, overrides: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in overrides {
            self.set_variable(name, value, VariableSource::Cli);
        }
    }

    /// Non-empty values stored at Secret precedence
    pub fn secret_values(&self) -> Vec<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        let mut secrets: Vec<String> = values
            .values()
            .filter(|v| v.source == VariableSource::Secret && !v.value.is_empty())
            .map(|v| v.value.clone())
            .collect();
        // Longest first so overlapping secrets are fully covered
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        secrets
    }

    /// Replace every secret value occurring in `text`
    pub fn mask(&self, text: &str) -> String {
        self.secret_values()
            .iter()
            .fold(text.to_string(), |masked, secret| masked.replace(secret, SECRET_MASK))
    }
}

impl VariableLookup for VariableResolver {
    fn lookup(&self, name: &str) -> Option<String> {
        self.resolve(name)
    }
}

/// Resolver view with extra built-ins scoped to one job or step
///
/// Scoped values only apply when the resolver has no stored value for the name.
pub struct ScopedVariables<'a> {
    resolver: &'a VariableResolver,
    scope: BTreeMap<String, String>,
}

impl<'a> ScopedVariables<'a> {
    pub fn new(resolver: &'a VariableResolver) -> Self {
        Self {
            resolver,
            scope: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.scope.insert(name.into(), value.into());
        self
    }
}

impl VariableLookup for ScopedVariables<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match self.resolver.get(name) {
            Some(value) if value.source != VariableSource::BuiltIn => Some(value.value),
            fallback => self.scope.get(name).cloned().or(fallback.map(|v| v.value)),
        }
    }
}
