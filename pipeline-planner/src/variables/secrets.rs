// Secret Providers
// Sources of secret name/value pairs loaded at Secret precedence

use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },
}

/// Yields every secret it knows about
pub trait SecretProvider: Send + Sync {
    fn name(&self) -> &str;

    fn secrets(&self) -> Result<BTreeMap<String, String>, SecretError>;
}

/// Secrets held in memory, e.g. collected from a prompt or a test
#[derive(Debug, Default)]
pub struct InMemorySecretProvider {
    secrets: RwLock<BTreeMap<String, String>>,
}

impl InMemorySecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut secrets = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        secrets.insert(name.into(), value.into());
    }
}

impl SecretProvider for InMemorySecretProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn secrets(&self) -> Result<BTreeMap<String, String>, SecretError> {
        let secrets = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        Ok(secrets.clone())
    }
}
