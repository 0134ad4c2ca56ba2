//! Backend registry: maps a backend kind to the factory that builds it.
//!
//! Factories validate the whole [`BackendConfig`] before returning, so a
//! caller either gets a ready backend or a [`ConfigError`] naming the
//! offending field.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::BackendConfig;
use crate::error::ConfigError;
use crate::execution::{BinaryRunner, ExecutionBackend};
use crate::retrieval::{GitRetriever, RetrievalBackend};
use crate::search::{GitHubSearch, SearchBackend};

pub type SearchFactory =
    Box<dyn Fn(&BackendConfig) -> Result<Arc<dyn SearchBackend>, ConfigError> + Send + Sync>;
pub type RetrievalFactory =
    Box<dyn Fn(&BackendConfig) -> Result<Arc<dyn RetrievalBackend>, ConfigError> + Send + Sync>;
pub type ExecutionFactory =
    Box<dyn Fn(&BackendConfig) -> Result<Arc<dyn ExecutionBackend>, ConfigError> + Send + Sync>;

/// Built-in backend kinds.
pub const GITHUB: &str = "github";
pub const GIT: &str = "git";
pub const BINARY: &str = "binary";

/// Factories for the three backend families.
#[derive(Default)]
pub struct BackendRegistry {
    search: HashMap<String, SearchFactory>,
    retrieval: HashMap<String, RetrievalFactory>,
    execution: HashMap<String, ExecutionFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `github`, `git` and `binary` backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_search(GITHUB, |config| {
            Ok(Arc::new(GitHubSearch::from_config(config)?) as Arc<dyn SearchBackend>)
        });
        registry.register_retrieval(GIT, |config| {
            Ok(Arc::new(GitRetriever::from_config(config)?) as Arc<dyn RetrievalBackend>)
        });
        registry.register_execution(BINARY, |config| {
            Ok(Arc::new(BinaryRunner::from_config(config)?) as Arc<dyn ExecutionBackend>)
        });
        registry
    }

    pub fn register_search<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&BackendConfig) -> Result<Arc<dyn SearchBackend>, ConfigError> + Send + Sync + 'static,
    {
        self.search.insert(kind.into(), Box::new(factory));
    }

    pub fn register_retrieval<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&BackendConfig) -> Result<Arc<dyn RetrievalBackend>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.retrieval.insert(kind.into(), Box::new(factory));
    }

    pub fn register_execution<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&BackendConfig) -> Result<Arc<dyn ExecutionBackend>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.execution.insert(kind.into(), Box::new(factory));
    }

    pub fn build_search(
        &self,
        kind: &str,
        config: &BackendConfig,
    ) -> Result<Arc<dyn SearchBackend>, ConfigError> {
        debug!(kind, method = %config.search_method, "Building search backend");
        let factory = self.search.get(kind).ok_or_else(|| unknown("search", kind))?;
        factory(config)
    }

    pub fn build_retrieval(
        &self,
        kind: &str,
        config: &BackendConfig,
    ) -> Result<Arc<dyn RetrievalBackend>, ConfigError> {
        debug!(kind, "Building retrieval backend");
        let factory = self
            .retrieval
            .get(kind)
            .ok_or_else(|| unknown("retrieval", kind))?;
        factory(config)
    }

    pub fn build_execution(
        &self,
        kind: &str,
        config: &BackendConfig,
    ) -> Result<Arc<dyn ExecutionBackend>, ConfigError> {
        debug!(kind, "Building execution backend");
        let factory = self
            .execution
            .get(kind)
            .ok_or_else(|| unknown("execution", kind))?;
        factory(config)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = |map: Vec<&String>| {
            let mut v: Vec<String> = map.into_iter().cloned().collect();
            v.sort();
            v
        };
        f.debug_struct("BackendRegistry")
            .field("search", &kinds(self.search.keys().collect()))
            .field("retrieval", &kinds(self.retrieval.keys().collect()))
            .field("execution", &kinds(self.execution.keys().collect()))
            .finish()
    }
}

fn unknown(family: &'static str, kind: &str) -> ConfigError {
    ConfigError::UnknownBackend {
        family,
        kind: kind.to_string(),
    }
}
