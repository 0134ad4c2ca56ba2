//! Pipeline configuration.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Default directory that receives one subdirectory per retrieved project.
pub const DEFAULT_PROJECTS_DIR: &str = "_external_projects";

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Query handed to the search backend.
    pub query: String,
    /// How many projects discovery should return.
    pub num_desired: usize,
    /// Run root; each project is retrieved to `projects_dir/<name>`.
    pub projects_dir: PathBuf,
    /// Size of the retrieval worker pool.
    pub retrieval_workers: usize,
    /// Size of the execution worker pool; 1 runs commands sequentially.
    pub execution_workers: usize,
    /// Remove `projects_dir` once the run finishes.
    pub clean: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            num_desired: 10,
            projects_dir: PathBuf::from(DEFAULT_PROJECTS_DIR),
            retrieval_workers: 5,
            execution_workers: 1,
            clean: true,
        }
    }
}

impl PipelineConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_num_desired(mut self, n: usize) -> Self {
        self.num_desired = n;
        self
    }

    pub fn with_projects_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.projects_dir = dir.into();
        self
    }

    pub fn with_retrieval_workers(mut self, n: usize) -> Self {
        self.retrieval_workers = n;
        self
    }

    pub fn with_execution_workers(mut self, n: usize) -> Self {
        self.execution_workers = n;
        self
    }

    pub fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "query",
                context: "for discovery".to_string(),
            });
        }
        if self.projects_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "projects_directory",
                context: "for retrieval".to_string(),
            });
        }
        for (field, value) in [
            ("retrieval_workers", self.retrieval_workers),
            ("execution_workers", self.execution_workers),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidField {
                    field,
                    value: value.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        Ok(())
    }
}
