//! Error types for neighbor operations.
//!
//! Defines error types for all major subsystems:
//! - Backend construction and configuration validation
//! - Project descriptors
//! - Discovery (search providers and pagination)
//! - Retrieval (cloning projects locally)
//! - Execution of the external command
//! - Pipeline orchestration

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::SearchMethod;
use crate::pipeline::{PipelineState, RunReport};
use crate::project::ProjectDescriptor;

/// Errors raised while validating configuration and constructing backends.
///
/// All of these are fatal: they are reported before any pipeline work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("auth method required for {method} search")]
    AuthRequired { method: SearchMethod },

    #[error("'{field}' required {context}")]
    MissingField { field: &'static str, context: String },

    #[error("invalid value '{value}' for '{field}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("command cannot be empty")]
    EmptyCommand,

    #[error("failed to find command '{command}': {reason}")]
    CommandNotFound { command: String, reason: String },

    #[error("unknown {family} backend '{kind}'")]
    UnknownBackend { family: &'static str, kind: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Errors raised when a project descriptor is built from invalid parts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("invalid project name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("source location cannot be empty for '{0}'")]
    EmptySource(String),
}

/// Errors that can occur during discovery.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The provider ran out of pages before the desired count was reached.
    ///
    /// Not a fault: `projects` holds every descriptor found.
    #[error("contains fewer results than desired ({found} of {desired})", found = .projects.len())]
    FewerResultsThanDesired {
        desired: usize,
        projects: Vec<ProjectDescriptor>,
    },

    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("search provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode search response: {0}")]
    Decode(String),

    #[error("search cancelled")]
    Cancelled,
}

impl SearchError {
    /// Returns the partial results carried by a `FewerResultsThanDesired` error.
    pub fn into_partial(self) -> Result<Vec<ProjectDescriptor>, SearchError> {
        match self {
            SearchError::FewerResultsThanDesired { projects, .. } => Ok(projects),
            other => Err(other),
        }
    }
}

/// Errors that can occur while materializing a single project locally.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("destination directory must be specified")]
    MissingDestination,

    #[error("source location must be specified")]
    MissingSource,

    #[error("retrieval cancelled")]
    Cancelled,

    #[error("failed to launch git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git clone of '{source_location}' failed (exit code {code:?}): {stderr}")]
    CloneFailed {
        source_location: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Errors that can occur while running the external command for one project.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("working directory must be specified")]
    MissingWorkDir,

    #[error("execution cancelled before start")]
    Cancelled,

    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with code {code:?}")]
    NonZeroExit { program: String, code: Option<i32> },

    #[error("'{program}' timed out after {seconds} seconds")]
    Timeout { program: String, seconds: u64 },

    #[error("failed to open output sink '{}': {source}", .path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("discovery failed: {0}")]
    Discovery(#[source] SearchError),

    #[error("failed to prepare projects directory '{}': {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline already started (state: {0})")]
    AlreadyStarted(PipelineState),

    /// The run observed cancellation; the report keeps every outcome recorded so far.
    #[error("pipeline cancelled after admitting {} of {} projects", .0.completed(), .0.discovered)]
    Cancelled(Box<RunReport>),
}
