//! neighbor: discover projects on GitHub, clone them, and run a command
//! against each one.
//!
//! The crate is organized around three swappable backend families wired
//! together by a [`pipeline::Pipeline`]:
//!
//! - [`search`]: finds projects matching a query
//! - [`retrieval`]: materializes each project locally
//! - [`execution`]: runs an external command inside each project
//!
//! Backends are built from a declarative [`backend::BackendConfig`] through a
//! [`backend::BackendRegistry`], which validates the configuration up front.

// Core modules
pub mod backend;
pub mod cli;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod project;
pub mod retrieval;
pub mod search;

// Re-export commonly used types
pub use error::{
    ConfigError, ExecutionError, PipelineError, ProjectError, RetrievalError, SearchError,
};
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use project::ProjectDescriptor;
