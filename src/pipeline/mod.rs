//! Pipeline orchestration: discover, retrieve, execute.
//!
//! # Pipeline Flow
//!
//! 1. **Discovery**: one [`SearchBackend`](crate::search::SearchBackend) call
//!    for the configured query and desired count
//! 2. **Retrieval**: discovered projects are fanned out to a fixed pool of
//!    retrieval workers, each cloning into `projects_dir/<name>`
//! 3. **Execution**: every retrieved project is handed to the execution pool,
//!    which runs the command inside the project directory
//!
//! A failure in retrieval or execution is recorded for that project and
//! never stops the batch.
//!
//! # Example
//!
//! ```rust,ignore
//! use neighbor::backend::{BackendConfig, BackendRegistry};
//! use neighbor::pipeline::{Pipeline, PipelineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = BackendRegistry::with_builtins();
//! let config = BackendConfig::new().with_option("command", "make test");
//! let pipeline = Pipeline::new(
//!     registry.build_search("github", &config)?,
//!     registry.build_retrieval("git", &config)?,
//!     Some(registry.build_execution("binary", &config)?),
//!     PipelineConfig::new("language:go stars:>1000").with_num_desired(20),
//! )?;
//!
//! let report = pipeline.run(CancellationToken::new()).await?;
//! println!("{} of {} projects passed", report.executed(), report.discovered);
//! ```

pub mod config;
pub mod orchestrator;
pub mod report;

pub use config::{PipelineConfig, DEFAULT_PROJECTS_DIR};
pub use orchestrator::Pipeline;
pub use report::{
    ExecutionOutcome, PipelineState, ProjectReport, RetrievalOutcome, RunReport, StageOutcome,
};
