//! Execution of the external command against retrieved projects.
//!
//! # Example
//!
//! ```ignore
//! use neighbor::execution::{BinaryRunner, ExecutionBackend};
//!
//! let runner = BinaryRunner::new("cargo test --quiet")?;
//! runner.run(&cancel, Path::new("_external_projects/owner/repo")).await?;
//! ```

pub mod argv;
pub mod binary;

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutionError;

pub use argv::tokenize;
pub use binary::BinaryRunner;

/// Runs a fixed command in a caller-supplied working directory.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn run(&self, cancel: &CancellationToken, work_dir: &Path) -> Result<(), ExecutionError>;
}
