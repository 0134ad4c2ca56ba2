//! Project retrieval: materializing a discovered project on the local filesystem.

pub mod git;

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::RetrievalError;

pub use git::GitRetriever;

/// Fetches a project from its source location into a destination directory.
///
/// Implementations are shared by every retrieval worker and must not keep
/// per-call state.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn retrieve(
        &self,
        cancel: &CancellationToken,
        source_location: &str,
        dest: &Path,
    ) -> Result<(), RetrievalError>;
}
