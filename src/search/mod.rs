//! Project discovery.
//!
//! A [`SearchBackend`] turns a query and a desired result count into a bounded,
//! deduplicated list of [`ProjectDescriptor`]s, transparently paginating the
//! provider. When the provider runs out of pages first, the backend returns
//! [`SearchError::FewerResultsThanDesired`] carrying everything it found.
//!
//! ```rust,ignore
//! use neighbor::backend::{BackendConfig, BackendRegistry, SearchMethod};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = BackendRegistry::with_builtins();
//! let search = registry.build_search(
//!     "github",
//!     &BackendConfig::new().with_search_method(SearchMethod::Project),
//! )?;
//! let projects = match search.search(&CancellationToken::new(), "language:rust", 10).await {
//!     Ok(projects) => projects,
//!     Err(err) => err.into_partial()?,
//! };
//! ```

pub mod client;
pub mod github;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::project::ProjectDescriptor;

pub use client::GitHubRestClient;
pub use github::{GitHubApi, GitHubSearch, RepoHit, SearchEndpoint, SearchPage, SearchRequest};

/// Discovers projects matching a query.
///
/// Implementations are immutable after construction and shared between
/// pipeline workers.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
        num_desired: usize,
    ) -> Result<Vec<ProjectDescriptor>, SearchError>;
}

/// Returns the smallest page size that can fulfill the request, capped by the
/// provider's maximum.
pub fn page_size(desired: usize, max: usize) -> usize {
    desired.min(max)
}

/// Pagination state for one discovery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    desired: usize,
    per_page: usize,
    page: u32,
}

impl PageCursor {
    pub fn new(desired: usize, max_page_size: usize) -> Self {
        Self {
            desired,
            per_page: page_size(desired, max_page_size).max(1),
            page: 1,
        }
    }

    pub fn desired(&self) -> usize {
        self.desired
    }

    /// Results requested per page.
    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Current page, starting at 1.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// How many more results are needed given `collected` so far.
    pub fn remaining(&self, collected: usize) -> usize {
        self.desired.saturating_sub(collected)
    }

    pub fn advance(&mut self) {
        self.page += 1;
    }
}
