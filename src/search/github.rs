//! GitHub search backend.
//!
//! Maps each [`SearchMethod`] (and its entity selector) onto one of GitHub's
//! search endpoints, pages through the results and turns every hit into a
//! [`ProjectDescriptor`]. Hits are deduplicated by repository name across all
//! pages before the result set is cut to the desired count, so code, commit
//! and issue searches, which can return the same repository many times, still
//! yield unique projects.
//!
//! The provider is reached through the [`GitHubApi`] trait; production code
//! uses [`GitHubRestClient`](super::client::GitHubRestClient).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::GitHubRestClient;
use super::{PageCursor, SearchBackend};
use crate::backend::{keys, AuthMethod, BackendConfig, SearchEntity, SearchMethod};
use crate::error::{ConfigError, SearchError};
use crate::project::ProjectDescriptor;

/// Largest page GitHub returns for search endpoints.
pub const MAX_PAGE_SIZE: usize = 100;

/// GitHub search endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEndpoint {
    Repositories,
    Code,
    Commits,
    Issues,
}

impl SearchEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            SearchEndpoint::Repositories => "search/repositories",
            SearchEndpoint::Code => "search/code",
            SearchEndpoint::Commits => "search/commits",
            SearchEndpoint::Issues => "search/issues",
        }
    }
}

/// One page request against a search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub endpoint: SearchEndpoint,
    pub query: String,
    pub page: u32,
    pub per_page: usize,
}

/// A repository referenced by a search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHit {
    /// `owner/name`.
    pub full_name: String,
    pub clone_url: String,
}

impl RepoHit {
    pub fn new(full_name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            clone_url: clone_url.into(),
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub hits: Vec<RepoHit>,
    /// Whether the provider reported a following page.
    pub has_next: bool,
}

/// The subset of the GitHub API the search backend needs.
#[async_trait]
pub trait GitHubApi: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError>;

    /// SHA of the most recent commit on the default branch, if any.
    async fn latest_commit(&self, full_name: &str) -> Result<Option<String>, SearchError>;
}

/// What a configured backend searches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchTarget {
    Repositories,
    Code,
    Topic,
    Label,
    TextMatch,
    Commits,
    Issues,
    PullRequests,
}

impl SearchTarget {
    fn resolve(method: SearchMethod, entity: Option<SearchEntity>) -> Self {
        match (method, entity) {
            (SearchMethod::Project, _) => SearchTarget::Repositories,
            (SearchMethod::Code, _) => SearchTarget::Code,
            (_, Some(SearchEntity::Topic)) => SearchTarget::Topic,
            (_, Some(SearchEntity::Label)) => SearchTarget::Label,
            (_, Some(SearchEntity::TextMatch)) => SearchTarget::TextMatch,
            (_, Some(SearchEntity::Commit)) => SearchTarget::Commits,
            (_, Some(SearchEntity::Issue)) => SearchTarget::Issues,
            (_, Some(SearchEntity::PullRequest)) => SearchTarget::PullRequests,
            // validate_config guarantees an entity for Meta and Version.
            (SearchMethod::Meta, None) => SearchTarget::TextMatch,
            (SearchMethod::Version, None) => SearchTarget::Commits,
        }
    }

    fn plan(&self, query: &str) -> (SearchEndpoint, String) {
        match self {
            SearchTarget::Repositories => (SearchEndpoint::Repositories, query.to_string()),
            SearchTarget::Code => (SearchEndpoint::Code, query.to_string()),
            SearchTarget::Topic => (SearchEndpoint::Repositories, format!("topic:{query}")),
            SearchTarget::Label => (SearchEndpoint::Issues, format!("label:\"{query}\"")),
            SearchTarget::TextMatch => (
                SearchEndpoint::Repositories,
                format!("{query} in:name,description,readme"),
            ),
            SearchTarget::Commits => (SearchEndpoint::Commits, query.to_string()),
            SearchTarget::Issues => (SearchEndpoint::Issues, format!("{query} is:issue")),
            SearchTarget::PullRequests => (SearchEndpoint::Issues, format!("{query} is:pr")),
        }
    }
}

/// Validates a search configuration and returns the entity selector, if any.
fn validate_config(config: &BackendConfig) -> Result<Option<SearchEntity>, ConfigError> {
    // https://docs.github.com/en/rest/search/search#search-code
    if config.search_method == SearchMethod::Code && config.auth_method == AuthMethod::None {
        return Err(ConfigError::AuthRequired {
            method: SearchMethod::Code,
        });
    }

    let entity = match config.search_method {
        SearchMethod::Meta => Some(parse_entity(config, keys::META_ENTITY, SearchMethod::Meta)?),
        SearchMethod::Version => Some(parse_entity(
            config,
            keys::VERSION_ENTITY,
            SearchMethod::Version,
        )?),
        SearchMethod::Project | SearchMethod::Code => None,
    };

    config.credentials()?;
    Ok(entity)
}

fn parse_entity(
    config: &BackendConfig,
    key: &'static str,
    method: SearchMethod,
) -> Result<SearchEntity, ConfigError> {
    let raw = config.require(key, &format!("with {method} search method"))?;
    let entity: SearchEntity = raw.parse().map_err(|reason| ConfigError::InvalidField {
        field: key,
        value: raw.to_string(),
        reason,
    })?;
    if entity.method() != method {
        return Err(ConfigError::InvalidField {
            field: key,
            value: raw.to_string(),
            reason: format!("'{}' is a {} entity", entity.as_str(), entity.method()),
        });
    }
    Ok(entity)
}

/// Searches GitHub for projects, code, topics, labels or revisions and
/// paginates transparently.
pub struct GitHubSearch {
    api: Arc<dyn GitHubApi>,
    method: SearchMethod,
    target: SearchTarget,
    max_page_size: usize,
}

impl GitHubSearch {
    /// Validates `config` and builds a backend talking to the GitHub REST API.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let entity = validate_config(config)?;
        let client = GitHubRestClient::from_config(config)?;
        Ok(Self::build(Arc::new(client), config.search_method, entity))
    }

    /// Validates `config` and builds a backend on top of an arbitrary API client.
    pub fn with_api(api: Arc<dyn GitHubApi>, config: &BackendConfig) -> Result<Self, ConfigError> {
        let entity = validate_config(config)?;
        Ok(Self::build(api, config.search_method, entity))
    }

    fn build(api: Arc<dyn GitHubApi>, method: SearchMethod, entity: Option<SearchEntity>) -> Self {
        Self {
            api,
            method,
            target: SearchTarget::resolve(method, entity),
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Overrides the provider page size limit.
    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    pub fn method(&self) -> SearchMethod {
        self.method
    }

    /// Best-effort revision lookup: failures leave the version empty.
    async fn resolve_version(&self, hit: &RepoHit) -> String {
        match self.api.latest_commit(&hit.full_name).await {
            Ok(Some(sha)) => sha,
            Ok(None) => String::new(),
            Err(e) => {
                warn!(project = %hit.full_name, error = %e, "Failed to resolve latest commit");
                String::new()
            }
        }
    }

    async fn fetch_page(
        &self,
        cancel: &CancellationToken,
        request: &SearchRequest,
    ) -> Result<SearchPage, SearchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SearchError::Cancelled),
            page = self.api.search(request) => page,
        }
    }
}

#[async_trait]
impl SearchBackend for GitHubSearch {
    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &str,
        num_desired: usize,
    ) -> Result<Vec<ProjectDescriptor>, SearchError> {
        if num_desired == 0 {
            return Ok(Vec::new());
        }

        let (endpoint, provider_query) = self.target.plan(query);
        let mut cursor = PageCursor::new(num_desired, self.max_page_size);
        let mut seen: HashSet<String> = HashSet::new();
        let mut projects = Vec::with_capacity(num_desired);

        loop {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            let request = SearchRequest {
                endpoint,
                query: provider_query.clone(),
                page: cursor.page(),
                per_page: cursor.per_page(),
            };
            let page = self.fetch_page(cancel, &request).await?;
            let raw_hits = page.hits.len();

            let remaining = cursor.remaining(projects.len());
            let fresh: Vec<RepoHit> = page
                .hits
                .into_iter()
                .filter(|hit| seen.insert(hit.full_name.clone()))
                .take(remaining)
                .collect();

            let versions =
                futures::future::join_all(fresh.iter().map(|hit| self.resolve_version(hit))).await;

            for (hit, version) in fresh.into_iter().zip(versions) {
                match ProjectDescriptor::new(&hit.full_name, version, &hit.clone_url) {
                    Ok(project) => projects.push(project),
                    Err(e) => warn!(project = %hit.full_name, error = %e, "Skipping search hit"),
                }
            }

            debug!(
                page = cursor.page(),
                hits = raw_hits,
                total = projects.len(),
                "Search page fetched"
            );

            if projects.len() >= num_desired {
                projects.truncate(num_desired);
                info!(total = projects.len(), method = %self.method, "Search completed");
                return Ok(projects);
            }

            if !page.has_next || raw_hits == 0 {
                info!(
                    total = projects.len(),
                    desired = num_desired,
                    "Search exhausted before reaching desired count"
                );
                return Err(SearchError::FewerResultsThanDesired {
                    desired: num_desired,
                    projects,
                });
            }

            cursor.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Serves a fixed list of hits, sliced by the requested page and page size.
    struct MockGitHubApi {
        hits: Vec<RepoHit>,
        requests: Mutex<Vec<SearchRequest>>,
        failing_commits: HashSet<String>,
        fail_on_page: Option<u32>,
    }

    impl MockGitHubApi {
        fn new(hits: Vec<RepoHit>) -> Self {
            Self {
                hits,
                requests: Mutex::new(Vec::new()),
                failing_commits: HashSet::new(),
                fail_on_page: None,
            }
        }

        fn with_repos(count: usize) -> Self {
            Self::new((0..count).map(hit).collect())
        }

        fn requests(&self) -> Vec<SearchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GitHubApi for MockGitHubApi {
        async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_on_page == Some(request.page) {
                return Err(SearchError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            let start = (request.page as usize - 1) * request.per_page;
            let end = (start + request.per_page).min(self.hits.len());
            let hits = self.hits.get(start..end).map(<[_]>::to_vec).unwrap_or_default();
            Ok(SearchPage {
                hits,
                has_next: end < self.hits.len(),
            })
        }

        async fn latest_commit(&self, full_name: &str) -> Result<Option<String>, SearchError> {
            if self.failing_commits.contains(full_name) {
                return Err(SearchError::Decode("no commits".to_string()));
            }
            Ok(Some(format!("sha-{full_name}")))
        }
    }

    fn hit(i: usize) -> RepoHit {
        named(&format!("owner/repo-{i}"))
    }

    fn named(name: &str) -> RepoHit {
        RepoHit::new(name, format!("https://github.com/{name}.git"))
    }

    fn backend(api: Arc<MockGitHubApi>, config: &BackendConfig) -> GitHubSearch {
        GitHubSearch::with_api(api, config).expect("valid config")
    }

    fn project_config() -> BackendConfig {
        BackendConfig::new().with_search_method(SearchMethod::Project)
    }

    fn code_config() -> BackendConfig {
        BackendConfig::new()
            .with_search_method(SearchMethod::Code)
            .with_token("token123")
    }

    #[tokio::test]
    async fn single_page_when_desired_fits() {
        let api = Arc::new(MockGitHubApi::with_repos(50));
        let search = backend(api.clone(), &project_config());

        let projects = search
            .search(&CancellationToken::new(), "language:rust", 7)
            .await
            .expect("enough results");

        assert_eq!(projects.len(), 7);
        let requests = api.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].per_page, 7);
        assert_eq!(requests[0].endpoint, SearchEndpoint::Repositories);
        assert_eq!(projects[0].version(), "sha-owner/repo-0");
    }

    #[tokio::test]
    async fn paginates_until_desired_reached() {
        let api = Arc::new(MockGitHubApi::with_repos(100));
        let search = backend(api.clone(), &project_config()).with_max_page_size(10);

        let projects = search
            .search(&CancellationToken::new(), "q", 25)
            .await
            .expect("enough results");

        assert_eq!(projects.len(), 25);
        let pages: Vec<u32> = api.requests().iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(projects[24].name(), "owner/repo-24");
    }

    #[tokio::test]
    async fn exhausted_pages_return_partial_results() {
        let api = Arc::new(MockGitHubApi::with_repos(7));
        let search = backend(api.clone(), &project_config()).with_max_page_size(5);

        let err = search
            .search(&CancellationToken::new(), "q", 10)
            .await
            .expect_err("not enough results");

        match err {
            SearchError::FewerResultsThanDesired { desired, projects } => {
                assert_eq!(desired, 10);
                assert_eq!(projects.len(), 7);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.requests().len(), 2);
    }

    #[tokio::test]
    async fn code_search_deduplicates_projects() {
        let api = Arc::new(MockGitHubApi::new(vec![
            named("a/one"),
            named("a/one"),
            named("b/two"),
            named("a/one"),
            named("c/three"),
        ]));
        let search = backend(api.clone(), &code_config());

        // The first page of 3 holds only two unique projects.
        let projects = search
            .search(&CancellationToken::new(), "filename:Makefile", 3)
            .await
            .expect("three unique projects");

        let names: Vec<&str> = projects.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a/one", "b/two", "c/three"]);
        let requests = api.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].endpoint, SearchEndpoint::Code);
    }

    #[tokio::test]
    async fn deduplicates_across_pages_before_truncating() {
        let api = Arc::new(MockGitHubApi::new(vec![
            named("a/one"),
            named("b/two"),
            named("a/one"),
            named("b/two"),
            named("c/three"),
            named("d/four"),
        ]));
        let search = backend(api.clone(), &code_config()).with_max_page_size(2);

        let projects = search
            .search(&CancellationToken::new(), "q", 3)
            .await
            .expect("three unique projects");

        let names: Vec<&str> = projects.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["a/one", "b/two", "c/three"]);
        assert_eq!(api.requests().len(), 3);
    }

    #[tokio::test]
    async fn failed_version_lookup_keeps_project() {
        let mut api = MockGitHubApi::with_repos(3);
        api.failing_commits.insert("owner/repo-1".to_string());
        let search = backend(Arc::new(api), &project_config());

        let projects = search
            .search(&CancellationToken::new(), "q", 3)
            .await
            .expect("three results");

        assert_eq!(projects.len(), 3);
        assert_eq!(projects[1].version(), "");
        assert_eq!(projects[2].version(), "sha-owner/repo-2");
    }

    #[tokio::test]
    async fn provider_failure_discards_partial_results() {
        let mut api = MockGitHubApi::with_repos(30);
        api.fail_on_page = Some(2);
        let search = backend(Arc::new(api), &project_config()).with_max_page_size(10);

        let err = search
            .search(&CancellationToken::new(), "q", 25)
            .await
            .expect_err("page 2 fails");
        assert!(matches!(err, SearchError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn zero_desired_skips_provider() {
        let api = Arc::new(MockGitHubApi::with_repos(3));
        let search = backend(api.clone(), &project_config());

        let projects = search.search(&CancellationToken::new(), "q", 0).await.unwrap();
        assert!(projects.is_empty());
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn cancelled_search_issues_no_requests() {
        let api = Arc::new(MockGitHubApi::with_repos(3));
        let search = backend(api.clone(), &project_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = search.search(&cancel, "q", 3).await.unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn meta_topic_search_targets_repositories() {
        let api = Arc::new(MockGitHubApi::with_repos(3));
        let config = BackendConfig::new()
            .with_search_method(SearchMethod::Meta)
            .with_option(keys::META_ENTITY, "topic");
        let search = backend(api.clone(), &config);

        search.search(&CancellationToken::new(), "cli", 1).await.unwrap();

        let request = &api.requests()[0];
        assert_eq!(request.endpoint, SearchEndpoint::Repositories);
        assert_eq!(request.query, "topic:cli");
    }

    #[tokio::test]
    async fn version_pull_request_search_targets_issues() {
        let api = Arc::new(MockGitHubApi::with_repos(3));
        let config = BackendConfig::new()
            .with_search_method(SearchMethod::Version)
            .with_option(keys::VERSION_ENTITY, "pull_request");
        let search = backend(api.clone(), &config);

        search.search(&CancellationToken::new(), "fix flaky", 1).await.unwrap();

        let request = &api.requests()[0];
        assert_eq!(request.endpoint, SearchEndpoint::Issues);
        assert_eq!(request.query, "fix flaky is:pr");
    }

    #[test]
    fn factory_validation() {
        let api: Arc<dyn GitHubApi> = Arc::new(MockGitHubApi::with_repos(0));
        let cases: Vec<(&str, BackendConfig, Option<&str>)> = vec![
            (
                "missing_auth_code_search_method",
                BackendConfig::new().with_search_method(SearchMethod::Code),
                Some("auth method required for code search"),
            ),
            (
                "missing_version_entity_version_search",
                BackendConfig::new().with_search_method(SearchMethod::Version),
                Some("'version_entity' required with version search method"),
            ),
            (
                "version_search",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Version)
                    .with_option(keys::VERSION_ENTITY, "commit"),
                None,
            ),
            (
                "missing_meta_entity_meta_search",
                BackendConfig::new().with_search_method(SearchMethod::Meta),
                Some("'meta_entity' required with meta search method"),
            ),
            (
                "meta_entity_from_version_family",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Meta)
                    .with_option(keys::META_ENTITY, "commit"),
                Some("'commit' is a version entity"),
            ),
            (
                "unknown_meta_entity",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Meta)
                    .with_option(keys::META_ENTITY, "stars"),
                Some("unknown search entity 'stars'"),
            ),
            (
                "meta_search",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Meta)
                    .with_option(keys::META_ENTITY, "topic"),
                None,
            ),
            (
                "missing_username_basic_auth",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Code)
                    .with_auth_method(AuthMethod::Basic)
                    .with_option(keys::PASSWORD, "password123"),
                Some("'username' required for basic auth"),
            ),
            (
                "missing_password_basic_auth",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Code)
                    .with_auth_method(AuthMethod::Basic)
                    .with_option(keys::USERNAME, "username123"),
                Some("'password' required for basic auth"),
            ),
            (
                "missing_token_token_auth",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Code)
                    .with_auth_method(AuthMethod::Token),
                Some("'token' required for token auth"),
            ),
            (
                "basic_auth",
                BackendConfig::new()
                    .with_search_method(SearchMethod::Code)
                    .with_auth_method(AuthMethod::Basic)
                    .with_option(keys::USERNAME, "username123")
                    .with_option(keys::PASSWORD, "password123"),
                None,
            ),
            ("token_auth", code_config(), None),
        ];

        for (name, config, want_err) in cases {
            let result = GitHubSearch::with_api(api.clone(), &config);
            match (result, want_err) {
                (Ok(backend), None) => assert_eq!(backend.method(), config.search_method, "{name}"),
                (Err(err), Some(want)) => {
                    assert!(err.to_string().contains(want), "{name}: got '{err}'");
                    // The REST-backed constructor reports the same error.
                    let direct = GitHubSearch::from_config(&config)
                        .err()
                        .map(|e| e.to_string());
                    assert_eq!(direct, Some(err.to_string()), "{name}");
                }
                (Ok(_), Some(want)) => panic!("{name}: expected error '{want}'"),
                (Err(err), None) => panic!("{name}: unexpected error '{err}'"),
            }
        }
    }
}
