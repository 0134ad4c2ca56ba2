//! GitHub REST API client used by [`GitHubSearch`](super::GitHubSearch).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use super::github::{GitHubApi, RepoHit, SearchEndpoint, SearchPage, SearchRequest};
use crate::backend::{keys, BackendConfig, BasicAuth};
use crate::error::{ConfigError, SearchError};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("neighbor/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper over the search and commits endpoints of the GitHub REST API.
pub struct GitHubRestClient {
    client: Client,
    base_url: String,
    auth: Option<BasicAuth>,
}

impl GitHubRestClient {
    pub fn new(base_url: impl Into<String>, auth: Option<BasicAuth>) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Builds a client from the `api_url` key and the configured credentials.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let base_url = config.get(keys::API_URL).unwrap_or(DEFAULT_API_URL);
        Self::new(base_url, config.credentials()?)
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.auth {
            Some(auth) => request.header("Authorization", auth.header_value()),
            None => request,
        }
    }

    fn search_url(&self, request: &SearchRequest) -> String {
        format!(
            "{}/{}?q={}&per_page={}&page={}",
            self.base_url,
            request.endpoint.path(),
            urlencoding::encode(&request.query),
            request.per_page,
            request.page
        )
    }
}

#[async_trait]
impl GitHubApi for GitHubRestClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        let url = self.search_url(request);
        tracing::debug!(url = %url, "GitHub search request");

        let response = self.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %message, "GitHub Search API returned error");
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let has_next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(has_next_page)
            .unwrap_or(false);

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;

        Ok(SearchPage {
            hits: parse_hits(request.endpoint, &body)?,
            has_next,
        })
    }

    async fn latest_commit(&self, full_name: &str) -> Result<Option<String>, SearchError> {
        let url = format!("{}/repos/{}/commits?per_page=1", self.base_url, full_name);
        let response = self.get(&url).send().await?;
        let status = response.status();

        // Empty repositories answer 409.
        if status == StatusCode::CONFLICT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SearchError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(body
            .get(0)
            .and_then(|commit| commit.get("sha"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// Returns true when an RFC 8288 `Link` header advertises a next page.
pub fn has_next_page(link: &str) -> bool {
    link.split(',')
        .any(|part| part.split(';').skip(1).any(|p| p.trim() == "rel=\"next\""))
}

/// Extracts repository hits from a search response body.
pub fn parse_hits(endpoint: SearchEndpoint, body: &Value) -> Result<Vec<RepoHit>, SearchError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::Decode("response has no 'items' array".to_string()))?;

    let parse: fn(&Value) -> Option<RepoHit> = match endpoint {
        SearchEndpoint::Repositories => parse_repository,
        SearchEndpoint::Code | SearchEndpoint::Commits => parse_nested_repository,
        SearchEndpoint::Issues => parse_issue,
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let hit = parse(item);
            if hit.is_none() {
                tracing::debug!(endpoint = ?endpoint, "Skipping malformed search item");
            }
            hit
        })
        .collect())
}

fn parse_repository(item: &Value) -> Option<RepoHit> {
    let full_name = item.get("full_name").and_then(Value::as_str)?;
    let clone_url = item.get("clone_url").and_then(Value::as_str)?;
    Some(RepoHit::new(full_name, clone_url))
}

// Code and commit results embed a minimal repository object without clone_url.
fn parse_nested_repository(item: &Value) -> Option<RepoHit> {
    let repository = item.get("repository")?;
    let full_name = repository.get("full_name").and_then(Value::as_str)?;
    let html_url = repository.get("html_url").and_then(Value::as_str)?;
    Some(RepoHit::new(full_name, format!("{html_url}.git")))
}

// Issues and pull requests only link back to their repository:
// html_url is https://<host>/<owner>/<repo>/(issues|pull)/<n>
fn parse_issue(item: &Value) -> Option<RepoHit> {
    let html_url = item.get("html_url").and_then(Value::as_str)?;
    let parts: Vec<&str> = html_url.split('/').collect();
    if parts.len() < 5 || parts[3].is_empty() || parts[4].is_empty() {
        return None;
    }
    let full_name = format!("{}/{}", parts[3], parts[4]);
    let clone_url = format!("{}.git", parts[..5].join("/"));
    Some(RepoHit::new(full_name, clone_url))
}
