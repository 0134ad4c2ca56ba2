//! Declarative backend configuration shared by the search, retrieval and
//! execution families.
//!
//! A [`BackendConfig`] is validated by a backend's factory before any backend
//! value exists; see [`registry::BackendRegistry`] for the construction entry
//! point. Method-specific parameters (credentials, entity selectors, clone
//! depth, ...) travel in the free-form `config` map under the keys defined in
//! [`keys`].

pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ExecutionError};

pub use registry::BackendRegistry;

/// Keys understood in [`BackendConfig::config`].
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const TOKEN: &str = "token";
    pub const META_ENTITY: &str = "meta_entity";
    pub const VERSION_ENTITY: &str = "version_entity";
    pub const API_URL: &str = "api_url";
    pub const DEPTH: &str = "depth";
    pub const COMMAND: &str = "command";
    pub const TIMEOUT_SECS: &str = "timeout_secs";
}

/// Identity sent alongside an API token. Providers ignore it, but it must be non-empty.
pub const TOKEN_AUTH_USERNAME: &str = "x-access-token";

/// How a backend authenticates against its provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuthMethod {
    #[default]
    None,
    Basic,
    Token,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "",
            AuthMethod::Basic => "basic",
            AuthMethod::Token => "token",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            Ok(AuthMethod::None)
        } else if trimmed.eq_ignore_ascii_case("basic") {
            Ok(AuthMethod::Basic)
        } else if trimmed.eq_ignore_ascii_case("token") {
            Ok(AuthMethod::Token)
        } else {
            Err(ConfigError::InvalidField {
                field: "auth_method",
                value: s.to_string(),
                reason: "expected '', 'basic' or 'token'".to_string(),
            })
        }
    }
}

impl TryFrom<String> for AuthMethod {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AuthMethod> for String {
    fn from(value: AuthMethod) -> Self {
        value.as_str().to_string()
    }
}

/// The kind of search used to discover projects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// Search for projects directly (by name, language, stars, ...).
    #[default]
    #[serde(alias = "repository")]
    Project,
    /// Search through code to find the projects containing it.
    Code,
    /// Search project meta information (topics, labels, text matches).
    Meta,
    /// Search revision history (commits, issues, pull requests).
    Version,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Project => write!(f, "project"),
            SearchMethod::Code => write!(f, "code"),
            SearchMethod::Meta => write!(f, "meta"),
            SearchMethod::Version => write!(f, "version"),
        }
    }
}

impl FromStr for SearchMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" | "repository" => Ok(SearchMethod::Project),
            "code" => Ok(SearchMethod::Code),
            "meta" => Ok(SearchMethod::Meta),
            "version" => Ok(SearchMethod::Version),
            _ => Err(ConfigError::InvalidField {
                field: "search_method",
                value: s.to_string(),
                reason: "expected 'project', 'code', 'meta' or 'version'".to_string(),
            }),
        }
    }
}

/// Sub-entity selector required by the `Meta` and `Version` search methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchEntity {
    Topic,
    Label,
    TextMatch,
    Commit,
    Issue,
    PullRequest,
}

impl SearchEntity {
    /// The search method this entity belongs to.
    pub fn method(&self) -> SearchMethod {
        match self {
            SearchEntity::Topic | SearchEntity::Label | SearchEntity::TextMatch => {
                SearchMethod::Meta
            }
            SearchEntity::Commit | SearchEntity::Issue | SearchEntity::PullRequest => {
                SearchMethod::Version
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEntity::Topic => "topic",
            SearchEntity::Label => "label",
            SearchEntity::TextMatch => "text_match",
            SearchEntity::Commit => "commit",
            SearchEntity::Issue => "issue",
            SearchEntity::PullRequest => "pull_request",
        }
    }
}

impl FromStr for SearchEntity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topic" => Ok(SearchEntity::Topic),
            "label" => Ok(SearchEntity::Label),
            "text_match" => Ok(SearchEntity::TextMatch),
            "commit" => Ok(SearchEntity::Commit),
            "issue" => Ok(SearchEntity::Issue),
            "pull_request" => Ok(SearchEntity::PullRequest),
            other => Err(format!("unknown search entity '{other}'")),
        }
    }
}

/// Username/password pair attached to provider requests.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for an HTTP `Authorization` header.
    pub fn header_value(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where the external command's output goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputSink {
    /// Share the parent process's stream.
    #[default]
    Inherit,
    /// Discard output.
    Null,
    /// Append to a file, opened for every invocation.
    File(PathBuf),
}

impl OutputSink {
    pub(crate) fn to_stdio(&self) -> Result<Stdio, ExecutionError> {
        match self {
            OutputSink::Inherit => Ok(Stdio::inherit()),
            OutputSink::Null => Ok(Stdio::null()),
            OutputSink::File(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(Stdio::from)
                .map_err(|source| ExecutionError::Sink {
                    path: path.clone(),
                    source,
                }),
        }
    }
}

/// Configuration handed to a backend factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub auth_method: AuthMethod,
    #[serde(default)]
    pub search_method: SearchMethod,
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(skip)]
    pub stdout: OutputSink,
    #[serde(skip)]
    pub stderr: OutputSink,
}

impl BackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_method(mut self, method: AuthMethod) -> Self {
        self.auth_method = method;
        self
    }

    pub fn with_search_method(mut self, method: SearchMethod) -> Self {
        self.search_method = method;
        self
    }

    /// Sets a method-specific parameter.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Configures token authentication.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        self.with_auth_method(AuthMethod::Token)
            .with_option(keys::TOKEN, token)
    }

    pub fn with_stdout(mut self, sink: OutputSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn with_stderr(mut self, sink: OutputSink) -> Self {
        self.stderr = sink;
        self
    }

    /// Returns a parameter if it is set to a non-blank value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Returns a parameter or a `MissingField` error naming it.
    pub fn require(&self, key: &'static str, context: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingField {
            field: key,
            context: context.to_string(),
        })
    }

    /// Parses an optional parameter.
    pub fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| ConfigError::InvalidField {
                    field: key,
                    value: raw.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Resolves the configured auth method into credentials.
    ///
    /// Basic auth needs both `username` and `password`; token auth needs a
    /// `token`, sent as the password of [`TOKEN_AUTH_USERNAME`].
    pub fn credentials(&self) -> Result<Option<BasicAuth>, ConfigError> {
        match self.auth_method {
            AuthMethod::None => Ok(None),
            AuthMethod::Basic => {
                let username = self.require(keys::USERNAME, "for basic auth")?;
                let password = self.require(keys::PASSWORD, "for basic auth")?;
                Ok(Some(BasicAuth::new(username, password)))
            }
            AuthMethod::Token => {
                let token = self.require(keys::TOKEN, "for token auth")?;
                Ok(Some(BasicAuth::new(TOKEN_AUTH_USERNAME, token)))
            }
        }
    }
}
