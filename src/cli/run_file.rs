//! Run files: the `--file` alternative to passing every option as a flag.
//!
//! JSON by default, YAML when the extension is `.yaml` or `.yml`. Every key
//! is optional; keys present in the file override the matching flag.
//!
//! ```json
//! {
//!   "access_token": "ghp_...",
//!   "search_type": "code",
//!   "query": "filename:Makefile test",
//!   "command": "make test"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use super::commands::RunArgs;
use crate::backend::SearchMethod;

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunFile {
    pub access_token: Option<String>,
    pub search_type: Option<SearchMethod>,
    pub query: Option<String>,
    #[serde(alias = "external_command")]
    pub command: Option<String>,
    pub projects_directory: Option<PathBuf>,
    pub plain_retrieve: Option<bool>,
    pub clean: Option<bool>,
    pub num_results: Option<usize>,
    pub entity: Option<String>,
}

impl RunFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run file {}", path.display()))?;
        Self::parse(path, &contents)
    }

    fn parse(path: &Path, contents: &str) -> anyhow::Result<Self> {
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        if is_yaml {
            serde_yaml::from_str(contents)
                .with_context(|| format!("Invalid YAML in run file {}", path.display()))
        } else {
            serde_json::from_str(contents)
                .with_context(|| format!("Invalid JSON in run file {}", path.display()))
        }
    }

    /// Overrides `args` with every value set in the file.
    pub fn apply(self, args: &mut RunArgs) {
        if let Some(token) = self.access_token {
            args.access_token = Some(token);
        }
        if let Some(method) = self.search_type {
            args.search_type = method;
        }
        if let Some(query) = self.query {
            args.query = Some(query);
        }
        if let Some(command) = self.command {
            args.command = Some(command);
        }
        if let Some(dir) = self.projects_directory {
            args.projects_directory = dir;
        }
        if let Some(plain) = self.plain_retrieve {
            args.plain_retrieve = plain;
        }
        if let Some(clean) = self.clean {
            args.clean = clean;
        }
        if let Some(n) = self.num_results {
            args.num_results = n;
        }
        if let Some(entity) = self.entity {
            args.entity = Some(entity);
        }
    }
}
