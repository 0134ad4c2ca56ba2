//! `git clone` retrieval backend.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::RetrievalBackend;
use crate::backend::{keys, BackendConfig, BasicAuth};
use crate::error::{ConfigError, RetrievalError};

/// Clones projects with the `git` executable.
///
/// Credentials are passed per invocation as an `http.extraHeader` config
/// override; they never end up in the remote URL or in the clone's config.
#[derive(Debug, Clone)]
pub struct GitRetriever {
    auth: Option<BasicAuth>,
    depth: Option<u32>,
    git_program: PathBuf,
}

impl Default for GitRetriever {
    fn default() -> Self {
        Self {
            auth: None,
            depth: None,
            git_program: PathBuf::from("git"),
        }
    }
}

impl GitRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates credentials and the optional `depth` key.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let auth = config.credentials()?;
        let depth = config.parse::<u32>(keys::DEPTH)?;
        if depth == Some(0) {
            return Err(ConfigError::InvalidField {
                field: keys::DEPTH,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            auth,
            depth,
            ..Self::default()
        })
    }

    pub fn with_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Shallow clone with the given history depth.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_git_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.git_program = program.into();
        self
    }

    fn clone_args(&self, source_location: &str, dest: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(auth) = &self.auth {
            args.push("-c".into());
            args.push(format!("http.extraHeader=Authorization: {}", auth.header_value()).into());
        }
        args.push("clone".into());
        args.push("--quiet".into());
        if let Some(depth) = self.depth {
            args.push("--depth".into());
            args.push(depth.to_string().into());
        }
        args.push("--".into());
        args.push(source_location.into());
        args.push(dest.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl RetrievalBackend for GitRetriever {
    async fn retrieve(
        &self,
        cancel: &CancellationToken,
        source_location: &str,
        dest: &Path,
    ) -> Result<(), RetrievalError> {
        if dest.as_os_str().is_empty() {
            return Err(RetrievalError::MissingDestination);
        }
        if source_location.trim().is_empty() {
            return Err(RetrievalError::MissingSource);
        }
        if cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        debug!(source = %source_location, dest = %dest.display(), "Cloning project");

        let child = Command::new(&self.git_program)
            .args(self.clone_args(source_location, dest))
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RetrievalError::Spawn)?;

        // Dropping the child on cancellation kills the clone.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            output = child.wait_with_output() => output.map_err(RetrievalError::Spawn)?,
        };

        if !output.status.success() {
            return Err(RetrievalError::CloneFailed {
                source_location: source_location.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(source = %source_location, dest = %dest.display(), "Project cloned");
        Ok(())
    }
}
