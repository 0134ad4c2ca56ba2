//! Project descriptors: the unit of work flowing through the pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ProjectError;

/// A discovered project.
///
/// Created by a search backend, handed by value through retrieval and
/// execution. `local_location` stays `None` until retrieval succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProjectRecord")]
pub struct ProjectDescriptor {
    name: String,
    version: String,
    source_location: String,
    local_location: Option<PathBuf>,
}

impl ProjectDescriptor {
    /// Creates a descriptor after validating its identity and source.
    ///
    /// `version` may be empty when the revision could not be resolved.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source_location: impl Into<String>,
    ) -> Result<Self, ProjectError> {
        let name = name.into();
        validate_name(&name)?;

        let source_location = source_location.into();
        if source_location.trim().is_empty() {
            return Err(ProjectError::EmptySource(name));
        }

        Ok(Self {
            name,
            version: version.into(),
            source_location,
            local_location: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source_location(&self) -> &str {
        &self.source_location
    }

    pub fn local_location(&self) -> Option<&Path> {
        self.local_location.as_deref()
    }

    /// Returns a copy of this descriptor that records where it was retrieved to.
    pub fn with_local_location(self, path: impl Into<PathBuf>) -> Self {
        Self {
            local_location: Some(path.into()),
            ..self
        }
    }
}

/// Unvalidated wire form; deserialization goes through [`ProjectDescriptor::new`].
#[derive(Deserialize)]
struct ProjectRecord {
    name: String,
    #[serde(default)]
    version: String,
    source_location: String,
    #[serde(default)]
    local_location: Option<PathBuf>,
}

impl TryFrom<ProjectRecord> for ProjectDescriptor {
    type Error = ProjectError;

    fn try_from(record: ProjectRecord) -> Result<Self, Self::Error> {
        let project = Self::new(record.name, record.version, record.source_location)?;
        Ok(match record.local_location {
            Some(path) => project.with_local_location(path),
            None => project,
        })
    }
}

/// Validates a project identity.
///
/// The name becomes a directory under the run root, so it must be a relative
/// path made of plain segments (`owner/repo`). Rejects absolute paths, `.`/`..`
/// segments, empty segments and backslashes.
pub fn validate_name(name: &str) -> Result<(), ProjectError> {
    if name.is_empty() {
        return Err(ProjectError::EmptyName);
    }

    let invalid = |reason: &str| ProjectError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.len() > 256 {
        return Err(invalid("longer than 256 characters"));
    }
    if name.starts_with('/') {
        return Err(invalid("must be relative"));
    }
    if name.contains('\\') {
        return Err(invalid("must not contain backslashes"));
    }
    for segment in name.split('/') {
        match segment {
            "" => return Err(invalid("contains an empty path segment")),
            "." | ".." => return Err(invalid("must not contain '.' or '..' segments")),
            s if s.starts_with('-') => return Err(invalid("segments must not start with '-'")),
            _ => {}
        }
    }
    Ok(())
}
