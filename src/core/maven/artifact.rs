use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::core::error::{LauncherError, LauncherResult};

/// A parsed Maven coordinate.
///
/// Supported formats:
///   `groupId:artifactId:version`
///   `groupId:artifactId:version:classifier`
///   `groupId:artifactId:version[:classifier]@extension`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension. Defaults to `"jar"`.
    pub extension: String,
}

impl MavenArtifact {
    pub fn parse(coord: &str) -> LauncherResult<Self> {
        let (coord_part, extension) = match coord.rsplit_once('@') {
            Some((head, ext)) => (head, ext),
            None => (coord, "jar"),
        };

        let parts: Vec<&str> = coord_part.split(':').collect();
        if parts.iter().any(|p| p.trim().is_empty()) || extension.is_empty() {
            return Err(LauncherError::InvalidMavenCoordinate(coord.to_string()));
        }

        let classifier = match parts.len() {
            3 => None,
            4 => Some(parts[3].to_string()),
            _ => return Err(LauncherError::InvalidMavenCoordinate(coord.to_string())),
        };

        Ok(Self {
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier,
            extension: extension.to_string(),
        })
    }

    /// `group:artifact[:classifier]`, the version-less identity of a library.
    pub fn logical_name(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}:{}:{}", self.group_id, self.artifact_id, c),
            None => format!("{}:{}", self.group_id, self.artifact_id),
        }
    }

    /// Same coordinate with a different classifier.
    pub fn with_classifier(&self, classifier: &str) -> Self {
        Self {
            classifier: Some(classifier.to_string()),
            ..self.clone()
        }
    }

    pub fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// `artifactId-version[-classifier].extension`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!(
                "{}-{}-{}.{}",
                self.artifact_id, self.version, c, self.extension
            ),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }

    /// Repository-relative path using forward slashes, as it appears in URLs.
    pub fn repo_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_path(),
            self.artifact_id,
            self.version,
            self.filename()
        )
    }

    pub fn url(&self, repo_base: &str) -> String {
        format!("{}/{}", repo_base.trim_end_matches('/'), self.repo_path())
    }

    /// Path relative to the libraries directory.
    pub fn local_path(&self) -> PathBuf {
        PathBuf::from(self.group_path())
            .join(&self.artifact_id)
            .join(&self.version)
            .join(self.filename())
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}
