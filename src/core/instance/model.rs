use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What the local store holds for one version directory. Computed on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstalledVersion {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: Option<String>,
    pub jar_present: bool,
    pub json_present: bool,
}

impl InstalledVersion {
    pub fn is_complete(&self) -> bool {
        self.jar_present && self.json_present
    }
}

/// On-disk layout of a Minecraft root.
///
/// - `versions/<id>/<id>.json` : installed metadata (written last)
/// - `versions/<id>/<id>.jar`  : client jar
/// - `versions/<id>/natives/`  : extracted native libraries
/// - `libraries/`              : maven-style library store
/// - `assets/`                 : content-addressed asset store, shared
#[derive(Debug, Clone)]
pub struct GameLayout {
    root: PathBuf,
}

impl GameLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    pub fn version_dir(&self, id: &str) -> PathBuf {
        self.versions_dir().join(id)
    }

    pub fn version_json(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.json", id))
    }

    pub fn version_jar(&self, id: &str) -> PathBuf {
        self.version_dir(id).join(format!("{}.jar", id))
    }

    pub fn natives_dir(&self, id: &str) -> PathBuf {
        self.version_dir(id).join("natives")
    }

    /// Each version runs in its own directory so saves and mods of
    /// different versions never mix.
    pub fn game_dir(&self, id: &str) -> PathBuf {
        self.version_dir(id)
    }
}
