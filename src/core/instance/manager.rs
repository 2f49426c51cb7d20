use tracing::warn;

use super::model::{GameLayout, InstalledVersion};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::VersionMetadata;

/// Read-only view of the installed versions. Nothing is cached: every call
/// looks at the disk again.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    layout: GameLayout,
}

impl VersionRegistry {
    pub fn new(layout: GameLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &GameLayout {
        &self.layout
    }

    /// All version directories, sorted by id.
    pub async fn list(&self) -> LauncherResult<Vec<InstalledVersion>> {
        let versions_dir = self.layout.versions_dir();
        let mut versions = Vec::new();

        let mut entries = match tokio::fs::read_dir(&versions_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(LauncherError::io(&versions_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LauncherError::io(&versions_dir, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            versions.push(self.inspect(&id).await);
        }

        versions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(versions)
    }

    /// State of one version; a missing directory reports nothing present.
    pub async fn inspect(&self, id: &str) -> InstalledVersion {
        let json_path = self.layout.version_json(id);
        let jar_present = is_file(&self.layout.version_jar(id)).await;

        let (json_present, version_type) = match tokio::fs::read_to_string(&json_path).await {
            Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(doc) => (
                    true,
                    doc.get("type").and_then(|t| t.as_str()).map(str::to_owned),
                ),
                Err(e) => {
                    warn!("Unreadable version json {:?}: {}", json_path, e);
                    (false, None)
                }
            },
            Err(_) => (false, None),
        };

        InstalledVersion {
            id: id.to_string(),
            version_type,
            jar_present,
            json_present,
        }
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.inspect(id).await.is_complete()
    }

    /// Fails unless `id` is fully installed.
    pub async fn require_complete(&self, id: &str) -> LauncherResult<InstalledVersion> {
        validate_version_name(id)?;
        let installed = self.inspect(id).await;
        if installed.is_complete() {
            return Ok(installed);
        }
        if !installed.jar_present && !installed.json_present {
            return Err(LauncherError::VersionNotFound(id.to_string()));
        }
        Err(LauncherError::VersionIncomplete(id.to_string()))
    }

    /// Validate a name for a new install: it must be usable as a single
    /// directory name and must not collide with an existing version.
    pub async fn check_name_conflict(&self, name: &str) -> LauncherResult<()> {
        validate_version_name(name)?;
        if tokio::fs::try_exists(self.layout.version_dir(name))
            .await
            .unwrap_or(false)
        {
            return Err(LauncherError::NameConflict(name.to_string()));
        }
        Ok(())
    }

    /// Installed metadata for a complete version.
    pub async fn load_metadata(&self, id: &str) -> LauncherResult<VersionMetadata> {
        self.require_complete(id).await?;
        let path = self.layout.version_json(id);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
        VersionMetadata::parse(&raw)
            .map_err(|e| LauncherError::Resolution(format!("{} metadata is unreadable: {}", id, e)))
    }
}

pub fn validate_version_name(name: &str) -> LauncherResult<()> {
    let trimmed = name.trim();
    let invalid = trimmed.is_empty()
        || trimmed != name
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control());
    if invalid {
        return Err(LauncherError::InvalidArgument(format!(
            "'{}' is not a valid version name",
            name
        )));
    }
    Ok(())
}

async fn is_file(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn root(label: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("voxel-registry-{}-{}", label, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn install(layout: &GameLayout, id: &str, jar: bool, json: bool) {
        std::fs::create_dir_all(layout.version_dir(id)).unwrap();
        if jar {
            std::fs::write(layout.version_jar(id), b"PK").unwrap();
        }
        if json {
            std::fs::write(
                layout.version_json(id),
                format!(r#"{{"id":"{}","type":"release","mainClass":"M"}}"#, id),
            )
            .unwrap();
        }
    }

    #[tokio::test]
    async fn list_reports_presence_per_version() {
        let dir = root("list");
        let layout = GameLayout::new(&dir);
        install(&layout, "1.21.1", true, true);
        install(&layout, "broken", true, false);

        let registry = VersionRegistry::new(layout);
        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(
            listed[0],
            InstalledVersion {
                id: "1.21.1".into(),
                version_type: Some("release".into()),
                jar_present: true,
                json_present: true,
            }
        );
        assert!(!listed[1].is_complete());

        assert!(registry.exists("1.21.1").await);
        assert!(!registry.exists("broken").await);
        assert!(matches!(
            registry.require_complete("broken").await,
            Err(LauncherError::VersionIncomplete(_))
        ));
        assert!(matches!(
            registry.require_complete("missing").await,
            Err(LauncherError::VersionNotFound(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let registry = VersionRegistry::new(GameLayout::new(root("empty")));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn name_conflicts_and_bad_names_are_rejected() {
        let dir = root("conflict");
        let layout = GameLayout::new(&dir);
        install(&layout, "taken", false, false);
        let registry = VersionRegistry::new(layout);

        assert!(matches!(
            registry.check_name_conflict("taken").await,
            Err(LauncherError::NameConflict(_))
        ));
        assert!(registry.check_name_conflict("fresh").await.is_ok());
        for bad in ["", "..", "a/b", " padded", "c:d"] {
            assert!(matches!(
                registry.check_name_conflict(bad).await,
                Err(LauncherError::InvalidArgument(_))
            ));
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn traversal_ids_never_reach_the_filesystem() {
        let dir = root("traversal");
        let layout = GameLayout::new(&dir);
        // A complete install one level above the versions dir.
        std::fs::create_dir_all(dir.join("outside")).unwrap();
        std::fs::write(dir.join("outside").join("outside.jar"), b"jar").unwrap();
        std::fs::write(dir.join("outside").join("outside.json"), b"{}").unwrap();
        let registry = VersionRegistry::new(layout);

        for id in ["../outside", "..", "a\\b"] {
            assert!(matches!(
                registry.require_complete(id).await,
                Err(LauncherError::InvalidArgument(_))
            ));
            assert!(registry.load_metadata(id).await.is_err());
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
