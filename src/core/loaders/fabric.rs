use serde::{Deserialize, Serialize};

use super::{DocumentSource, LaunchArgs, LoaderManifest, LoaderType, LoaderVersion};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::FABRIC_MAVEN;
use crate::core::version::version_file::ArgumentValue;
use crate::core::version::{DocumentFormat, LibraryEntry, ManifestCache};

const FABRIC_META_BASE: &str = "https://meta.fabricmc.net/v2";

/// Launcher profile served by Fabric meta.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub inherits_from: Option<String>,
    pub main_class: String,
    #[serde(default)]
    pub libraries: Vec<FabricLibrary>,
    #[serde(default)]
    pub arguments: Option<FabricArguments>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FabricLibrary {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FabricArguments {
    #[serde(default)]
    pub jvm: Vec<String>,
    #[serde(default)]
    pub game: Vec<String>,
}

pub(super) fn document_source(mc_version: &str, loader_version: &str) -> DocumentSource {
    DocumentSource {
        key: format!("fabric-{}-{}", mc_version, loader_version),
        urls: vec![format!(
            "{}/versions/loader/{}/{}/profile/json",
            FABRIC_META_BASE, mc_version, loader_version
        )],
        format: DocumentFormat::Json,
    }
}

impl FabricProfile {
    pub fn normalize(self, loader_version: &str) -> LauncherResult<LoaderManifest> {
        let mc_version = self.inherits_from.ok_or_else(|| {
            LauncherError::LoaderApi(format!(
                "Fabric profile for {} does not name a Minecraft version",
                loader_version
            ))
        })?;

        let libraries = self
            .libraries
            .into_iter()
            .map(|lib| LibraryEntry {
                sha1: lib.sha1,
                size: lib.size,
                ..LibraryEntry::from_coordinate(
                    &lib.name,
                    Some(lib.url.as_deref().unwrap_or(FABRIC_MAVEN)),
                )
            })
            .collect();

        let launch_args_override = self.arguments.map(|args| LaunchArgs {
            game: args.game.into_iter().map(ArgumentValue::Plain).collect(),
            jvm: args.jvm.into_iter().map(ArgumentValue::Plain).collect(),
            legacy: None,
        });

        Ok(LoaderManifest {
            loader_type: LoaderType::Fabric,
            loader_version: loader_version.to_string(),
            mc_version,
            libraries,
            main_class_override: Some(self.main_class),
            launch_args_override,
        })
    }
}

pub(super) async fn list_versions(
    cache: &ManifestCache,
    mc_version: &str,
) -> LauncherResult<Vec<LoaderVersion>> {
    #[derive(Deserialize)]
    struct FabricLoaderEntry {
        loader: FabricLoaderVersion,
    }
    #[derive(Deserialize)]
    struct FabricLoaderVersion {
        version: String,
        #[serde(default)]
        stable: bool,
    }

    let url = format!("{}/versions/loader/{}", FABRIC_META_BASE, mc_version);
    let raw = cache.fetch_text("Fabric loader list", &url).await?;
    let entries: Vec<FabricLoaderEntry> = serde_json::from_str(&raw)
        .map_err(|e| LauncherError::LoaderApi(format!("Unable to parse Fabric list: {}", e)))?;

    Ok(entries
        .into_iter()
        .map(|entry| LoaderVersion {
            version: entry.loader.version,
            stable: entry.loader.stable,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
        "id": "fabric-loader-0.15.11-1.20.1",
        "inheritsFrom": "1.20.1",
        "mainClass": "net.fabricmc.loader.impl.launch.knot.KnotClient",
        "arguments": {"game": [], "jvm": ["-DFabricMcEmu= net.minecraft.client.main.Main "]},
        "libraries": [
            {"name": "org.ow2.asm:asm:9.6", "url": "https://maven.fabricmc.net/"},
            {"name": "net.fabricmc:fabric-loader:0.15.11"}
        ]
    }"#;

    #[test]
    fn profile_normalizes_into_common_shape() {
        let profile: FabricProfile = serde_json::from_str(PROFILE).unwrap();
        let manifest = profile.normalize("0.15.11").unwrap();

        assert_eq!(manifest.loader_type, LoaderType::Fabric);
        assert_eq!(manifest.mc_version, "1.20.1");
        assert_eq!(
            manifest.main_class_override.as_deref(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        assert_eq!(manifest.libraries.len(), 2);
        assert_eq!(manifest.libraries[1].url.as_deref(), Some(FABRIC_MAVEN));
        assert_eq!(manifest.launch_args_override.unwrap().jvm.len(), 1);
    }

    #[test]
    fn profile_without_parent_version_is_rejected() {
        let profile: FabricProfile =
            serde_json::from_str(r#"{"mainClass": "net.fabricmc.Knot"}"#).unwrap();
        assert!(matches!(
            profile.normalize("0.15.11"),
            Err(LauncherError::LoaderApi(_))
        ));
    }
}
