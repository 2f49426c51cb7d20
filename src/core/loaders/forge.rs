use serde::Deserialize;

use super::{DocumentSource, LaunchArgs, LoaderManifest, LoaderType, LoaderVersion};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::FORGE_MAVEN;
use crate::core::version::version_file::Arguments;
use crate::core::version::{DocumentFormat, LibraryEntry, ManifestCache};

/// The `version.json` embedded in Forge and NeoForge installer jars. The
/// installer's `install_profile.json` is read separately, see
/// [`super::processors`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallerVersion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub inherits_from: Option<String>,
    pub main_class: String,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
}

pub(super) fn document_source(mc_version: &str, loader_version: &str) -> DocumentSource {
    let forge_id = format!("{}-{}", mc_version, loader_version);
    DocumentSource {
        key: format!("forge-{}", forge_id),
        urls: vec![format!(
            "{}/net/minecraftforge/forge/{}/forge-{}-installer.jar",
            FORGE_MAVEN, forge_id, forge_id
        )],
        format: DocumentFormat::ZipEntry("version.json"),
    }
}

impl InstallerVersion {
    /// Libraries keep their declared URLs. A blank artifact URL marks a file
    /// the installer ships or its processors build, never a download.
    pub fn normalize(
        self,
        loader_type: LoaderType,
        loader_version: &str,
    ) -> LauncherResult<LoaderManifest> {
        let mc_version = self.inherits_from.ok_or_else(|| {
            LauncherError::LoaderApi(format!(
                "{} {} version.json does not name a Minecraft version",
                loader_type, loader_version
            ))
        })?;

        let launch_args_override = match (self.arguments, self.minecraft_arguments) {
            (None, None) => None,
            (args, legacy) => {
                let args = args.unwrap_or_default();
                Some(LaunchArgs {
                    game: args.game,
                    jvm: args.jvm,
                    legacy,
                })
            }
        };

        Ok(LoaderManifest {
            loader_type,
            loader_version: loader_version.to_string(),
            mc_version,
            libraries: self.libraries,
            main_class_override: Some(self.main_class),
            launch_args_override,
        })
    }
}

pub(super) async fn list_versions(
    cache: &ManifestCache,
    mc_version: &str,
) -> LauncherResult<Vec<LoaderVersion>> {
    let url = format!("{}/net/minecraftforge/forge/maven-metadata.xml", FORGE_MAVEN);
    let prefix = format!("{}-", mc_version);

    Ok(super::maven_versions(cache, "Forge metadata", &url)
        .await?
        .into_iter()
        .filter_map(|v| v.strip_prefix(&prefix).map(str::to_owned))
        .map(|version| LoaderVersion {
            version,
            stable: true,
        })
        .collect())
}
