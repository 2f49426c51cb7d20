// OptiFine is not published to a maven repository; builds are listed and
// served by BMCLAPI, and the game is started through LaunchWrapper.

use serde::Deserialize;

use super::{DocumentSource, LaunchArgs, LoaderManifest, LoaderType, LoaderVersion};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MOJANG_LIBRARIES;
use crate::core::version::version_file::{ArgumentValue, LibArtifact, LibraryDownloads};
use crate::core::version::{DocumentFormat, LibraryEntry, ManifestCache};

const BMCLAPI_BASE: &str = "https://bmclapi2.bangbang93.com";
const LAUNCHWRAPPER: &str = "net.minecraft:launchwrapper:1.12";
const LAUNCH_MAIN_CLASS: &str = "net.minecraft.launchwrapper.Launch";
const TWEAK_CLASS: &str = "optifine.OptiFineTweaker";

#[derive(Debug, Clone, Deserialize)]
pub struct OptiFineBuild {
    pub mcversion: String,
    #[serde(rename = "type")]
    pub build_type: String,
    pub patch: String,
    #[serde(default)]
    pub filename: Option<String>,
}

impl OptiFineBuild {
    /// `HD_U_I6` style identifier used as the loader version.
    pub fn version(&self) -> String {
        format!("{}_{}", self.build_type, self.patch)
    }

    fn download_url(&self) -> String {
        format!(
            "{}/optifine/{}/{}/{}",
            BMCLAPI_BASE, self.mcversion, self.build_type, self.patch
        )
    }
}

pub(super) fn document_source(mc_version: &str) -> DocumentSource {
    DocumentSource {
        key: format!("optifine-{}", mc_version),
        urls: vec![format!("{}/optifine/{}", BMCLAPI_BASE, mc_version)],
        format: DocumentFormat::Json,
    }
}

pub(super) fn normalize(
    builds: Vec<OptiFineBuild>,
    loader_version: &str,
) -> LauncherResult<LoaderManifest> {
    let build = builds
        .into_iter()
        .find(|b| b.version() == loader_version || b.patch == loader_version)
        .ok_or_else(|| {
            LauncherError::LoaderApi(format!("OptiFine build {} not found", loader_version))
        })?;

    let coordinate = format!("optifine:OptiFine:{}_{}", build.mcversion, build.version());
    let jar = LibraryEntry {
        downloads: Some(LibraryDownloads {
            artifact: Some(LibArtifact {
                path: None,
                sha1: None,
                size: None,
                url: build.download_url(),
            }),
            classifiers: None,
        }),
        ..LibraryEntry::from_coordinate(&coordinate, None)
    };
    let launchwrapper = LibraryEntry::from_coordinate(LAUNCHWRAPPER, Some(MOJANG_LIBRARIES));

    Ok(LoaderManifest {
        loader_type: LoaderType::OptiFine,
        loader_version: build.version(),
        mc_version: build.mcversion,
        libraries: vec![jar, launchwrapper],
        main_class_override: Some(LAUNCH_MAIN_CLASS.to_string()),
        launch_args_override: Some(LaunchArgs {
            game: vec![
                ArgumentValue::Plain("--tweakClass".into()),
                ArgumentValue::Plain(TWEAK_CLASS.into()),
            ],
            jvm: Vec::new(),
            legacy: None,
        }),
    })
}

pub(super) async fn list_versions(
    cache: &ManifestCache,
    mc_version: &str,
) -> LauncherResult<Vec<LoaderVersion>> {
    let source = document_source(mc_version);
    let raw = cache.fetch_text("OptiFine list", &source.urls[0]).await?;
    let builds: Vec<OptiFineBuild> = serde_json::from_str(&raw)
        .map_err(|e| LauncherError::LoaderApi(format!("Unable to parse OptiFine list: {}", e)))?;

    Ok(builds
        .iter()
        .map(|b| LoaderVersion {
            version: b.version(),
            stable: !b.patch.starts_with("pre"),
        })
        .collect())
}
