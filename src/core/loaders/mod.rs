// ─── Loader Merger ───
// Fetches a loader's own manifest, normalizes its schema into a common shape,
// and merges it over the base version.

pub mod fabric;
pub mod forge;
mod merge;
pub mod neoforge;
pub mod optifine;
pub mod processors;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::version_file::ArgumentValue;
use crate::core::version::{LibraryEntry, ManifestCache};

pub use merge::merge;

/// Supported mod loaders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    Fabric,
    Forge,
    NeoForge,
    OptiFine,
}

impl fmt::Display for LoaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderType::Fabric => write!(f, "fabric"),
            LoaderType::Forge => write!(f, "forge"),
            LoaderType::NeoForge => write!(f, "neoforge"),
            LoaderType::OptiFine => write!(f, "optifine"),
        }
    }
}

impl FromStr for LoaderType {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fabric" => Ok(LoaderType::Fabric),
            "forge" => Ok(LoaderType::Forge),
            "neoforge" => Ok(LoaderType::NeoForge),
            "optifine" => Ok(LoaderType::OptiFine),
            other => Err(LauncherError::InvalidArgument(format!(
                "unknown loader type '{}'",
                other
            ))),
        }
    }
}

impl LoaderType {
    /// Name given to a loader install when the caller does not choose one.
    pub fn default_version_name(self, mc_version: &str, loader_version: &str) -> String {
        match self {
            LoaderType::Fabric => format!("fabric-loader-{}-{}", loader_version, mc_version),
            LoaderType::Forge => format!("{}-forge-{}", mc_version, loader_version),
            LoaderType::NeoForge => format!("neoforge-{}", loader_version),
            LoaderType::OptiFine => format!("{}-OptiFine_{}", mc_version, loader_version),
        }
    }

    /// Where the loader's manifest lives. Alternatives are tried in order.
    fn document_source(self, mc_version: &str, loader_version: &str) -> DocumentSource {
        match self {
            LoaderType::Fabric => fabric::document_source(mc_version, loader_version),
            LoaderType::Forge => forge::document_source(mc_version, loader_version),
            LoaderType::NeoForge => neoforge::document_source(loader_version),
            LoaderType::OptiFine => optifine::document_source(mc_version),
        }
    }
}

pub(crate) struct DocumentSource {
    pub key: String,
    pub urls: Vec<String>,
    pub format: crate::core::version::DocumentFormat,
}

/// Arguments a loader adds on top of the base version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LaunchArgs {
    #[serde(default)]
    pub game: Vec<ArgumentValue>,
    #[serde(default)]
    pub jvm: Vec<ArgumentValue>,
    /// Complete `minecraftArguments` string; replaces the base one.
    #[serde(default)]
    pub legacy: Option<String>,
}

/// The common shape every loader schema is normalized into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderManifest {
    pub loader_type: LoaderType,
    pub loader_version: String,
    /// Minecraft version the loader build targets, as declared by the loader.
    pub mc_version: String,
    pub libraries: Vec<LibraryEntry>,
    pub main_class_override: Option<String>,
    pub launch_args_override: Option<LaunchArgs>,
}

impl LoaderManifest {
    pub fn describe(&self) -> String {
        format!("{} {}", self.loader_type, self.loader_version)
    }
}

/// A loader manifest in its native schema, before normalization.
#[derive(Debug, Clone)]
pub enum RawLoaderManifest {
    Fabric(fabric::FabricProfile),
    Forge(forge::InstallerVersion),
    NeoForge(forge::InstallerVersion),
    OptiFine(Vec<optifine::OptiFineBuild>),
}

impl RawLoaderManifest {
    pub fn parse(loader_type: LoaderType, raw: &str) -> LauncherResult<Self> {
        let parsed = match loader_type {
            LoaderType::Fabric => RawLoaderManifest::Fabric(serde_json::from_str(raw)?),
            LoaderType::Forge => RawLoaderManifest::Forge(serde_json::from_str(raw)?),
            LoaderType::NeoForge => RawLoaderManifest::NeoForge(serde_json::from_str(raw)?),
            LoaderType::OptiFine => RawLoaderManifest::OptiFine(serde_json::from_str(raw)?),
        };
        Ok(parsed)
    }

    pub fn normalize(self, loader_version: &str) -> LauncherResult<LoaderManifest> {
        match self {
            RawLoaderManifest::Fabric(profile) => profile.normalize(loader_version),
            RawLoaderManifest::Forge(version) => version.normalize(LoaderType::Forge, loader_version),
            RawLoaderManifest::NeoForge(version) => {
                version.normalize(LoaderType::NeoForge, loader_version)
            }
            RawLoaderManifest::OptiFine(builds) => optifine::normalize(builds, loader_version),
        }
    }
}

/// Fetch (through the manifest cache) and normalize a loader manifest.
pub async fn fetch_loader_manifest(
    cache: &ManifestCache,
    loader_type: LoaderType,
    mc_version: &str,
    loader_version: &str,
) -> LauncherResult<LoaderManifest> {
    info!(
        "Resolving {} {} for Minecraft {}",
        loader_type, loader_version, mc_version
    );
    let source = loader_type.document_source(mc_version, loader_version);
    let raw = cache
        .loader_document(&source.key, &source.urls, source.format)
        .await?;

    RawLoaderManifest::parse(loader_type, &raw)
        .and_then(|manifest| manifest.normalize(loader_version))
        .map_err(|e| match e {
            LauncherError::LoaderApi(_) | LauncherError::LoaderMismatch { .. } => e,
            other => LauncherError::ManifestFetch {
                what: format!("{} {} manifest", loader_type, loader_version),
                reason: other.to_string(),
            },
        })
}

/// A selectable loader build for one Minecraft version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoaderVersion {
    pub version: String,
    pub stable: bool,
}

/// Loader builds available for `mc_version`, newest first.
pub async fn list_versions(
    cache: &ManifestCache,
    loader_type: LoaderType,
    mc_version: &str,
) -> LauncherResult<Vec<LoaderVersion>> {
    let mut versions = match loader_type {
        LoaderType::Fabric => fabric::list_versions(cache, mc_version).await?,
        LoaderType::Forge => forge::list_versions(cache, mc_version).await?,
        LoaderType::NeoForge => neoforge::list_versions(cache, mc_version).await?,
        LoaderType::OptiFine => optifine::list_versions(cache, mc_version).await?,
    };

    versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
    versions.dedup_by(|a, b| a.version == b.version);
    Ok(versions)
}

// ─── Maven metadata ───

#[derive(Debug, Deserialize)]
struct MavenMetadata {
    versioning: MavenVersioning,
}

#[derive(Debug, Deserialize)]
struct MavenVersioning {
    versions: MavenVersions,
}

#[derive(Debug, Deserialize)]
struct MavenVersions {
    #[serde(rename = "version", default)]
    version: Vec<String>,
}

/// All versions listed in a `maven-metadata.xml`.
pub(crate) async fn maven_versions(
    cache: &ManifestCache,
    what: &str,
    url: &str,
) -> LauncherResult<Vec<String>> {
    let xml = cache.fetch_text(what, url).await?;
    let metadata: MavenMetadata = quick_xml::de::from_str(&xml)
        .map_err(|e| LauncherError::LoaderApi(format!("Unable to parse {}: {}", what, e)))?;
    Ok(metadata.versioning.versions.version)
}

fn version_sort_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

pub(crate) fn compare_versions(a: &str, b: &str) -> Ordering {
    version_sort_key(a)
        .cmp(&version_sort_key(b))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_type_parses_case_insensitively() {
        assert_eq!("NeoForge".parse::<LoaderType>().unwrap(), LoaderType::NeoForge);
        assert_eq!("optifine".parse::<LoaderType>().unwrap(), LoaderType::OptiFine);
        assert!("quilt".parse::<LoaderType>().is_err());
    }

    #[test]
    fn default_names_follow_each_ecosystem() {
        assert_eq!(
            LoaderType::Fabric.default_version_name("1.20.1", "0.15.11"),
            "fabric-loader-0.15.11-1.20.1"
        );
        assert_eq!(
            LoaderType::Forge.default_version_name("1.20.1", "47.2.0"),
            "1.20.1-forge-47.2.0"
        );
        assert_eq!(
            LoaderType::NeoForge.default_version_name("1.21.1", "21.1.65"),
            "neoforge-21.1.65"
        );
        assert_eq!(
            LoaderType::OptiFine.default_version_name("1.20.1", "HD_U_I6"),
            "1.20.1-OptiFine_HD_U_I6"
        );
    }

    #[test]
    fn versions_compare_numerically() {
        assert_eq!(compare_versions("47.10.0", "47.9.1"), Ordering::Greater);
        assert_eq!(compare_versions("0.15.11", "0.15.2"), Ordering::Greater);
    }

    #[test]
    fn maven_metadata_deserializes() {
        let xml = r#"<metadata><groupId>net.minecraftforge</groupId>
            <versioning><versions><version>1.20.1-47.2.0</version>
            <version>1.20.1-47.1.0</version></versions></versioning></metadata>"#;
        let meta: MavenMetadata = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(meta.versioning.versions.version.len(), 2);
    }
}
