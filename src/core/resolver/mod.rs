// ─── Dependency Resolver ───
// Turns (merged) version metadata into the platform-specific artifact graph
// that both the installer and the launch command builder consume.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::core::downloader::DownloadEntry;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::loaders::{self, LoaderManifest};
use crate::core::maven::MOJANG_LIBRARIES;
use crate::core::version::version_file::{AssetIndexInfo, DownloadArtifact, LibArtifact};
use crate::core::version::{LibraryEntry, Mirror, Platform, VersionMetadata};

/// A library file with everything needed to fetch and reference it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedArtifact {
    /// Maven coordinate, including the native classifier when there is one.
    pub name: String,
    /// `None` for artifacts a loader installer produces locally.
    pub url: Option<String>,
    /// Absolute location under the libraries directory.
    pub path: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

impl ResolvedArtifact {
    /// What to download, or `None` when nothing hosts this artifact.
    pub fn download_entry(&self, mirror: &Mirror) -> Option<DownloadEntry> {
        let url = self.url.as_deref()?;
        Some(DownloadEntry {
            label: self.name.clone(),
            urls: mirror.sources(url),
            dest: self.path.clone(),
            sha1: self.sha1.clone(),
            size: self.size,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedGraph {
    pub version_id: String,
    pub version_type: Option<String>,
    pub main_class: String,
    pub asset_index: AssetIndexInfo,
    pub client: Option<DownloadArtifact>,
    /// Classpath libraries in declaration order.
    pub libraries: Vec<ResolvedArtifact>,
    /// Native archives to extract, at most one per library and OS.
    pub natives: Vec<ResolvedArtifact>,
    pub game_arguments: Vec<String>,
    pub jvm_arguments: Vec<String>,
    pub java_major: Option<u32>,
}

/// Resolve `metadata` for `platform`, merging `loader` over it first when
/// one is given.
pub fn resolve(
    metadata: &VersionMetadata,
    loader: Option<&LoaderManifest>,
    platform: &Platform,
    libraries_dir: &Path,
) -> LauncherResult<ResolvedGraph> {
    match loader {
        Some(loader) => resolve_metadata(&loaders::merge(metadata, loader)?, platform, libraries_dir),
        None => resolve_metadata(metadata, platform, libraries_dir),
    }
}

pub fn resolve_metadata(
    metadata: &VersionMetadata,
    platform: &Platform,
    libraries_dir: &Path,
) -> LauncherResult<ResolvedGraph> {
    let main_class = metadata
        .main_class
        .clone()
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| {
            LauncherError::Resolution(format!("{} does not declare a main class", metadata.id))
        })?;
    let asset_index = metadata.asset_index.clone().ok_or_else(|| {
        LauncherError::Resolution(format!("{} does not reference an asset index", metadata.id))
    })?;

    let mut libraries = Vec::new();
    let mut natives = Vec::new();
    let mut seen_paths = HashSet::new();
    let mut seen_natives = HashSet::new();

    for lib in &metadata.libraries {
        if !lib.applies_to(platform) {
            debug!("Skipping {} on {}", lib.name, platform);
            continue;
        }

        if let Some(artifact) = classpath_artifact(lib, libraries_dir)? {
            if seen_paths.insert(artifact.path.clone()) {
                libraries.push(artifact);
            }
        }

        if let Some(classifier) = lib.native_classifier(platform) {
            let native = native_artifact(lib, &classifier, libraries_dir)?;
            let identity = lib.coordinate()?.with_classifier(&classifier).logical_name();
            if seen_natives.insert(identity) {
                natives.push(native);
            }
        }
    }

    Ok(ResolvedGraph {
        version_id: metadata.id.clone(),
        version_type: metadata.version_type.clone(),
        main_class,
        asset_index,
        client: metadata.downloads.as_ref().and_then(|d| d.client.clone()),
        libraries,
        natives,
        game_arguments: metadata.game_arguments(platform),
        jvm_arguments: metadata.jvm_arguments(platform),
        java_major: metadata.required_java_major(),
    })
}

fn declared_repo(lib: &LibraryEntry) -> Option<&str> {
    lib.url.as_deref().filter(|u| !u.trim().is_empty())
}

fn repo_for(lib: &LibraryEntry) -> &str {
    declared_repo(lib).unwrap_or(MOJANG_LIBRARIES)
}

/// The jar that goes on the classpath, if the entry has one. Entries that
/// only publish classifiers are native-only.
///
/// A declared artifact with a blank URL and no repository is not hosted
/// anywhere: Forge-style installers build it on the client.
pub(crate) fn classpath_artifact(
    lib: &LibraryEntry,
    libraries_dir: &Path,
) -> LauncherResult<Option<ResolvedArtifact>> {
    let coordinate = lib
        .coordinate()
        .map_err(|_| LauncherError::Resolution(format!("invalid library name '{}'", lib.name)))?;

    match lib.downloads.as_ref() {
        Some(downloads) => match &downloads.artifact {
            Some(artifact) => Ok(Some(from_lib_artifact(
                &lib.name,
                artifact,
                declared_repo(lib).map(|repo| coordinate.url(repo)),
                &coordinate.local_path(),
                libraries_dir,
            ))),
            None => Ok(None),
        },
        None if lib.natives.is_some() => Ok(None),
        None => Ok(Some(ResolvedArtifact {
            name: lib.name.clone(),
            url: Some(coordinate.url(repo_for(lib))),
            path: libraries_dir.join(coordinate.local_path()),
            sha1: lib.sha1.clone(),
            size: lib.size,
        })),
    }
}

fn native_artifact(
    lib: &LibraryEntry,
    classifier: &str,
    libraries_dir: &Path,
) -> LauncherResult<ResolvedArtifact> {
    let coordinate = lib
        .coordinate()
        .map_err(|_| LauncherError::Resolution(format!("invalid library name '{}'", lib.name)))?
        .with_classifier(classifier);
    let declared = lib
        .downloads
        .as_ref()
        .and_then(|d| d.classifiers.as_ref())
        .and_then(|c| c.get(classifier));

    Ok(match declared {
        Some(artifact) => from_lib_artifact(
            &coordinate.to_string(),
            artifact,
            Some(coordinate.url(repo_for(lib))),
            &coordinate.local_path(),
            libraries_dir,
        ),
        None => ResolvedArtifact {
            name: coordinate.to_string(),
            url: Some(coordinate.url(repo_for(lib))),
            path: libraries_dir.join(coordinate.local_path()),
            sha1: None,
            size: None,
        },
    })
}

fn from_lib_artifact(
    name: &str,
    artifact: &LibArtifact,
    fallback_url: Option<String>,
    fallback_path: &Path,
    libraries_dir: &Path,
) -> ResolvedArtifact {
    let url = if artifact.url.trim().is_empty() {
        fallback_url
    } else {
        Some(artifact.url.clone())
    };
    let path = match artifact.path.as_deref().filter(|p| !p.is_empty()) {
        Some(rel) => libraries_dir.join(rel),
        None => libraries_dir.join(fallback_path),
    };
    ResolvedArtifact {
        name: name.to_string(),
        url,
        path,
        sha1: artifact.sha1.clone(),
        size: artifact.size,
    }
}
