use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::version_file::AssetIndexInfo;
use crate::core::version::Mirror;

const RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Top-level asset index JSON structure.
#[derive(Debug, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
    /// Pre-1.7 indexes: objects are also laid out by name under `virtual/<id>`.
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    /// Very old indexes: objects are copied into the game's `resources/`.
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

impl AssetObject {
    /// A well-formed object hash is 40 hex digits.
    fn has_valid_hash(&self) -> bool {
        self.hash.len() == 40 && self.hash.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// `<hh>/<hash>`, shared by the objects store and the resources host.
    /// Only meaningful for objects with a valid hash.
    fn relative(&self) -> String {
        format!("{}/{}", self.hash.get(..2).unwrap_or_default(), self.hash)
    }
}

/// Value of `${game_assets}` for an index id. Agrees with
/// [`AssetIndex::legacy_target`] for the two legacy indexes Mojang publishes.
pub fn game_assets_dir(index_id: &str, assets_dir: &Path, game_dir: &Path) -> PathBuf {
    match index_id {
        "pre-1.6" => resources_dir(game_dir),
        "legacy" => virtual_dir(assets_dir, index_id),
        _ => assets_dir.to_path_buf(),
    }
}

fn resources_dir(game_dir: &Path) -> PathBuf {
    game_dir.join("resources")
}

fn virtual_dir(assets_dir: &Path, index_id: &str) -> PathBuf {
    assets_dir.join("virtual").join(index_id)
}

/// `name` as a relative path, or `None` if it could leave the target dir.
fn safe_relative(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| path.to_path_buf())
}

impl AssetIndex {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// One entry per distinct object. Objects are content addressed, so
    /// names that share a hash share a file.
    pub fn download_entries(&self, assets_dir: &Path, mirror: &Mirror) -> Vec<DownloadEntry> {
        let objects_dir = assets_dir.join("objects");
        let mut seen = HashSet::new();

        let mut entries: Vec<DownloadEntry> = self
            .objects
            .iter()
            .filter(|(name, obj)| {
                if !obj.has_valid_hash() {
                    warn!("Skipping asset {} with malformed hash {:?}", name, obj.hash);
                    return false;
                }
                seen.insert(obj.hash.as_str())
            })
            .map(|(name, obj)| DownloadEntry {
                label: format!("asset {}", name),
                urls: mirror.sources(&format!("{}/{}", RESOURCES_URL, obj.relative())),
                dest: objects_dir.join(obj.relative()),
                sha1: Some(obj.hash.clone()),
                size: Some(obj.size),
            })
            .collect();
        entries.sort_by(|a, b| a.dest.cmp(&b.dest));
        entries
    }

    /// Directory that needs a by-name copy of the objects, if any.
    pub fn legacy_target(&self, index_id: &str, assets_dir: &Path, game_dir: &Path) -> Option<PathBuf> {
        if self.map_to_resources {
            Some(resources_dir(game_dir))
        } else if self.is_virtual {
            Some(virtual_dir(assets_dir, index_id))
        } else {
            None
        }
    }
}

/// Ensure `indexes/<id>.json` exists and is valid, then parse it.
pub async fn fetch_index(
    info: &AssetIndexInfo,
    assets_dir: &Path,
    downloader: &Downloader,
    mirror: &Mirror,
) -> LauncherResult<AssetIndex> {
    let dest = assets_dir.join("indexes").join(format!("{}.json", info.id));
    downloader
        .fetch(&DownloadEntry {
            label: format!("asset index {}", info.id),
            urls: mirror.sources(&info.url),
            dest: dest.clone(),
            sha1: info.sha1.clone(),
            size: info.size,
        })
        .await?;

    let raw = tokio::fs::read_to_string(&dest)
        .await
        .map_err(|e| LauncherError::io(&dest, e))?;
    let index = AssetIndex::parse(&raw).map_err(|e| {
        LauncherError::Resolution(format!("asset index {} is malformed: {}", info.id, e))
    })?;
    info!("Asset index {}: {} objects", info.id, index.objects.len());
    Ok(index)
}

/// Copy objects to their by-name location for legacy indexes. Existing
/// files are left alone. Returns the number of files copied.
pub async fn materialize_legacy(
    index: &AssetIndex,
    assets_dir: &Path,
    target: PathBuf,
) -> LauncherResult<usize> {
    let objects_dir = assets_dir.join("objects");
    let mut pairs: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(index.objects.len());
    for (name, obj) in &index.objects {
        let Some(relative) = safe_relative(name).filter(|_| obj.has_valid_hash()) else {
            warn!("Not materializing suspicious asset entry {:?}", name);
            continue;
        };
        pairs.push((objects_dir.join(obj.relative()), target.join(relative)));
    }

    tokio::task::spawn_blocking(move || {
        let mut copied = 0;
        for (source, dest) in pairs {
            if dest.exists() {
                continue;
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
            }
            std::fs::copy(&source, &dest).map_err(|e| LauncherError::io(&source, e))?;
            copied += 1;
        }
        debug!("Copied {} legacy assets into {:?}", copied, target);
        Ok(copied)
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?
}
