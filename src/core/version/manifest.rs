// ─── Manifest Cache ───
// Fetches and persists the Mojang version index, per-version metadata and
// raw loader documents. Sole writer of everything under the cache dir.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::mirror::Mirror;
use super::version_file::VersionMetadata;
use crate::core::atomic::{write_atomic, write_json_atomic};
use crate::core::downloader::{sha1_bytes, Transport};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::validate_version_name;

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    Release,
    Snapshot,
    OldBeta,
    OldAlpha,
    #[serde(other)]
    Unknown,
}

/// Top-level Mojang version manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: LatestVersions,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestVersions {
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub snapshot: Option<String>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: VersionType,
    pub url: String,
    #[serde(rename = "releaseTime")]
    pub release_time: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn latest_release(&self) -> Option<&str> {
        self.latest.release.as_deref()
    }

    pub fn latest_snapshot(&self) -> Option<&str> {
        self.latest.snapshot.as_deref()
    }

    /// Entries of one type, in manifest order (newest first).
    pub fn list(&self, filter: Option<VersionType>) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| filter.map_or(true, |t| v.version_type == t))
            .collect()
    }

    /// Case-insensitive substring search over version ids.
    pub fn search(&self, keyword: &str) -> Vec<&VersionEntry> {
        let needle = keyword.to_ascii_lowercase();
        self.versions
            .iter()
            .filter(|v| v.id.to_ascii_lowercase().contains(&needle))
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
struct CachedIndex {
    fetched_at: DateTime<Utc>,
    manifest: VersionManifest,
}

/// How a loader document is packaged at its endpoint.
#[derive(Debug, Clone, Copy)]
pub enum DocumentFormat {
    /// The endpoint returns the JSON document itself.
    Json,
    /// The endpoint returns a zip (installer jar); the document is this entry.
    ZipEntry(&'static str),
}

pub struct ManifestCache {
    transport: Arc<dyn Transport>,
    mirror: Mirror,
    cache_dir: PathBuf,
    ttl: Duration,
}

impl ManifestCache {
    pub fn new(
        transport: Arc<dyn Transport>,
        mirror: Mirror,
        cache_dir: PathBuf,
        ttl: Duration,
    ) -> Self {
        Self {
            transport,
            mirror,
            cache_dir,
            ttl,
        }
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    fn index_path(&self) -> PathBuf {
        self.cache_dir.join("version_manifest_v2.json")
    }

    fn version_path(&self, id: &str) -> PathBuf {
        self.cache_dir.join("versions").join(format!("{}.json", id))
    }

    fn loader_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join("loaders").join(format!("{}.json", key))
    }

    fn loader_archive_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join("loaders").join(format!("{}.jar", key))
    }

    // ── Version index ───────────────────────────────────

    /// The version index, served from disk while younger than the TTL.
    /// A stale copy is still used when the network is unreachable.
    pub async fn index(&self, force_refresh: bool) -> LauncherResult<VersionManifest> {
        let cached = read_cached_index(&self.index_path()).await;

        if let Some(cached) = &cached {
            let age = Utc::now() - cached.fetched_at;
            let fresh = age.to_std().map(|a| a < self.ttl).unwrap_or(true);
            if fresh && !force_refresh {
                debug!("Using cached version manifest ({}s old)", age.num_seconds());
                return Ok(cached.manifest.clone());
            }
        }

        info!("Fetching Minecraft version manifest...");
        let fetched = self
            .fetch_text("version manifest", VERSION_MANIFEST_URL)
            .await
            .and_then(|raw| {
                serde_json::from_str::<VersionManifest>(&raw).map_err(|e| {
                    LauncherError::ManifestFetch {
                        what: "version manifest".into(),
                        reason: e.to_string(),
                    }
                })
            });

        match fetched {
            Ok(manifest) => {
                info!("Loaded {} versions from manifest", manifest.versions.len());
                let record = CachedIndex {
                    fetched_at: Utc::now(),
                    manifest,
                };
                write_json_atomic(&self.index_path(), &record).await?;
                Ok(record.manifest)
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!("Manifest refresh failed, using stale cache: {}", e);
                    Ok(stale.manifest)
                }
                None => Err(e),
            },
        }
    }

    pub async fn find(&self, id: &str) -> LauncherResult<VersionEntry> {
        let manifest = self.index(false).await?;
        manifest
            .find_version(id)
            .cloned()
            .ok_or_else(|| LauncherError::VersionNotFound(id.to_string()))
    }

    // ── Per-version metadata ────────────────────────────

    /// Metadata for `id`. The download is checked against the index sha1
    /// before it is cached; a cached copy that still parses is used as is.
    pub async fn metadata(&self, id: &str) -> LauncherResult<VersionMetadata> {
        validate_version_name(id)?;
        let path = self.version_path(id);

        if let Ok(raw) = tokio::fs::read(&path).await {
            match VersionMetadata::parse(&String::from_utf8_lossy(&raw)) {
                Ok(meta) => {
                    debug!("Version {} metadata served from cache", id);
                    return Ok(meta);
                }
                Err(e) => warn!("Discarding unreadable cached metadata {:?}: {}", path, e),
            }
        }

        let entry = self.find(id).await?;
        let what = format!("version metadata for {}", id);
        let raw = self.fetch_text(&what, &entry.url).await?;

        if let Some(expected) = &entry.sha1 {
            let actual = sha1_bytes(raw.as_bytes());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(LauncherError::ManifestFetch {
                    what,
                    reason: format!("sha1 {} does not match index {}", actual, expected),
                });
            }
        }

        let meta = VersionMetadata::parse(&raw).map_err(|e| LauncherError::ManifestFetch {
            what: what.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&path, raw.as_bytes()).await?;
        Ok(meta)
    }

    // ── Loader documents ────────────────────────────────

    /// Raw loader document, cached under `key`. `urls` are alternative
    /// endpoints for the same document, tried in order.
    pub async fn loader_document(
        &self,
        key: &str,
        urls: &[String],
        format: DocumentFormat,
    ) -> LauncherResult<String> {
        let path = self.loader_path(key);
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            debug!("Loader document {} served from cache", key);
            return Ok(raw);
        }

        if let DocumentFormat::ZipEntry(entry) = format {
            let archive = self.loader_archive(key, urls).await?;
            let raw = read_archive_entry(key, &archive, entry).await?;
            write_atomic(&path, raw.as_bytes()).await?;
            return Ok(raw);
        }

        let mut last_error = None;
        for url in urls {
            match self.fetch_text(key, url).await {
                Ok(raw) => {
                    write_atomic(&path, raw.as_bytes()).await?;
                    return Ok(raw);
                }
                Err(e) => {
                    debug!("Loader endpoint {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LauncherError::ManifestFetch {
            what: key.to_string(),
            reason: "no endpoint configured".into(),
        }))
    }

    /// Uncached text fetch through the mirror, for listings.
    pub async fn fetch_text(&self, what: &str, url: &str) -> LauncherResult<String> {
        let mut last_error = String::new();
        for source in self.mirror.sources(url) {
            match self.transport.get_text(&source).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    debug!("{} unavailable at {}: {}", what, source, e);
                    last_error = e.to_string();
                }
            }
        }
        Err(LauncherError::ManifestFetch {
            what: what.to_string(),
            reason: last_error,
        })
    }

    /// A loader installer jar, downloaded once and kept under `key`. `urls`
    /// are alternative locations, each tried through the mirror.
    pub async fn loader_archive(&self, key: &str, urls: &[String]) -> LauncherResult<PathBuf> {
        let path = self.loader_archive_path(key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Loader archive {} served from cache", key);
            return Ok(path);
        }

        let mut last_error = String::from("no endpoint configured");
        for url in urls {
            for source in self.mirror.sources(url) {
                match self.fetch_bytes(&source).await {
                    Ok(bytes) if is_zip(&bytes) => {
                        info!("Fetched {} ({} bytes)", key, bytes.len());
                        write_atomic(&path, &bytes).await?;
                        return Ok(path);
                    }
                    Ok(_) => last_error = format!("{} did not return an archive", source),
                    Err(e) => {
                        debug!("Loader endpoint {} failed: {}", source, e);
                        last_error = e.to_string();
                    }
                }
            }
        }
        Err(LauncherError::ManifestFetch {
            what: key.to_string(),
            reason: last_error,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> LauncherResult<Vec<u8>> {
        let mut body = self.transport.open(url, 0).await?;
        let mut bytes = Vec::with_capacity(body.content_length.unwrap_or(0) as usize);
        while let Some(chunk) = body.chunks.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }
}

async fn read_cached_index(path: &Path) -> Option<CachedIndex> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(cached) => Some(cached),
        Err(e) => {
            warn!("Ignoring corrupt manifest cache {:?}: {}", path, e);
            None
        }
    }
}

fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(b"PK")
}

/// One text entry of a cached archive.
pub(crate) async fn read_archive_entry(what: &str, archive: &Path, entry: &str) -> LauncherResult<String> {
    let archive = archive.to_path_buf();
    let entry_name = entry.to_string();
    tokio::task::spawn_blocking(move || read_zip_entry(&archive, &entry_name))
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?
        .map_err(|e| LauncherError::ManifestFetch {
            what: what.to_string(),
            reason: e.to_string(),
        })
}

fn read_zip_entry(path: &Path, name: &str) -> LauncherResult<String> {
    let file = std::fs::File::open(path).map_err(|e| LauncherError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut entry = archive.by_name(name)?;
    let mut out = String::new();
    entry.read_to_string(&mut out)?;
    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::downloader::transport::memory::MemoryTransport;

    pub(crate) fn manifest_json(versions: &[(&str, &str)]) -> String {
        let entries: Vec<serde_json::Value> = versions
            .iter()
            .map(|(id, url)| {
                serde_json::json!({
                    "id": id,
                    "type": "release",
                    "url": url,
                    "releaseTime": "2024-08-08T12:24:45+00:00"
                })
            })
            .collect();
        serde_json::json!({
            "latest": {"release": versions.first().map(|v| v.0), "snapshot": null},
            "versions": entries
        })
        .to_string()
    }

    fn cache_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "voxel-manifest-{}-{}",
            label,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn cache(transport: &MemoryTransport, dir: &Path, ttl: Duration) -> ManifestCache {
        ManifestCache::new(
            Arc::new(transport.clone()),
            Mirror::official(),
            dir.to_path_buf(),
            ttl,
        )
    }

    #[test]
    fn deserialize_manifest_entry() {
        let json = r#"{
            "id": "1.20.4",
            "type": "old_beta",
            "releaseTime": "2023-12-07T08:00:00+00:00",
            "url": "https://example.com/1.20.4.json",
            "sha1": "abc123"
        }"#;
        let entry: VersionEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "1.20.4");
        assert_eq!(entry.version_type, VersionType::OldBeta);
    }

    #[tokio::test]
    async fn index_is_reused_within_ttl_and_stale_copy_survives_outage() {
        let dir = cache_dir("ttl");
        let transport = MemoryTransport::new();
        transport.serve(VERSION_MANIFEST_URL, manifest_json(&[("1.21.1", "https://m/1.21.1.json")]));

        let fresh = cache(&transport, &dir, Duration::from_secs(300));
        fresh.index(false).await.unwrap();
        fresh.index(false).await.unwrap();
        assert_eq!(transport.requests().len(), 1);

        // Zero TTL forces a refetch, which now fails; the stale copy is used.
        let expired = cache(&transport, &dir, Duration::ZERO);
        transport.fail_times(VERSION_MANIFEST_URL, 1);
        let manifest = expired.index(false).await.unwrap();
        assert_eq!(manifest.latest_release(), Some("1.21.1"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn unreachable_index_without_cache_is_a_manifest_fetch_error() {
        let dir = cache_dir("offline");
        let transport = MemoryTransport::new();
        let err = cache(&transport, &dir, Duration::from_secs(300))
            .index(false)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ManifestFetch { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn metadata_is_fetched_once_then_served_from_disk() {
        let dir = cache_dir("meta");
        let transport = MemoryTransport::new();
        let meta = r#"{"id":"1.21.1","mainClass":"net.minecraft.client.main.Main"}"#;
        transport.serve(VERSION_MANIFEST_URL, manifest_json(&[("1.21.1", "https://m/1.21.1.json")]));
        transport.serve("https://m/1.21.1.json", meta);

        let mc = cache(&transport, &dir, Duration::from_secs(300));
        assert_eq!(mc.metadata("1.21.1").await.unwrap().id, "1.21.1");
        assert_eq!(mc.metadata("1.21.1").await.unwrap().id, "1.21.1");
        assert_eq!(transport.requests().len(), 2);

        let err = mc.metadata("0.0.0").await.unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn malformed_metadata_is_rejected_and_not_cached() {
        let dir = cache_dir("malformed");
        let transport = MemoryTransport::new();
        transport.serve(VERSION_MANIFEST_URL, manifest_json(&[("1.21.1", "https://m/bad.json")]));
        transport.serve("https://m/bad.json", "{not json");

        let mc = cache(&transport, &dir, Duration::from_secs(300));
        let err = mc.metadata("1.21.1").await.unwrap_err();
        assert!(matches!(err, LauncherError::ManifestFetch { .. }));
        assert!(!dir.join("versions").join("1.21.1.json").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn metadata_with_wrong_sha1_is_not_cached() {
        let dir = cache_dir("sha1");
        let transport = MemoryTransport::new();
        let meta = r#"{"id":"1.21.1","mainClass":"net.minecraft.client.main.Main"}"#;
        transport.serve(
            VERSION_MANIFEST_URL,
            serde_json::json!({
                "latest": {"release": "1.21.1", "snapshot": null},
                "versions": [
                    {"id": "1.21.1", "type": "release", "url": "https://m/1.21.1.json",
                     "releaseTime": "2024-08-08T12:24:45+00:00", "sha1": "0000000000000000000000000000000000000000"},
                    {"id": "1.20.1", "type": "release", "url": "https://m/1.20.1.json",
                     "releaseTime": "2023-06-12T13:25:51+00:00", "sha1": sha1_bytes(meta.as_bytes())}
                ]
            })
            .to_string(),
        );
        transport.serve("https://m/1.21.1.json", meta);
        transport.serve("https://m/1.20.1.json", meta);

        let mc = cache(&transport, &dir, Duration::from_secs(300));
        match mc.metadata("1.21.1").await.unwrap_err() {
            LauncherError::ManifestFetch { reason, .. } => assert!(reason.contains("does not match")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!mc.version_path("1.21.1").exists());

        mc.metadata("1.20.1").await.unwrap();
        assert!(mc.version_path("1.20.1").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn metadata_ids_outside_the_cache_are_rejected() {
        let dir = cache_dir("traversal");
        let transport = MemoryTransport::new();
        let mc = cache(&transport, &dir, Duration::from_secs(300));

        for id in ["../escape", "a/b", ""] {
            let err = mc.metadata(id).await.unwrap_err();
            assert!(matches!(err, LauncherError::InvalidArgument(_)), "{id}");
        }
        assert!(transport.requests().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn loader_archive_is_downloaded_once_and_must_be_a_zip() {
        let dir = cache_dir("archive");
        let transport = MemoryTransport::new();
        let jar = crate::core::loaders::processors::tests::zip_bytes(&[("version.json", b"{}".as_slice())]);
        transport.serve("https://maven/missing.jar", b"<html>not found</html>".to_vec());
        transport.serve("https://maven/installer.jar", jar);
        let mc = cache(&transport, &dir, Duration::from_secs(300));
        let urls = vec![
            "https://maven/missing.jar".to_string(),
            "https://maven/installer.jar".to_string(),
        ];

        let path = mc.loader_archive("forge-test", &urls).await.unwrap();
        assert_eq!(read_archive_entry("forge-test", &path, "version.json").await.unwrap(), "{}");
        mc.loader_archive("forge-test", &urls).await.unwrap();
        assert_eq!(transport.requests().len(), 2);

        let err = mc
            .loader_archive("other", &urls[..1])
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ManifestFetch { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn search_and_filter() {
        let manifest: VersionManifest = serde_json::from_str(&manifest_json(&[
            ("1.21.1", "u1"),
            ("1.20.1", "u2"),
        ]))
        .unwrap();
        assert_eq!(manifest.search("1.20").len(), 1);
        assert_eq!(manifest.list(Some(VersionType::Release)).len(), 2);
        assert!(manifest.list(Some(VersionType::Snapshot)).is_empty());
    }
}
