use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::settings::LauncherSettings;
use crate::core::downloader::{Downloader, HttpTransport, RetryPolicy, Transport};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::install::Installer;
use crate::core::instance::{GameLayout, VersionRegistry};
use crate::core::launch::ProcessSupervisor;
use crate::core::progress::ProgressStore;
use crate::core::version::{ManifestCache, Mirror};

/// Everything the command surface works with. Each component handles its
/// own synchronization, so the state is shared as a plain `Arc`.
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: LauncherSettings,
    pub layout: GameLayout,
    pub registry: VersionRegistry,
    pub manifests: Arc<ManifestCache>,
    pub installer: Installer,
    pub progress: ProgressStore,
    pub supervisor: ProcessSupervisor,
}

impl AppState {
    /// Load settings from `data_dir` and wire the pipeline over HTTP.
    pub fn new(data_dir: PathBuf) -> LauncherResult<Self> {
        let settings = LauncherSettings::load_or_init(&data_dir)?;
        let client = build_http_client(settings.timeout_secs)
            .map_err(|e| LauncherError::Other(format!("Failed to build HTTP client: {}", e)))?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(client));
        Ok(Self::with_transport(data_dir, settings, transport))
    }

    pub fn with_transport(
        data_dir: PathBuf,
        settings: LauncherSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let mirror = Mirror::new(settings.use_mirror, &settings.mirror_domain);
        let layout = GameLayout::new(settings.minecraft_dir(&data_dir));
        let registry = VersionRegistry::new(layout.clone());

        let manifests = Arc::new(ManifestCache::new(
            Arc::clone(&transport),
            mirror,
            cache_dir(&data_dir),
            Duration::from_secs(settings.manifest_ttl_secs),
        ));
        let downloader = Downloader::new(transport)
            .with_concurrency(settings.download_threads)
            .with_retry(RetryPolicy {
                retries: settings.retry_count,
                backoff: settings.backoff_base(),
            });
        let installer = Installer::new(Arc::clone(&manifests), downloader, registry.clone())
            .with_java(settings.java_path.clone());
        let progress = ProgressStore::new(Duration::from_secs(settings.progress_retention_secs));

        info!(
            "Game directory: {:?} (mirror {})",
            layout.root(),
            if settings.use_mirror { "on" } else { "off" }
        );

        Self {
            data_dir,
            settings,
            layout,
            registry,
            manifests,
            installer,
            progress,
            supervisor: ProcessSupervisor::new(),
        }
    }
}

fn cache_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("cache")
}
