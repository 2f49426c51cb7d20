use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::GcPolicy;

pub const APP_DIR_NAME: &str = "VoxelLauncher";
const SETTINGS_FILE: &str = "launcher_settings.json";

/// Persisted launcher configuration. Every field has a default so that a
/// partially written or older settings file still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Root of the game store (`versions/`, `libraries/`, `assets/`).
    pub minecraft_dir: Option<PathBuf>,
    /// Worker count for the libraries/assets stages.
    pub download_threads: usize,
    /// Extra attempts after the first failed download.
    pub retry_count: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_factor_secs: f64,
    pub timeout_secs: u64,
    /// How long the cached version index is trusted.
    pub manifest_ttl_secs: u64,
    pub use_mirror: bool,
    pub mirror_domain: String,
    /// Terminal install tasks older than this are dropped from the store.
    pub progress_retention_secs: u64,
    pub java_path: Option<PathBuf>,
    pub default_min_memory_mb: u32,
    pub default_max_memory_mb: u32,
    pub default_gc: GcPolicy,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            minecraft_dir: None,
            download_threads: 10,
            retry_count: 3,
            backoff_factor_secs: 0.5,
            timeout_secs: 30,
            manifest_ttl_secs: 300,
            use_mirror: false,
            mirror_domain: "bmclapi2.bangbang93.com".into(),
            progress_retention_secs: 3600,
            java_path: None,
            default_min_memory_mb: 2048,
            default_max_memory_mb: 4096,
            default_gc: GcPolicy::G1,
        }
    }
}

impl LauncherSettings {
    /// Load settings from `<data_dir>/launcher_settings.json`, writing the
    /// defaults back when the file does not exist yet.
    pub fn load_or_init(data_dir: &Path) -> LauncherResult<Self> {
        let path = data_dir.join(SETTINGS_FILE);

        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<LauncherSettings>(&raw) {
                Ok(settings) => Ok(settings.normalized()),
                Err(e) => {
                    warn!("Ignoring corrupt {:?}: {}", path, e);
                    Ok(Self::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let settings = Self::default();
                settings.save(data_dir)?;
                info!("Wrote default settings to {:?}", path);
                Ok(settings)
            }
            Err(e) => Err(LauncherError::io(path, e)),
        }
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        std::fs::create_dir_all(data_dir).map_err(|e| LauncherError::io(data_dir, e))?;
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| LauncherError::io(path, e))
    }

    /// The game store root, defaulting to `<data_dir>/.minecraft`.
    pub fn minecraft_dir(&self, data_dir: &Path) -> PathBuf {
        self.minecraft_dir
            .clone()
            .unwrap_or_else(|| data_dir.join(".minecraft"))
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_factor_secs.max(0.0))
    }

    fn normalized(mut self) -> Self {
        // A zero-sized pool would stall every batch.
        self.download_threads = self.download_threads.clamp(1, 64);
        if self.default_min_memory_mb > self.default_max_memory_mb {
            self.default_min_memory_mb = self.default_max_memory_mb;
        }
        self
    }
}

/// Default data directory under the platform data dir.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
