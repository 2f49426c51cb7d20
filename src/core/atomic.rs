//! Crash-safe file writes: temp file in the same directory, then rename.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;

use crate::core::error::{LauncherError, LauncherResult};

/// Write `bytes` to `path` so that readers only ever observe the old content
/// or the complete new content.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }

    let temp = temp_sibling(path);
    {
        let mut file = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| LauncherError::io(&temp, e))?;
        file.write_all(bytes)
            .await
            .map_err(|e| LauncherError::io(&temp, e))?;
        file.sync_all()
            .await
            .map_err(|e| LauncherError::io(&temp, e))?;
    }

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(LauncherError::io(path, e));
    }
    Ok(())
}

pub async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> LauncherResult<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json).await
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_sibling(path: &Path) -> PathBuf {
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}-{}.tmp", std::process::id(), seq));
    PathBuf::from(name)
}
