pub mod commands;
pub mod core;
pub mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::core::state::{default_data_dir, AppState};

/// Initialize structured logging. `RUST_LOG` takes precedence.
pub fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "debug"
    } else {
        "info,voxel_launcher_lib=debug"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

/// Load state from `data_dir` (or the platform default) and serve the
/// control surface on `host:port`.
pub async fn run(data_dir: Option<PathBuf>, host: &str, port: u16) -> anyhow::Result<()> {
    tracing::info!("VoxelLauncher backend starting...");

    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    let state = Arc::new(AppState::new(data_dir)?);
    tracing::info!("Data directory: {:?}", state.data_dir);

    let retention = Duration::from_secs(state.settings.progress_retention_secs);
    let _pruner = state
        .progress
        .spawn_pruner(retention.clamp(Duration::from_secs(1), Duration::from_secs(60)));
    let _process_pruner = state
        .supervisor
        .spawn_pruner(retention.clamp(Duration::from_secs(1), Duration::from_secs(60)), retention);

    server::serve(state, host, port).await
}
