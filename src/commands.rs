//! Invocation surface: one async function per operation, over the shared
//! [`AppState`]. The HTTP layer in `server.rs` is a thin wrapper around these.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::auth::Identity;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::InstallRequest;
use crate::core::instance::{validate_version_name, InstalledVersion};
use crate::core::java::{find_java, required_java_for_minecraft_version};
use crate::core::launch::{
    self, ensure_artifacts_present, extract_natives, parse_extra_args, prepare_working_dir,
    validate_extra_args, GcPolicy, LaunchContext, LaunchedProcess, MemorySettings, ProcessInfo,
    ProcessStatus,
};
use crate::core::loaders::{self, LoaderType, LoaderVersion};
use crate::core::progress::InstallTask;
use crate::core::resolver::resolve_metadata;
use crate::core::state::AppState;
use crate::core::version::{Platform, VersionEntry, VersionType};

#[derive(Debug, Clone, Serialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Extra JVM flags as a single whitespace-separated string or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExtraJvmArgs {
    Line(String),
    Tokens(Vec<String>),
}

impl ExtraJvmArgs {
    fn into_tokens(self) -> LauncherResult<Vec<String>> {
        match self {
            ExtraJvmArgs::Line(raw) => parse_extra_args(&raw),
            ExtraJvmArgs::Tokens(tokens) => {
                validate_extra_args(&tokens)?;
                Ok(tokens)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchRequest {
    pub version_id: String,
    pub identity: Identity,
    #[serde(default)]
    pub memory: Option<MemorySettings>,
    #[serde(default)]
    pub gc_policy: Option<GcPolicy>,
    #[serde(default)]
    pub extra_jvm_args: Option<ExtraJvmArgs>,
    /// Overrides the configured Java for this launch only.
    #[serde(default)]
    pub java_path: Option<PathBuf>,
}

// ── Listings ────────────────────────────────────────────

pub async fn list_versions(
    state: &AppState,
    version_type: Option<VersionType>,
    refresh: bool,
) -> LauncherResult<Vec<VersionEntry>> {
    let manifest = state.manifests.index(refresh).await?;
    Ok(manifest.list(version_type).into_iter().cloned().collect())
}

pub async fn loader_versions(
    state: &AppState,
    loader_type: LoaderType,
    mc_version: &str,
) -> LauncherResult<Vec<LoaderVersion>> {
    loaders::list_versions(&state.manifests, loader_type, mc_version).await
}

pub async fn list_installed(state: &AppState) -> LauncherResult<Vec<InstalledVersion>> {
    state.registry.list().await
}

// ── Install ─────────────────────────────────────────────

pub fn install(
    state: &AppState,
    version_id: &str,
    custom_name: Option<String>,
    task_id: Option<String>,
) -> LauncherResult<TaskHandle> {
    spawn_install(state, InstallRequest::vanilla(version_id, custom_name), task_id)
}

pub fn install_with_loader(
    state: &AppState,
    mc_version: &str,
    loader_type: LoaderType,
    loader_version: &str,
    custom_name: Option<String>,
    task_id: Option<String>,
) -> LauncherResult<TaskHandle> {
    spawn_install(
        state,
        InstallRequest::with_loader(mc_version, loader_type, loader_version, custom_name),
        task_id,
    )
}

/// Register the task and run the install in the background. Reusing an id
/// that is still running replaces its progress entry.
fn spawn_install(
    state: &AppState,
    request: InstallRequest,
    task_id: Option<String>,
) -> LauncherResult<TaskHandle> {
    validate_version_name(&request.version_id)?;
    validate_version_name(&request.install_name())?;

    let task_id = task_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let reporter = state.progress.create(&task_id);
    let installer = state.installer.clone();

    info!(
        "Install task {} started for {}",
        task_id,
        request.install_name()
    );
    tokio::spawn(async move {
        // Failures are recorded on the task by the installer.
        let _ = installer.run(&request, reporter).await;
    });

    Ok(TaskHandle { task_id })
}

pub fn progress(state: &AppState, task_id: &str) -> LauncherResult<InstallTask> {
    state
        .progress
        .get(task_id)
        .ok_or_else(|| LauncherError::TaskNotFound(task_id.to_string()))
}

pub fn cancel(state: &AppState, task_id: &str) -> LauncherResult<InstallTask> {
    if !state.progress.cancel(task_id) {
        return Err(LauncherError::TaskNotFound(task_id.to_string()));
    }
    progress(state, task_id)
}

// ── Launch ──────────────────────────────────────────────

pub async fn launch(state: &AppState, request: LaunchRequest) -> LauncherResult<LaunchedProcess> {
    let version_id = request.version_id.as_str();
    validate_version_name(version_id)?;

    // 1. Only complete installs launch
    state.registry.require_complete(version_id).await?;
    let metadata = state.registry.load_metadata(version_id).await?;

    // 2. Same graph the installer downloaded
    let graph = resolve_metadata(
        &metadata,
        &Platform::current(),
        &state.layout.libraries_dir(),
    )?;
    ensure_artifacts_present(&graph, &state.layout.version_jar(version_id)).await?;
    extract_natives(&graph.natives, &state.layout.natives_dir(version_id)).await?;

    // 3. Java
    let configured = request.java_path.as_deref().or(state.settings.java_path.as_deref());
    let expected_java = graph
        .java_major
        .unwrap_or_else(|| required_java_for_minecraft_version(version_id));
    let java = find_java(configured, expected_java).await?;
    info!(
        "{} expects Java {}; using {} from {:?}",
        version_id, expected_java, java.version, java.path
    );

    // 4. Command line
    let extra_jvm_args = match request.extra_jvm_args {
        Some(extra) => extra.into_tokens()?,
        None => Vec::new(),
    };
    let ctx = LaunchContext {
        version_id: version_id.to_string(),
        identity: request.identity,
        memory: request.memory.unwrap_or(MemorySettings {
            min_mb: state.settings.default_min_memory_mb,
            max_mb: state.settings.default_max_memory_mb,
        }),
        gc: request.gc_policy.unwrap_or(state.settings.default_gc),
        extra_jvm_args,
        java: java.path,
    };
    let command = launch::build(&graph, &ctx, &state.layout)?;
    prepare_working_dir(&state.layout, version_id).await?;

    // 5. Spawn
    let launched = state.supervisor.launch(&command, version_id)?;
    if matches!(ctx.identity, Identity::Offline { .. }) {
        warn!("{} launched in offline mode as {}", version_id, ctx.identity.username());
    }
    Ok(launched)
}

pub fn process_status(state: &AppState, pid: u32) -> ProcessStatus {
    state.supervisor.status(pid)
}

pub fn running_processes(state: &AppState) -> Vec<ProcessInfo> {
    state.supervisor.running()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::downloader::transport::memory::MemoryTransport;
    use crate::core::progress::Stage;
    use crate::core::state::LauncherSettings;

    fn state(label: &str) -> (AppState, PathBuf) {
        let dir = std::env::temp_dir().join(format!("voxel-cmd-{}-{}", label, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let state = AppState::with_transport(
            dir.clone(),
            LauncherSettings::default(),
            Arc::new(MemoryTransport::new()),
        );
        (state, dir)
    }

    fn offline_request(version_id: &str) -> LaunchRequest {
        serde_json::from_value(serde_json::json!({
            "version_id": version_id,
            "identity": {"mode": "offline", "username": "Steve"},
            "extra_jvm_args": "-Xss2M"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn launch_rejects_missing_and_partial_installs() {
        let (state, dir) = state("launch");

        let err = launch(&state, offline_request("1.21.1")).await.unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound(_)));

        let jar = state.layout.version_jar("1.21.1");
        std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
        std::fs::write(&jar, b"PK").unwrap();
        let err = launch(&state, offline_request("1.21.1")).await.unwrap_err();
        assert!(matches!(err, LauncherError::VersionIncomplete(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_install_is_visible_through_progress() {
        let (state, dir) = state("progress");

        let handle = install(&state, "1.21.1", None, Some("job".into())).unwrap();
        assert_eq!(handle.task_id, "job");

        let mut task = progress(&state, "job").unwrap();
        for _ in 0..100 {
            if task.stage.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            task = progress(&state, "job").unwrap();
        }
        // Nothing is served, so the version index cannot be fetched.
        assert_eq!(task.stage, Stage::Error);
        assert!(matches!(progress(&state, "nope"), Err(LauncherError::TaskNotFound(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn launch_rejects_ids_that_leave_the_versions_dir() {
        let (state, dir) = state("traversal");
        for id in ["../escape", "..", "nested/id"] {
            let err = launch(&state, offline_request(id)).await.unwrap_err();
            assert!(matches!(err, LauncherError::InvalidArgument(_)));
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_version_id_is_rejected_before_spawning() {
        let (state, dir) = state("bad-id");
        let err = install(&state, "../1.21.1", None, Some("job".into())).unwrap_err();
        assert!(matches!(err, LauncherError::InvalidArgument(_)));
        assert!(state.progress.get("job").is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_custom_name_is_rejected_before_spawning() {
        let (state, dir) = state("name");
        let err = install(&state, "1.21.1", Some("../escape".into()), None).unwrap_err();
        assert!(matches!(err, LauncherError::InvalidArgument(_)));
        assert!(state.progress.get("../escape").is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn extra_args_accept_line_or_list() {
        let line: ExtraJvmArgs = serde_json::from_str("\"-Xss2M -Dfoo=bar\"").unwrap();
        assert_eq!(line.into_tokens().unwrap(), vec!["-Xss2M", "-Dfoo=bar"]);
        let list: ExtraJvmArgs = serde_json::from_str("[\"-Da=1;rm\"]").unwrap();
        assert!(list.into_tokens().is_err());
    }
}
