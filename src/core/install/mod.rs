// ─── Install Pipeline ───
// version_info -> client_jar -> libraries -> assets -> complete.
// Everything that can fail without touching the network for artifacts
// (metadata, loader manifest, merge, resolution) happens in `prepare`.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info};

use crate::core::assets::{fetch_index, materialize_legacy};
use crate::core::atomic::write_json_atomic;
use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{validate_version_name, InstalledVersion, VersionRegistry};
use crate::core::java::{find_java, required_java_for_minecraft_version};
use crate::core::loaders::processors::{self, InstallerBundle, ProcessorEnv};
use crate::core::loaders::{self, LoaderType};
use crate::core::progress::{CancelFlag, Stage, TaskReporter};
use crate::core::resolver::{resolve_metadata, ResolvedGraph};
use crate::core::version::{ManifestCache, Platform, VersionMetadata};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoaderSelection {
    pub loader_type: LoaderType,
    pub loader_version: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InstallRequest {
    /// Minecraft version id from the version index.
    pub version_id: String,
    #[serde(default)]
    pub loader: Option<LoaderSelection>,
    /// Directory name under `versions/`. Defaults to the version id, or to
    /// the loader's conventional id for loader installs.
    #[serde(default)]
    pub custom_name: Option<String>,
}

impl InstallRequest {
    pub fn vanilla(version_id: &str, custom_name: Option<String>) -> Self {
        Self {
            version_id: version_id.to_string(),
            loader: None,
            custom_name,
        }
    }

    pub fn with_loader(
        mc_version: &str,
        loader_type: LoaderType,
        loader_version: &str,
        custom_name: Option<String>,
    ) -> Self {
        Self {
            version_id: mc_version.to_string(),
            loader: Some(LoaderSelection {
                loader_type,
                loader_version: loader_version.to_string(),
            }),
            custom_name,
        }
    }

    pub fn install_name(&self) -> String {
        if let Some(name) = self.custom_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        match &self.loader {
            Some(sel) => sel
                .loader_type
                .default_version_name(&self.version_id, &sel.loader_version),
            None => self.version_id.clone(),
        }
    }
}

/// Everything needed to download one version, resolved up front.
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub name: String,
    /// Merged document as it will be written to `versions/<name>/<name>.json`.
    pub metadata: VersionMetadata,
    pub graph: ResolvedGraph,
    /// Forge and NeoForge installer whose files and processors complete
    /// the libraries.
    pub installer: Option<InstallerBundle>,
}

#[derive(Clone)]
pub struct Installer {
    cache: Arc<ManifestCache>,
    downloader: Downloader,
    registry: VersionRegistry,
    platform: Platform,
    /// Java for installer processors; discovered when unset.
    java_path: Option<PathBuf>,
}

impl Installer {
    pub fn new(cache: Arc<ManifestCache>, downloader: Downloader, registry: VersionRegistry) -> Self {
        Self {
            cache,
            downloader,
            registry,
            platform: Platform::current(),
            java_path: None,
        }
    }

    pub fn with_java(mut self, java_path: Option<PathBuf>) -> Self {
        self.java_path = java_path;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Run a full install, keeping the task in `reporter` up to date. Any
    /// failure leaves the task at `error` with the failure's message.
    pub async fn run(
        &self,
        request: &InstallRequest,
        mut reporter: TaskReporter,
    ) -> LauncherResult<InstalledVersion> {
        let result = self.run_stages(request, &mut reporter).await;
        if let Err(e) = &result {
            error!("Install task {} failed: {}", reporter.task_id(), e);
            reporter.fail(e.to_string());
        }
        result
    }

    async fn run_stages(
        &self,
        request: &InstallRequest,
        reporter: &mut TaskReporter,
    ) -> LauncherResult<InstalledVersion> {
        reporter.begin(
            Stage::VersionInfo,
            format!("Resolving {}", request.version_id),
        );
        let plan = self.prepare(request).await?;
        reporter.finish_stage(format!(
            "Resolved {} libraries and {} natives",
            plan.graph.libraries.len(),
            plan.graph.natives.len()
        ));

        self.acquire(&plan, reporter).await
    }

    /// Fetch metadata, merge the loader, and resolve the graph. No artifact
    /// is downloaded here, so a loader mismatch never leaves partial files.
    pub async fn prepare(&self, request: &InstallRequest) -> LauncherResult<InstallPlan> {
        let name = request.install_name();
        validate_version_name(&name)?;

        // 1. Base metadata
        let base = self.cache.metadata(&request.version_id).await?;

        // 2. Loader overlay
        let (mut metadata, installer) = match &request.loader {
            Some(sel) => {
                let manifest = loaders::fetch_loader_manifest(
                    &self.cache,
                    sel.loader_type,
                    &request.version_id,
                    &sel.loader_version,
                )
                .await?;
                let merged = loaders::merge(&base, &manifest)?;
                let bundle = processors::installer_bundle(
                    &self.cache,
                    sel.loader_type,
                    &request.version_id,
                    &sel.loader_version,
                )
                .await?;
                (merged, bundle)
            }
            None => (base, None),
        };
        metadata.id = name.clone();

        // 3. Name must be free, or hold this very install
        self.ensure_name_available(&name, &metadata).await?;

        // 4. Platform graph
        let graph = resolve_metadata(
            &metadata,
            &self.platform,
            &self.registry.layout().libraries_dir(),
        )?;
        if graph.client.is_none() {
            return Err(LauncherError::Resolution(format!(
                "{} has no client download",
                request.version_id
            )));
        }

        info!(
            "Planned {}: {} libraries, {} natives, asset index {}",
            name,
            graph.libraries.len(),
            graph.natives.len(),
            graph.asset_index.id
        );
        Ok(InstallPlan {
            name,
            metadata,
            graph,
            installer,
        })
    }

    async fn ensure_name_available(
        &self,
        name: &str,
        metadata: &VersionMetadata,
    ) -> LauncherResult<()> {
        match self.registry.check_name_conflict(name).await {
            Err(LauncherError::NameConflict(_)) => {}
            other => return other,
        }

        let path = self.registry.layout().version_json(name);
        let Ok(raw) = tokio::fs::read_to_string(&path).await else {
            // Directory without metadata: an earlier install of this name
            // never finished.
            debug!("Resuming unfinished install of {}", name);
            return Ok(());
        };

        let existing: serde_json::Value =
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null);
        if existing == serde_json::to_value(metadata)? {
            debug!("{} is already installed with the same metadata", name);
            Ok(())
        } else {
            Err(LauncherError::NameConflict(name.to_string()))
        }
    }

    /// Download every artifact of `plan`, then write its metadata last.
    pub async fn acquire(
        &self,
        plan: &InstallPlan,
        reporter: &mut TaskReporter,
    ) -> LauncherResult<InstalledVersion> {
        let layout = self.registry.layout();
        let mirror = self.cache.mirror();
        let cancel = reporter.cancel_flag().clone();

        if let Some(major) = plan.graph.java_major {
            info!("{} expects Java {}", plan.name, major);
        }

        // 1. Client jar
        check_cancelled(&cancel)?;
        reporter.begin(Stage::ClientJar, format!("Downloading {} client", plan.name));
        let client = plan.graph.client.as_ref().ok_or_else(|| {
            LauncherError::Resolution(format!("{} has no client download", plan.name))
        })?;
        self.downloader
            .fetch(&DownloadEntry {
                label: format!("{} client jar", plan.name),
                urls: mirror.sources(&client.url),
                dest: layout.version_jar(&plan.name),
                sha1: Some(client.sha1.clone()),
                size: Some(client.size),
            })
            .await?;
        reporter.finish_stage("Client jar ready");

        // 2. Libraries, native archives and installer output
        check_cancelled(&cancel)?;
        reporter.begin(Stage::Libraries, "Downloading libraries");
        let libraries_dir = layout.libraries_dir();
        let work_dir = layout.version_dir(&plan.name).join(".installer");
        let mut entries: Vec<DownloadEntry> = plan
            .graph
            .libraries
            .iter()
            .chain(plan.graph.natives.iter())
            .filter_map(|artifact| artifact.download_entry(mirror))
            .collect();
        let mut steps = 0;
        if let Some(bundle) = &plan.installer {
            let shipped = processors::extract_installer(bundle, &libraries_dir, &work_dir).await?;
            debug!("{} ships {} libraries", bundle.loader, shipped);
            entries.extend(bundle.library_entries(&libraries_dir, mirror)?);
            steps = bundle.client_processors().count();
        }
        let downloads = entries.len();
        let report = self
            .downloader
            .download_batch(entries, &cancel, |done, _| {
                reporter.advance(
                    done,
                    downloads + steps,
                    format!("Libraries {}/{}", done, downloads),
                )
            })
            .await?;

        if let Some(bundle) = plan.installer.as_ref().filter(|_| steps > 0) {
            let required = plan
                .graph
                .java_major
                .unwrap_or_else(|| required_java_for_minecraft_version(&bundle.minecraft_version));
            let java = find_java(self.java_path.as_deref(), required).await?;
            let version_jar = layout.version_jar(&plan.name);
            let env = ProcessorEnv {
                java: &java.path,
                root: layout.root(),
                libraries_dir: &libraries_dir,
                work_dir: &work_dir,
                minecraft_jar: &version_jar,
            };
            processors::run_processors(bundle, &env, &cancel, |done, _| {
                reporter.advance(
                    downloads + done,
                    downloads + steps,
                    format!("Installer step {}/{}", done, steps),
                )
            })
            .await?;
        }
        if plan.installer.is_some() {
            let _ = tokio::fs::remove_dir_all(&work_dir).await;
        }
        ensure_local_libraries(plan).await?;
        reporter.finish_stage(format!(
            "Libraries ready ({} downloaded, {} present)",
            report.downloaded, report.skipped
        ));

        // 3. Assets
        check_cancelled(&cancel)?;
        reporter.begin(Stage::Assets, format!("Fetching asset index {}", plan.graph.asset_index.id));
        let assets_dir = layout.assets_dir();
        let index = fetch_index(&plan.graph.asset_index, &assets_dir, &self.downloader, mirror).await?;
        let entries = index.download_entries(&assets_dir, mirror);
        let report = self
            .downloader
            .download_batch(entries, &cancel, |done, total| {
                reporter.advance(done, total, format!("Assets {}/{}", done, total))
            })
            .await?;
        if let Some(target) = index.legacy_target(
            &plan.graph.asset_index.id,
            &assets_dir,
            &layout.game_dir(&plan.name),
        ) {
            let copied = materialize_legacy(&index, &assets_dir, target).await?;
            debug!("Materialized {} legacy assets for {}", copied, plan.name);
        }
        reporter.finish_stage(format!(
            "Assets ready ({} downloaded, {} present)",
            report.downloaded, report.skipped
        ));

        // 4. Metadata last: its presence marks the install complete.
        check_cancelled(&cancel)?;
        write_json_atomic(&layout.version_json(&plan.name), &plan.metadata).await?;

        let installed = self.registry.inspect(&plan.name).await;
        info!("Installed {}", plan.name);
        reporter.complete(format!("Installed {}", plan.name));
        Ok(installed)
    }
}

/// Artifacts without a URL must have been shipped or built by the installer.
async fn ensure_local_libraries(plan: &InstallPlan) -> LauncherResult<()> {
    for artifact in plan.graph.libraries.iter().filter(|a| a.url.is_none()) {
        if !tokio::fs::try_exists(&artifact.path).await.unwrap_or(false) {
            return Err(LauncherError::Resolution(format!(
                "{} is not hosted anywhere and the installer did not produce it",
                artifact.name
            )));
        }
    }
    Ok(())
}

fn check_cancelled(cancel: &CancelFlag) -> LauncherResult<()> {
    if cancel.is_cancelled() {
        return Err(LauncherError::Cancelled(cancel.task_id().to_string()));
    }
    Ok(())
}
