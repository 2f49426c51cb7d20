// ─── Installer Processors ───
// Forge and NeoForge installers carry an install profile next to their
// version.json: libraries bundled under `maven/`, data files under `data/`,
// and Java processors that build the patched client jars locally.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::LoaderType;
use crate::core::downloader::{sha1_file, DownloadEntry};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::classpath::classpath_separator;
use crate::core::maven::MavenArtifact;
use crate::core::progress::CancelFlag;
use crate::core::resolver::classpath_artifact;
use crate::core::version::manifest::read_archive_entry;
use crate::core::version::{LibraryEntry, ManifestCache, Mirror};

const INSTALL_PROFILE: &str = "install_profile.json";
const PROCESSOR_TIMEOUT: Duration = Duration::from_secs(300);

/// The parts of `install_profile.json` a client install needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallProfile {
    /// Processor jars and their classpath.
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default)]
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub data: HashMap<String, SidedValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SidedValue {
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Processor {
    #[serde(default)]
    pub sides: Option<Vec<String>>,
    /// Maven coordinate of the jar to run.
    pub jar: String,
    #[serde(default)]
    pub classpath: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Produced file -> expected sha1, both in argument syntax.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
}

impl Processor {
    /// Processors without `sides` run for every side.
    pub fn runs_on_client(&self) -> bool {
        self.sides
            .as_ref()
            .map_or(true, |sides| sides.iter().any(|s| s == "client"))
    }
}

/// A cached installer jar together with the profile read from it.
#[derive(Debug, Clone)]
pub struct InstallerBundle {
    pub loader: String,
    pub minecraft_version: String,
    pub archive: PathBuf,
    pub profile: InstallProfile,
}

impl InstallerBundle {
    pub fn client_processors(&self) -> impl Iterator<Item = &Processor> {
        self.profile.processors.iter().filter(|p| p.runs_on_client())
    }

    /// Downloads for the profile's own libraries. Entries the installer
    /// ships have no URL and are put in place by [`extract_installer`].
    pub fn library_entries(
        &self,
        libraries_dir: &Path,
        mirror: &Mirror,
    ) -> LauncherResult<Vec<DownloadEntry>> {
        let mut entries = Vec::new();
        for lib in &self.profile.libraries {
            if let Some(artifact) = classpath_artifact(lib, libraries_dir)? {
                entries.extend(artifact.download_entry(mirror));
            }
        }
        Ok(entries)
    }
}

/// The installer jar and install profile for Forge and NeoForge builds.
/// Other loaders have no installer.
pub async fn installer_bundle(
    cache: &ManifestCache,
    loader_type: LoaderType,
    mc_version: &str,
    loader_version: &str,
) -> LauncherResult<Option<InstallerBundle>> {
    if !matches!(loader_type, LoaderType::Forge | LoaderType::NeoForge) {
        return Ok(None);
    }

    let source = loader_type.document_source(mc_version, loader_version);
    let archive = cache.loader_archive(&source.key, &source.urls).await?;
    let raw = read_archive_entry(&source.key, &archive, INSTALL_PROFILE).await?;
    let profile: InstallProfile =
        serde_json::from_str(&raw).map_err(|e| LauncherError::ManifestFetch {
            what: format!("{} {} install profile", loader_type, loader_version),
            reason: e.to_string(),
        })?;

    info!(
        "{} {} installer: {} libraries, {} processors",
        loader_type,
        loader_version,
        profile.libraries.len(),
        profile.processors.len()
    );
    Ok(Some(InstallerBundle {
        loader: format!("{} {}", loader_type, loader_version),
        minecraft_version: mc_version.to_string(),
        archive,
        profile,
    }))
}

/// Unpack `maven/` into the libraries directory and `data/` into
/// `work_dir`. Returns how many library files the installer ships.
pub async fn extract_installer(
    bundle: &InstallerBundle,
    libraries_dir: &Path,
    work_dir: &Path,
) -> LauncherResult<usize> {
    let archive = bundle.archive.clone();
    let libraries_dir = libraries_dir.to_path_buf();
    let work_dir = work_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &libraries_dir, &work_dir))
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?
}

fn extract_blocking(archive_path: &Path, libraries_dir: &Path, work_dir: &Path) -> LauncherResult<usize> {
    let file = std::fs::File::open(archive_path).map_err(|e| LauncherError::io(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut shipped = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping installer entry outside the archive root: {}", entry.name());
            continue;
        };
        let target = if let Ok(relative) = name.strip_prefix("maven") {
            shipped += 1;
            libraries_dir.join(relative)
        } else if name.starts_with("data") {
            work_dir.join(&name)
        } else {
            continue;
        };

        let unchanged = std::fs::metadata(&target)
            .map(|m| m.is_file() && m.len() == entry.size())
            .unwrap_or(false);
        if unchanged {
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let mut out = std::fs::File::create(&target).map_err(|e| LauncherError::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&target, e))?;
        debug!("Extracted {:?}", target);
    }

    Ok(shipped)
}

/// Paths and the Java binary processors run with.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorEnv<'a> {
    pub java: &'a Path,
    pub root: &'a Path,
    pub libraries_dir: &'a Path,
    /// Where `data/` was extracted.
    pub work_dir: &'a Path,
    /// The vanilla client jar the processors patch.
    pub minecraft_jar: &'a Path,
}

/// Run every client processor in order. A processor whose declared outputs
/// already verify is skipped. Returns how many processors actually ran.
pub async fn run_processors<F>(
    bundle: &InstallerBundle,
    env: &ProcessorEnv<'_>,
    cancel: &CancelFlag,
    mut on_progress: F,
) -> LauncherResult<usize>
where
    F: FnMut(usize, usize),
{
    let vars = variables(bundle, env)?;
    let processors: Vec<&Processor> = bundle.client_processors().collect();
    let total = processors.len();
    let mut ran = 0;

    for (i, processor) in processors.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(LauncherError::Cancelled(cancel.task_id().to_string()));
        }

        let up_to_date = !processor.outputs.is_empty()
            && first_bad_output(processor, &vars, env.libraries_dir)
                .await?
                .is_none();
        if up_to_date {
            debug!("Outputs of {} already present", processor.jar);
        } else {
            run_one(processor, &vars, env).await?;
            if let Some(reason) = first_bad_output(processor, &vars, env.libraries_dir).await? {
                return Err(LauncherError::Processor {
                    processor: processor.jar.clone(),
                    reason,
                });
            }
            ran += 1;
        }
        on_progress(i + 1, total);
    }

    info!("{}: {} of {} processors ran", bundle.loader, ran, total);
    Ok(ran)
}

async fn run_one(
    processor: &Processor,
    vars: &HashMap<String, String>,
    env: &ProcessorEnv<'_>,
) -> LauncherResult<()> {
    let failed = |reason: String| LauncherError::Processor {
        processor: processor.jar.clone(),
        reason,
    };

    let jar = library_path(&processor.jar, env.libraries_dir)?;
    let mut classpath = vec![jar.clone()];
    for coordinate in &processor.classpath {
        classpath.push(library_path(coordinate, env.libraries_dir)?);
    }
    for path in &classpath {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(failed(format!("{} is missing", path.display())));
        }
    }

    let main_class = read_main_class(&jar).await?;
    let args = processor
        .args
        .iter()
        .map(|arg| resolve_argument(processor, arg, vars, env.libraries_dir))
        .collect::<LauncherResult<Vec<_>>>()?;
    let classpath = classpath
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(classpath_separator());

    info!("Running processor {} ({})", processor.jar, main_class);
    debug!("Processor args: {:?}", args);

    let mut cmd = tokio::process::Command::new(env.java);
    cmd.arg("-cp")
        .arg(&classpath)
        .arg(&main_class)
        .args(&args)
        .current_dir(env.root)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(PROCESSOR_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(LauncherError::Launch {
                program: env.java.to_path_buf(),
                source,
            })
        }
        Err(_) => {
            return Err(failed(format!(
                "no result after {}s",
                PROCESSOR_TIMEOUT.as_secs()
            )))
        }
    };

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!("[processor] {}", line);
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        tail.reverse();
        return Err(failed(format!(
            "exited with {:?}: {}",
            output.status.code(),
            tail.join(" | ")
        )));
    }
    Ok(())
}

/// The first declared output that is missing or has the wrong sha1.
async fn first_bad_output(
    processor: &Processor,
    vars: &HashMap<String, String>,
    libraries_dir: &Path,
) -> LauncherResult<Option<String>> {
    for (file, sha1) in &processor.outputs {
        let path = PathBuf::from(resolve_argument(processor, file, vars, libraries_dir)?);
        let expected = resolve_argument(processor, sha1, vars, libraries_dir)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Some(format!("{} was not produced", path.display())));
        }
        let actual = sha1_file(&path).await?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return Ok(Some(format!(
                "{} has sha1 {}, expected {}",
                path.display(),
                actual,
                expected
            )));
        }
    }
    Ok(None)
}

fn variables(bundle: &InstallerBundle, env: &ProcessorEnv<'_>) -> LauncherResult<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for (key, value) in &bundle.profile.data {
        if let Some(client) = value.client.as_deref() {
            vars.insert(
                key.clone(),
                resolve_data_value(client, env.libraries_dir, env.work_dir)?,
            );
        }
    }

    let fixed = [
        ("SIDE", "client".to_string()),
        ("MINECRAFT_JAR", path_string(env.minecraft_jar)),
        ("MINECRAFT_VERSION", bundle.minecraft_version.clone()),
        ("ROOT", path_string(env.root)),
        ("INSTALLER", path_string(&bundle.archive)),
        ("LIBRARY_DIR", path_string(env.libraries_dir)),
    ];
    for (key, value) in fixed {
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

/// `[coord]` is a library path, `/path` a file extracted from the
/// installer, `'text'` a literal.
fn resolve_data_value(value: &str, libraries_dir: &Path, work_dir: &Path) -> LauncherResult<String> {
    if let Some(coordinate) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        return Ok(path_string(&library_path(coordinate, libraries_dir)?));
    }
    if let Some(literal) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        return Ok(literal.to_string());
    }
    if let Some(relative) = value.strip_prefix('/') {
        return Ok(path_string(&work_dir.join(relative)));
    }
    Ok(value.to_string())
}

fn resolve_argument(
    processor: &Processor,
    arg: &str,
    vars: &HashMap<String, String>,
    libraries_dir: &Path,
) -> LauncherResult<String> {
    if let Some(coordinate) = arg.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        return Ok(path_string(&library_path(coordinate, libraries_dir)?));
    }
    if let Some(key) = arg.strip_prefix('{').and_then(|a| a.strip_suffix('}')) {
        return vars.get(key).cloned().ok_or_else(|| LauncherError::Processor {
            processor: processor.jar.clone(),
            reason: format!("unknown variable {}", arg),
        });
    }
    let mut out = arg.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    Ok(out)
}

fn library_path(coordinate: &str, libraries_dir: &Path) -> LauncherResult<PathBuf> {
    Ok(libraries_dir.join(MavenArtifact::parse(coordinate)?.local_path()))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

async fn read_main_class(jar: &Path) -> LauncherResult<String> {
    let path = jar.to_path_buf();
    tokio::task::spawn_blocking(move || read_main_class_blocking(&path))
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))?
}

fn read_main_class_blocking(jar: &Path) -> LauncherResult<String> {
    let file = std::fs::File::open(jar).map_err(|e| LauncherError::io(jar, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut text = String::new();
    archive
        .by_name("META-INF/MANIFEST.MF")?
        .read_to_string(&mut text)
        .map_err(|e| LauncherError::io(jar, e))?;

    main_class_from_manifest(&text).ok_or_else(|| LauncherError::Processor {
        processor: jar.display().to_string(),
        reason: "Main-Class missing from the jar manifest".into(),
    })
}

/// Manifest values wrap at 72 bytes; continuation lines start with a space.
fn main_class_from_manifest(text: &str) -> Option<String> {
    let mut main_class: Option<String> = None;
    let mut in_main_class = false;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix(' ') {
            if in_main_class {
                if let Some(value) = main_class.as_mut() {
                    value.push_str(rest);
                }
            }
            continue;
        }
        in_main_class = false;
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "Main-Class" {
                in_main_class = true;
                main_class = Some(value.trim().to_string());
            }
        }
    }
    main_class.filter(|m| !m.is_empty())
}
