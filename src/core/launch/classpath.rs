// ─── Classpath Builder ───
// Constructs the classpath string and the natives directory for a launch.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::atomic::write_atomic;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::resolver::{ResolvedArtifact, ResolvedGraph};

const FINGERPRINT_FILE: &str = ".natives-fingerprint";
const NATIVE_EXTENSIONS: &[&str] = &[".dll", ".so", ".dylib", ".jnilib"];

/// Platform-specific Java classpath separator.
pub fn classpath_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}

/// Graph libraries in order, then the client jar.
pub fn build_classpath(graph: &ResolvedGraph, client_jar: &Path) -> LauncherResult<String> {
    let entries: Vec<String> = graph
        .libraries
        .iter()
        .map(|lib| safe_path_str(&lib.path))
        .chain(std::iter::once(safe_path_str(client_jar)))
        .collect();

    if entries.iter().any(|e| e.trim().is_empty()) {
        return Err(LauncherError::Resolution(format!(
            "{} produced an empty classpath entry",
            graph.version_id
        )));
    }

    debug!("Classpath has {} entries", entries.len());
    Ok(entries.join(classpath_separator()))
}

/// Every file the classpath and natives refer to must already be on disk.
pub async fn ensure_artifacts_present(
    graph: &ResolvedGraph,
    client_jar: &Path,
) -> LauncherResult<()> {
    let required = graph
        .libraries
        .iter()
        .chain(graph.natives.iter())
        .map(|a| (a.name.as_str(), a.path.as_path()))
        .chain(std::iter::once(("client jar", client_jar)));

    for (name, path) in required {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(LauncherError::VersionIncomplete(format!(
                "{} is missing {} ({})",
                graph.version_id,
                name,
                path.display()
            )));
        }
    }
    Ok(())
}

fn fingerprint(natives: &[ResolvedArtifact]) -> String {
    let mut lines: Vec<String> = natives
        .iter()
        .map(|n| {
            format!(
                "{} {}",
                n.name,
                n.sha1.as_deref().unwrap_or("-")
            )
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

/// Extract `.dll`/`.so`/`.dylib` files from the native jars into
/// `natives_dir`. Skipped when the directory already holds the output of the
/// same native set. Returns whether anything was extracted.
pub async fn extract_natives(natives: &[ResolvedArtifact], natives_dir: &Path) -> LauncherResult<bool> {
    let marker = natives_dir.join(FINGERPRINT_FILE);
    let expected = fingerprint(natives);

    if let Ok(existing) = tokio::fs::read_to_string(&marker).await {
        if existing == expected {
            debug!("Natives in {:?} are current", natives_dir);
            return Ok(false);
        }
    }

    if tokio::fs::try_exists(natives_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(natives_dir)
            .await
            .map_err(|e| LauncherError::io(natives_dir, e))?;
    }
    tokio::fs::create_dir_all(natives_dir)
        .await
        .map_err(|e| LauncherError::io(natives_dir, e))?;

    for native in natives {
        let jar_path = native.path.clone();
        let dest_dir = natives_dir.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || extract_jar(&jar_path, &dest_dir))
            .await
            .map_err(|e| LauncherError::Other(format!("Task join error: {}", e)))??;
        debug!("Extracted {} files from {}", extracted, native.name);
    }

    // Marker goes last: an interrupted extraction is redone next launch.
    write_atomic(&marker, expected.as_bytes()).await?;
    info!("Extracted {} native archives into {:?}", natives.len(), natives_dir);
    Ok(true)
}

fn extract_jar(jar_path: &Path, dest_dir: &Path) -> LauncherResult<usize> {
    let file = std::fs::File::open(jar_path).map_err(|e| LauncherError::io(jar_path, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || entry.name().starts_with("META-INF") {
            continue;
        }
        let Some(file_name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(PathBuf::from))
        else {
            warn!("Skipping unsafe entry {} in {:?}", entry.name(), jar_path);
            continue;
        };

        let name = file_name.to_string_lossy();
        if !NATIVE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            continue;
        }

        let dest = dest_dir.join(&file_name);
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        std::fs::write(&dest, bytes).map_err(|e| LauncherError::io(&dest, e))?;
        extracted += 1;
    }

    Ok(extracted)
}

/// Convert path to string, stripping the `\\?\` prefix Java cannot handle.
pub fn safe_path_str(path: &Path) -> String {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let text = resolved.to_string_lossy().to_string();

    #[cfg(target_os = "windows")]
    {
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::core::version::version_file::AssetIndexInfo;

    fn graph(libraries: Vec<ResolvedArtifact>, natives: Vec<ResolvedArtifact>) -> ResolvedGraph {
        ResolvedGraph {
            version_id: "1.12.2".into(),
            version_type: Some("release".into()),
            main_class: "net.minecraft.client.main.Main".into(),
            asset_index: AssetIndexInfo {
                id: "1.12".into(),
                url: "https://x/1.12.json".into(),
                sha1: None,
                size: None,
                total_size: None,
            },
            client: None,
            libraries,
            natives,
            game_arguments: vec![],
            jvm_arguments: vec![],
            java_major: Some(8),
        }
    }

    fn artifact(name: &str, path: PathBuf, sha1: Option<&str>) -> ResolvedArtifact {
        ResolvedArtifact {
            name: name.into(),
            url: None,
            path,
            sha1: sha1.map(str::to_owned),
            size: None,
        }
    }

    fn temp(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("voxel-cp-{}-{}", label, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn native_jar(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("liblwjgl.so", options).unwrap();
        zip.write_all(b"elf").unwrap();
        zip.start_file("META-INF/MANIFEST.MF", options).unwrap();
        zip.write_all(b"Manifest-Version: 1.0").unwrap();
        zip.start_file("README.txt", options).unwrap();
        zip.write_all(b"readme").unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn classpath_keeps_graph_order_and_ends_with_client() {
        let g = graph(
            vec![
                artifact("b:b:1", PathBuf::from("/libs/b.jar"), None),
                artifact("a:a:1", PathBuf::from("/libs/a.jar"), None),
            ],
            vec![],
        );
        let cp = build_classpath(&g, Path::new("/versions/x/x.jar")).unwrap();
        let parts: Vec<_> = cp.split(classpath_separator()).collect();
        assert_eq!(parts, vec!["/libs/b.jar", "/libs/a.jar", "/versions/x/x.jar"]);
    }

    #[tokio::test]
    async fn natives_are_extracted_once_per_fingerprint() {
        let dir = temp("natives");
        let jar = dir.join("lwjgl-platform-natives-linux.jar");
        native_jar(&jar);
        let natives = vec![artifact("org.lwjgl:lwjgl-platform:2.9.4:natives-linux", jar, Some("n1"))];
        let out = dir.join("natives");

        assert!(extract_natives(&natives, &out).await.unwrap());
        assert!(out.join("liblwjgl.so").exists());
        assert!(!out.join("README.txt").exists());
        assert!(!out.join("META-INF").exists());

        assert!(!extract_natives(&natives, &out).await.unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_library_marks_version_incomplete() {
        let dir = temp("missing");
        let client = dir.join("client.jar");
        std::fs::write(&client, b"PK").unwrap();
        let g = graph(vec![artifact("a:a:1", dir.join("absent.jar"), None)], vec![]);

        let err = ensure_artifacts_present(&g, &client).await.unwrap_err();
        assert!(matches!(err, LauncherError::VersionIncomplete(msg) if msg.contains("a:a:1")));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
