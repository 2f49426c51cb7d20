// ─── Java Selection ───
// Picks the Java binary for a launch or an installer processor run.
// Runtimes are not downloaded here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JavaSource {
    /// Explicit path from the request or the launcher settings.
    Configured,
    JavaHome,
    /// Bare `java`, resolved by the OS through `PATH`.
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JavaInstallation {
    pub path: PathBuf,
    /// Quoted version from `java -version`, e.g. `17.0.9` or `1.8.0_392`.
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
    pub source: JavaSource,
}

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// `bin/java` under a JDK/JRE root, including the macOS bundle layout.
fn locate_java_binary(runtime_root: &Path) -> Option<PathBuf> {
    [
        runtime_root.join("bin").join(java_exe()),
        runtime_root
            .join("Contents")
            .join("Home")
            .join("bin")
            .join(java_exe()),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

/// Binaries worth asking, in order: configured path, `JAVA_HOME`, `PATH`.
/// A configured path that does not exist is skipped with a warning.
fn java_candidates(configured: Option<&Path>, java_home: Option<&Path>) -> Vec<(PathBuf, JavaSource)> {
    let mut candidates = Vec::new();

    if let Some(path) = configured {
        if path.is_file() {
            candidates.push((path.to_path_buf(), JavaSource::Configured));
        } else if let Some(found) = locate_java_binary(path) {
            candidates.push((found, JavaSource::Configured));
        } else {
            warn!("Configured Java {:?} not found, falling back", path);
        }
    }

    if let Some(found) = java_home.and_then(locate_java_binary) {
        candidates.push((found, JavaSource::JavaHome));
    }

    candidates.push((PathBuf::from(java_exe()), JavaSource::Path));
    candidates.dedup_by(|a, b| a.0 == b.0);
    candidates
}

/// Find a Java whose major can run code built for `required_major`.
pub async fn find_java(
    configured: Option<&Path>,
    required_major: u32,
) -> LauncherResult<JavaInstallation> {
    let java_home = std::env::var_os("JAVA_HOME").map(PathBuf::from);
    find_java_among(java_candidates(configured, java_home.as_deref()), required_major).await
}

async fn find_java_among(
    candidates: Vec<(PathBuf, JavaSource)>,
    required_major: u32,
) -> LauncherResult<JavaInstallation> {
    let mut checked = Vec::new();
    for (path, source) in candidates {
        let Some(java) = inspect_java_binary(&path, source).await else {
            checked.push(format!("{} (not runnable)", path.display()));
            continue;
        };
        if is_java_compatible_major(java.major, required_major) {
            info!(
                "Using Java {} at {:?} ({:?}) for Java {}",
                java.version, java.path, source, required_major
            );
            return Ok(java);
        }
        warn!(
            "Java {} at {:?} cannot run Java {} code",
            java.version, java.path, required_major
        );
        checked.push(format!("{} (Java {})", path.display(), java.major));
    }
    Err(LauncherError::JavaUnavailable {
        required: required_major,
        checked,
    })
}

/// Run `java -version` and read what it reports. `None` when the binary
/// does not start, hangs, or prints no version.
#[instrument(level = "debug")]
pub async fn inspect_java_binary(path: &Path, source: JavaSource) -> Option<JavaInstallation> {
    let mut cmd = tokio::process::Command::new(path);
    cmd.args(["-XshowSettings:properties", "-version"])
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);
    let output = match tokio::time::timeout(VERSION_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!("{:?} did not start: {}", path, e);
            return None;
        }
        Err(_) => {
            warn!("{:?} -version timed out", path);
            return None;
        }
    };

    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    parse_version_output(path, source, &text)
}

fn parse_version_output(path: &Path, source: JavaSource, output: &str) -> Option<JavaInstallation> {
    debug!("{:?}: {}", path, output.lines().next().unwrap_or(""));
    let version = parse_version_string(output)?;
    let major = parse_major_version(&version);
    if major == 0 {
        return None;
    }
    let lower = output.to_ascii_lowercase();
    let is_64bit = lower.contains("sun.arch.data.model = 64")
        || lower.contains("64-bit")
        || lower.contains("os.arch = amd64")
        || lower.contains("os.arch = x86_64")
        || lower.contains("os.arch = aarch64");

    Some(JavaInstallation {
        path: std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()),
        version,
        major,
        is_64bit,
        vendor: parse_vendor(output),
        source,
    })
}

/// First double-quoted token, as in `openjdk version "17.0.9" 2023-10-17`.
fn parse_version_string(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

/// `1.8.0_392` is Java 8; from 9 on the first component is the major.
fn parse_major_version(version: &str) -> u32 {
    let number = |part: &str| -> Option<u32> {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    };
    let mut parts = version.split(['.', '-', '+', '_']);
    match parts.next().and_then(number) {
        Some(1) => parts.next().and_then(number).unwrap_or(1),
        Some(major) => major,
        None => 0,
    }
}

fn parse_vendor(output: &str) -> String {
    const VENDORS: [&str; 7] = [
        "Temurin",
        "Adoptium",
        "Zulu",
        "GraalVM",
        "Microsoft",
        "Corretto",
        "OpenJDK",
    ];
    VENDORS
        .iter()
        .find(|vendor| output.contains(*vendor))
        .map(|vendor| vendor.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Class files are forward compatible, but Minecraft's runtime tracks
/// (8, 17, 21) are not mixed: a Java 17 does not run a Java 8 game.
fn runtime_track(major: u32) -> u32 {
    if major <= 8 {
        8
    } else if major >= 21 {
        21
    } else {
        17
    }
}

pub fn is_java_compatible_major(installed_major: u32, required_major: u32) -> bool {
    installed_major >= required_major
        && runtime_track(installed_major) == runtime_track(required_major)
}

/// Best guess at the Java major a version needs when its metadata has no
/// `javaVersion` block.
pub fn required_java_for_minecraft_version(minecraft_version: &str) -> u32 {
    let lower = minecraft_version.to_ascii_lowercase();
    if let Some(week_pos) = lower.find('w') {
        let year_hint = &lower[..week_pos];
        if let Some(year) = year_hint
            .get(year_hint.len().saturating_sub(2)..)
            .and_then(|y| y.parse::<u32>().ok())
        {
            return if year >= 24 { 21 } else { 17 };
        }
    }

    let mut parts = minecraft_version.split('.').map(|p| p.parse::<u32>().ok());
    let major = parts.next().flatten().unwrap_or(1);
    let minor = parts.next().flatten().unwrap_or(20);
    let patch = parts.next().flatten().unwrap_or(0);

    if major > 1 || minor >= 21 || (minor == 20 && patch >= 5) {
        21
    } else if minor >= 17 {
        17
    } else {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("voxel-java-{}-{}", label, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn java_major_detection() {
        assert_eq!(required_java_for_minecraft_version("1.12.2"), 8);
        assert_eq!(required_java_for_minecraft_version("1.18.2"), 17);
        assert_eq!(required_java_for_minecraft_version("1.20.5"), 21);
        assert_eq!(required_java_for_minecraft_version("24w14a"), 21);
    }

    #[test]
    fn version_output_is_parsed() {
        let jdk8 = "java version \"1.8.0_392\"\nJava(TM) SE Runtime Environment (build 1.8.0_392-b08)\n\
                    Java HotSpot(TM) 64-Bit Server VM (build 25.392-b08, mixed mode)";
        let java = parse_version_output(Path::new("java"), JavaSource::Path, jdk8).unwrap();
        assert_eq!(java.version, "1.8.0_392");
        assert_eq!(java.major, 8);
        assert!(java.is_64bit);

        let temurin = "    sun.arch.data.model = 64\nopenjdk version \"17.0.9\" 2023-10-17\n\
                       OpenJDK Runtime Environment Temurin-17.0.9+9 (build 17.0.9+9)";
        let java = parse_version_output(Path::new("java"), JavaSource::Path, temurin).unwrap();
        assert_eq!((java.major, java.vendor.as_str()), (17, "Temurin"));

        assert_eq!(parse_major_version("21"), 21);
        assert_eq!(parse_major_version("21-ea"), 21);
        assert_eq!(parse_major_version("1.7.0_80"), 7);
        assert!(parse_version_output(Path::new("java"), JavaSource::Path, "command not found").is_none());
    }

    #[test]
    fn compatibility_stays_within_a_runtime_track() {
        assert!(is_java_compatible_major(8, 8));
        assert!(is_java_compatible_major(17, 17));
        assert!(is_java_compatible_major(18, 17));
        assert!(is_java_compatible_major(22, 21));
        assert!(!is_java_compatible_major(17, 21));
        assert!(!is_java_compatible_major(17, 8));
        assert!(!is_java_compatible_major(21, 17));
        assert!(!is_java_compatible_major(7, 8));
    }

    #[test]
    fn candidates_are_configured_then_home_then_path() {
        let root = root("candidates");
        let home = root.join("jdk");
        std::fs::create_dir_all(home.join("bin")).unwrap();
        std::fs::write(home.join("bin").join(java_exe()), b"").unwrap();
        let home_java = home.join("bin").join(java_exe());

        let found = java_candidates(Some(&root.join("missing")), Some(&home));
        assert_eq!(
            found,
            vec![
                (home_java.clone(), JavaSource::JavaHome),
                (PathBuf::from(java_exe()), JavaSource::Path)
            ]
        );

        let found = java_candidates(Some(&home), None);
        assert_eq!(found[0], (home_java.clone(), JavaSource::Configured));

        // Configured and JAVA_HOME pointing at the same JDK are asked once.
        let found = java_candidates(Some(&home), Some(&home));
        assert_eq!(found.len(), 2);

        let found = java_candidates(None, Some(&root.join("nope")));
        assert_eq!(found, vec![(PathBuf::from(java_exe()), JavaSource::Path)]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    fn fake_java(dir: &Path, name: &str, version: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(
            &path,
            format!("#!/bin/sh\necho 'openjdk version \"{}\" 2024-01-16' >&2\n", version),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn first_compatible_candidate_wins() {
        let root = root("find");
        let java8 = fake_java(&root, "java8", "1.8.0_402");
        let java17 = fake_java(&root, "java17", "17.0.10");
        let candidates = vec![
            (root.join("absent"), JavaSource::Configured),
            (java8.clone(), JavaSource::JavaHome),
            (java17.clone(), JavaSource::Path),
        ];

        let java = find_java_among(candidates.clone(), 17).await.unwrap();
        assert_eq!(java.major, 17);
        assert_eq!(java.source, JavaSource::Path);

        let java = find_java_among(candidates.clone(), 8).await.unwrap();
        assert_eq!(java.version, "1.8.0_402");

        match find_java_among(candidates, 21).await.unwrap_err() {
            LauncherError::JavaUnavailable { required, checked } => {
                assert_eq!(required, 21);
                assert_eq!(checked.len(), 3);
                assert!(checked[0].ends_with("(not runnable)"));
                assert!(checked[1].ends_with("(Java 8)"));
                assert!(checked[2].ends_with("(Java 17)"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&root);
    }
}
