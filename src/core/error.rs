use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the whole acquisition and launch pipeline.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Giving up on {artifact} after {attempts} attempts: {last}")]
    DownloadExhausted {
        artifact: String,
        attempts: u32,
        last: Box<LauncherError>,
    },

    // ── Manifests ───────────────────────────────────────
    #[error("Could not fetch {what}: {reason}")]
    ManifestFetch { what: String, reason: String },

    #[error("Unknown Minecraft version: {0}")]
    VersionNotFound(String),

    // ── Integrity ───────────────────────────────────────
    #[error("Checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    // ── Loaders ─────────────────────────────────────────
    #[error("{loader} targets Minecraft {found}, but {expected} was requested")]
    LoaderMismatch {
        loader: String,
        expected: String,
        found: String,
    },

    #[error("Loader metadata unavailable: {0}")]
    LoaderApi(String),

    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    #[error("Installer processor {processor} failed: {reason}")]
    Processor { processor: String, reason: String },

    // ── Resolution ──────────────────────────────────────
    #[error("Cannot resolve version graph: {0}")]
    Resolution(String),

    // ── Installed versions ──────────────────────────────
    #[error("Version name '{0}' is already taken by a different install")]
    NameConflict(String),

    #[error("Version '{0}' is not fully installed")]
    VersionIncomplete(String),

    #[error("Install task {0} was cancelled")]
    Cancelled(String),

    #[error("No install task with id {0}")]
    TaskNotFound(String),

    // ── Launch ──────────────────────────────────────────
    #[error("Invalid launch argument '{0}'")]
    InvalidArgument(String),

    #[error("Unresolved placeholder {placeholder} in argument '{argument}'")]
    UnresolvedPlaceholder {
        placeholder: String,
        argument: String,
    },

    #[error("No Java {required} runtime found (checked: {})", .checked.join(", "))]
    JavaUnavailable { required: u32, checked: Vec<String> },

    #[error("Failed to start {program:?}: {source}")]
    Launch {
        program: PathBuf,
        source: std::io::Error,
    },

    // ── Serialization ───────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable tag for the JSON surface.
    pub fn kind(&self) -> &'static str {
        match self {
            LauncherError::Io { .. } => "io",
            LauncherError::Http(_) | LauncherError::DownloadFailed { .. } => "network",
            LauncherError::DownloadExhausted { .. } => "download_exhausted",
            LauncherError::ManifestFetch { .. } => "manifest_fetch",
            LauncherError::VersionNotFound(_) => "version_not_found",
            LauncherError::ChecksumMismatch { .. } => "checksum_mismatch",
            LauncherError::LoaderMismatch { .. } => "loader_mismatch",
            LauncherError::LoaderApi(_) => "loader_api",
            LauncherError::Processor { .. } => "processor",
            LauncherError::InvalidMavenCoordinate(_) | LauncherError::Resolution(_) => {
                "resolution"
            }
            LauncherError::NameConflict(_) => "name_conflict",
            LauncherError::VersionIncomplete(_) => "version_incomplete",
            LauncherError::Cancelled(_) => "cancelled",
            LauncherError::TaskNotFound(_) => "task_not_found",
            LauncherError::InvalidArgument(_) => "invalid_argument",
            LauncherError::UnresolvedPlaceholder { .. } => "unresolved_placeholder",
            LauncherError::JavaUnavailable { .. } => "java_unavailable",
            LauncherError::Launch { .. } => "launch",
            LauncherError::Json(_) | LauncherError::Xml(_) | LauncherError::Zip(_) => "parse",
            LauncherError::Other(_) => "other",
        }
    }

    /// Whether a download attempt that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LauncherError::Http(_)
                | LauncherError::DownloadFailed { .. }
                | LauncherError::ChecksumMismatch { .. }
                | LauncherError::Io { .. }
        )
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for the JSON surface ──────────────────
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_error_names_the_artifact() {
        let err = LauncherError::DownloadExhausted {
            artifact: "org.lwjgl:lwjgl:3.3.3".into(),
            attempts: 4,
            last: Box::new(LauncherError::DownloadFailed {
                url: "https://libraries.minecraft.net/x.jar".into(),
                status: 503,
            }),
        };
        let text = err.to_string();
        assert!(text.contains("org.lwjgl:lwjgl:3.3.3"));
        assert!(text.contains("503"));
        assert_eq!(err.kind(), "download_exhausted");
    }

    #[test]
    fn loader_mismatch_is_not_retryable() {
        let err = LauncherError::LoaderMismatch {
            loader: "fabric 0.15.11".into(),
            expected: "1.20.1".into(),
            found: "1.20.4".into(),
        };
        assert!(!err.is_retryable());
        assert!(LauncherError::ChecksumMismatch {
            artifact: "a".into(),
            expected: "b".into(),
            actual: "c".into()
        }
        .is_retryable());
    }

    #[test]
    fn missing_java_lists_what_was_checked() {
        let err = LauncherError::JavaUnavailable {
            required: 21,
            checked: vec!["/opt/jdk8/bin/java (Java 8)".into(), "java (not runnable)".into()],
        };
        let text = err.to_string();
        assert!(text.contains("Java 21"));
        assert!(text.contains("/opt/jdk8/bin/java (Java 8)"));
        assert_eq!(err.kind(), "java_unavailable");
        assert!(!err.is_retryable());
    }
}
