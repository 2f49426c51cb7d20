pub mod manifest;
pub mod mirror;
pub mod rules;
pub mod version_file;

pub use manifest::{DocumentFormat, ManifestCache, VersionEntry, VersionManifest, VersionType};
pub use mirror::Mirror;
pub use rules::{Platform, PlatformRule};
pub use version_file::{LibArtifact, LibraryEntry, VersionMetadata};
