use super::{DocumentSource, LoaderVersion};
use crate::core::error::LauncherResult;
use crate::core::maven::NEOFORGE_MAVEN;
use crate::core::version::{DocumentFormat, ManifestCache};

/// 1.20.1 builds were published under the old `forge` artifact before the
/// project renamed its coordinates.
const LEGACY_MC_VERSION: &str = "1.20.1";

pub(super) fn document_source(loader_version: &str) -> DocumentSource {
    DocumentSource {
        key: format!("neoforge-{}", loader_version),
        urls: vec![
            format!(
                "{}/net/neoforged/neoforge/{}/neoforge-{}-installer.jar",
                NEOFORGE_MAVEN, loader_version, loader_version
            ),
            format!(
                "{}/net/neoforged/forge/{}/forge-{}-installer.jar",
                NEOFORGE_MAVEN, loader_version, loader_version
            ),
        ],
        format: DocumentFormat::ZipEntry("version.json"),
    }
}

/// NeoForge versions drop the leading `1.` of the Minecraft version:
/// 1.20.4 maps to `20.4.*`, 1.21 to `21.0.*`.
fn version_prefix(mc_version: &str) -> String {
    let mut parts = mc_version.trim_start_matches("1.").split('.');
    let minor = parts.next().unwrap_or_default();
    let patch = parts.next().unwrap_or("0");
    format!("{}.{}.", minor, patch)
}

pub(super) async fn list_versions(
    cache: &ManifestCache,
    mc_version: &str,
) -> LauncherResult<Vec<LoaderVersion>> {
    let url = format!("{}/net/neoforged/neoforge/maven-metadata.xml", NEOFORGE_MAVEN);
    let prefix = version_prefix(mc_version);

    let mut resolved: Vec<String> = super::maven_versions(cache, "NeoForge metadata", &url)
        .await?
        .into_iter()
        .filter(|v| v.starts_with(&prefix))
        .collect();

    if mc_version == LEGACY_MC_VERSION {
        let legacy_url = format!("{}/net/neoforged/forge/maven-metadata.xml", NEOFORGE_MAVEN);
        resolved.extend(
            super::maven_versions(cache, "legacy NeoForge metadata", &legacy_url)
                .await?
                .into_iter()
                .filter(|v| v.starts_with(LEGACY_MC_VERSION)),
        );
    }

    Ok(resolved
        .into_iter()
        .map(|version| LoaderVersion {
            stable: !version.contains("beta"),
            version,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_drops_leading_one() {
        assert_eq!(version_prefix("1.20.4"), "20.4.");
        assert_eq!(version_prefix("1.21"), "21.0.");
        assert_eq!(version_prefix("1.21.1"), "21.1.");
    }

    #[test]
    fn installer_has_legacy_fallback() {
        let source = document_source("47.1.106");
        assert_eq!(source.urls.len(), 2);
        assert!(source.urls[1].contains("/net/neoforged/forge/47.1.106/"));
    }
}
