// ─── Download Mirrors ───
// Rewrites official hosts onto a BMCLAPI-compatible mirror.

/// Host (optionally with a leading path) on the official side, and the path
/// prefix it maps to on the mirror.
const HOST_PREFIXES: &[(&str, &str)] = &[
    ("piston-meta.mojang.com", ""),
    ("piston-data.mojang.com", ""),
    ("launcher.mojang.com", ""),
    ("launchermeta.mojang.com", ""),
    ("libraries.minecraft.net", "/maven"),
    ("resources.download.minecraft.net", "/assets"),
    ("maven.minecraftforge.net", "/maven"),
    ("maven.fabricmc.net", "/maven"),
    ("maven.neoforged.net/releases", "/maven"),
    ("meta.fabricmc.net", "/fabric-meta"),
];

#[derive(Debug, Clone, Default)]
pub struct Mirror {
    /// Mirror host, e.g. `bmclapi2.bangbang93.com`. `None` disables rewriting.
    domain: Option<String>,
}

impl Mirror {
    pub fn official() -> Self {
        Self { domain: None }
    }

    pub fn new(enabled: bool, domain: &str) -> Self {
        let domain = domain.trim().trim_end_matches('/');
        Self {
            domain: (enabled && !domain.is_empty()).then(|| domain.to_string()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.domain.is_some()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// The mirror equivalent of `url`, if the host is one we know how to map.
    pub fn rewrite(&self, url: &str) -> Option<String> {
        let domain = self.domain.as_deref()?;
        let rest = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))?;

        HOST_PREFIXES.iter().find_map(|(host, prefix)| {
            let path = rest.strip_prefix(host)?;
            if !(path.is_empty() || path.starts_with('/')) {
                return None;
            }
            Some(format!("https://{}{}{}", domain, prefix, path))
        })
    }

    /// Download sources for `url` in preference order. The official URL is
    /// always last so a mirror outage never blocks an install.
    pub fn sources(&self, url: &str) -> Vec<String> {
        match self.rewrite(url) {
            Some(mirrored) if mirrored != url => vec![mirrored, url.to_string()],
            _ => vec![url.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_mirror_keeps_official_url() {
        let mirror = Mirror::new(false, "bmclapi2.bangbang93.com");
        let url = "https://libraries.minecraft.net/a/b/1/b-1.jar";
        assert_eq!(mirror.sources(url), vec![url.to_string()]);
    }

    #[test]
    fn known_hosts_are_mapped_with_prefixes() {
        let mirror = Mirror::new(true, "bmclapi2.bangbang93.com/");
        assert_eq!(
            mirror
                .rewrite("https://libraries.minecraft.net/a/b/1/b-1.jar")
                .as_deref(),
            Some("https://bmclapi2.bangbang93.com/maven/a/b/1/b-1.jar")
        );
        assert_eq!(
            mirror
                .rewrite("https://resources.download.minecraft.net/ab/abcdef")
                .as_deref(),
            Some("https://bmclapi2.bangbang93.com/assets/ab/abcdef")
        );
        assert_eq!(
            mirror
                .rewrite("https://piston-meta.mojang.com/mc/game/version_manifest_v2.json")
                .as_deref(),
            Some("https://bmclapi2.bangbang93.com/mc/game/version_manifest_v2.json")
        );
    }

    #[test]
    fn unknown_hosts_are_left_alone() {
        let mirror = Mirror::new(true, "bmclapi2.bangbang93.com");
        let url = "https://example.org/file.jar";
        assert_eq!(mirror.rewrite(url), None);
        assert_eq!(mirror.sources(url), vec![url.to_string()]);
        assert_eq!(
            mirror.rewrite("https://libraries.minecraft.net.evil.com/x"),
            None
        );
    }

    #[test]
    fn mirrored_sources_fall_back_to_official() {
        let mirror = Mirror::new(true, "bmclapi2.bangbang93.com");
        let url = "https://maven.neoforged.net/releases/net/neoforged/neoforge/21.1.1/x.jar";
        assert_eq!(
            mirror.sources(url),
            vec![
                "https://bmclapi2.bangbang93.com/maven/net/neoforged/neoforge/21.1.1/x.jar"
                    .to_string(),
                url.to_string()
            ]
        );
    }
}
