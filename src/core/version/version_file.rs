// ─── Version File ───
// Typed view of a Mojang-format version JSON. Unknown fields are kept so a
// document written back to disk still carries everything the source had.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::rules::{self, Platform, PlatformRule};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;

/// A parsed version JSON (vanilla, or vanilla merged with a loader).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<VersionDownloads>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_index: Option<AssetIndexInfo>,
    /// Asset index id on very old documents without `assetIndex`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Arguments>,
    /// Legacy `minecraftArguments` field (pre-1.13).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_version: Option<JavaVersionInfo>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<DownloadArtifact>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

// ─── Arguments ───

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<ArgumentValue>,
    #[serde(default)]
    pub jvm: Vec<ArgumentValue>,
}

/// One entry of `arguments.game` / `arguments.jvm`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ArgumentValue {
    Plain(String),
    Conditional {
        rules: Vec<PlatformRule>,
        value: OneOrMany,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl ArgumentValue {
    /// Expand to the tokens that apply on `platform`.
    pub fn tokens(&self, platform: &Platform) -> Vec<String> {
        match self {
            ArgumentValue::Plain(s) => vec![s.clone()],
            ArgumentValue::Conditional { rules: r, value } => {
                if !rules::applies(r, platform) {
                    return vec![];
                }
                match value {
                    OneOrMany::One(s) => vec![s.clone()],
                    OneOrMany::Many(v) => v.clone(),
                }
            }
        }
    }
}

// ─── Libraries ───

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloads: Option<LibraryDownloads>,
    /// Maven repository base for entries without `downloads` (Fabric style).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PlatformRule>,
    /// Legacy natives map: OS name to classifier (may contain `${arch}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<LibArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifiers: Option<HashMap<String, LibArtifact>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LibArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub url: String,
}

impl LibraryEntry {
    /// A bare library with only a coordinate and a repository.
    pub fn from_coordinate(name: &str, repo: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            downloads: None,
            url: repo.map(str::to_string),
            sha1: None,
            size: None,
            rules: Vec::new(),
            natives: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn coordinate(&self) -> LauncherResult<MavenArtifact> {
        MavenArtifact::parse(&self.name)
    }

    /// Identity used when merging libraries: `group:artifact[:classifier]`.
    /// The version is deliberately left out so a newer copy replaces an older one.
    pub fn logical_name(&self) -> String {
        match MavenArtifact::parse(&self.name) {
            Ok(a) => a.logical_name(),
            Err(_) => self.name.clone(),
        }
    }

    pub fn applies_to(&self, platform: &Platform) -> bool {
        rules::applies(&self.rules, platform)
    }

    /// Native classifier for `platform` from the legacy `natives` map.
    pub fn native_classifier(&self, platform: &Platform) -> Option<String> {
        self.natives
            .as_ref()?
            .get(&platform.os)
            .map(|c| c.replace("${arch}", platform.bitness()))
    }
}

impl VersionMetadata {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Asset index reference, falling back to the legacy `assets` id.
    pub fn asset_index_id(&self) -> Option<&str> {
        self.asset_index
            .as_ref()
            .map(|a| a.id.as_str())
            .or(self.assets.as_deref())
    }

    pub fn client_download(&self) -> LauncherResult<&DownloadArtifact> {
        self.downloads
            .as_ref()
            .and_then(|d| d.client.as_ref())
            .ok_or_else(|| {
                LauncherError::Resolution(format!("{} has no client download", self.id))
            })
    }

    pub fn required_java_major(&self) -> Option<u32> {
        self.java_version.as_ref().map(|j| j.major_version)
    }

    /// Game argument template tokens for `platform`.
    pub fn game_arguments(&self, platform: &Platform) -> Vec<String> {
        match &self.arguments {
            Some(args) if !args.game.is_empty() => {
                args.game.iter().flat_map(|a| a.tokens(platform)).collect()
            }
            _ => self
                .minecraft_arguments
                .as_deref()
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }

    /// JVM argument template tokens for `platform`. Documents that predate
    /// `arguments.jvm` get the classic natives/classpath pair.
    pub fn jvm_arguments(&self, platform: &Platform) -> Vec<String> {
        match &self.arguments {
            Some(args) if !args.jvm.is_empty() => {
                args.jvm.iter().flat_map(|a| a.tokens(platform)).collect()
            }
            _ => legacy_jvm_arguments(),
        }
    }
}

/// JVM arguments implied by documents that only carry `minecraftArguments`.
pub fn legacy_jvm_arguments() -> Vec<String> {
    vec![
        "-Djava.library.path=${natives_directory}".into(),
        "-cp".into(),
        "${classpath}".into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_rules_apply_to_the_given_platform() {
        let parsed: VersionMetadata = serde_json::from_value(serde_json::json!({
            "id": "test",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": {
                "game": [
                    "--username",
                    "${auth_player_name}",
                    {
                        "rules": [{"action": "allow", "os": {"name": "linux"}}],
                        "value": ["--linux-only"]
                    },
                    {
                        "rules": [{"action": "allow", "features": {"is_demo_user": true}}],
                        "value": "--demo"
                    }
                ]
            }
        }))
        .unwrap();

        let linux = parsed.game_arguments(&Platform::new("linux", "x86_64"));
        assert_eq!(linux, vec!["--username", "${auth_player_name}", "--linux-only"]);
        let windows = parsed.game_arguments(&Platform::new("windows", "x86_64"));
        assert_eq!(windows, vec!["--username", "${auth_player_name}"]);
    }

    #[test]
    fn legacy_minecraft_arguments_are_split() {
        let parsed = VersionMetadata::parse(
            r#"{"id":"1.7.10","mainClass":"net.minecraft.client.main.Main",
                "minecraftArguments":"--username ${auth_player_name} --version ${version_name}",
                "assets":"1.7.10"}"#,
        )
        .unwrap();
        let platform = Platform::new("linux", "x86_64");
        assert_eq!(parsed.game_arguments(&platform).len(), 4);
        assert!(parsed
            .jvm_arguments(&platform)
            .contains(&"${classpath}".to_string()));
        assert_eq!(parsed.asset_index_id(), Some("1.7.10"));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = r#"{"id":"1.21.1","type":"release","mainClass":"M","complianceLevel":1,
            "libraries":[{"name":"a:b:1","extract":{"exclude":["META-INF/"]}}]}"#;
        let parsed = VersionMetadata::parse(raw).unwrap();
        let written = serde_json::to_value(&parsed).unwrap();
        assert_eq!(written["complianceLevel"], 1);
        assert_eq!(written["type"], "release");
        assert_eq!(written["libraries"][0]["extract"]["exclude"][0], "META-INF/");
    }

    #[test]
    fn legacy_native_classifier_substitutes_arch() {
        let lib: LibraryEntry = serde_json::from_value(serde_json::json!({
            "name": "tv.twitch:twitch-platform:5.16",
            "natives": {"windows": "natives-windows-${arch}"}
        }))
        .unwrap();
        assert_eq!(
            lib.native_classifier(&Platform::new("windows", "x86")),
            Some("natives-windows-32".to_string())
        );
        assert_eq!(lib.native_classifier(&Platform::new("linux", "x86_64")), None);
    }
}
