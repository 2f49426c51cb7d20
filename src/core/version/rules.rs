// ─── Platform Rules ───
// Decides whether a library, native or argument applies to a platform.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformRule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
    /// Launcher feature switches (`is_demo_user`, `has_custom_resolution`...).
    /// None of them are enabled by this launcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    /// Regex over the OS version string. Only ever used to single out
    /// ancient macOS releases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// The OS/arch pair rules are evaluated against, in Mojang's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// `windows`, `osx` or `linux`.
    pub os: String,
    /// `x86`, `x86_64` or `arm64`.
    pub arch: String,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    pub fn current() -> Self {
        let os = if cfg!(target_os = "windows") {
            "windows"
        } else if cfg!(target_os = "macos") {
            "osx"
        } else {
            "linux"
        };
        let arch = if cfg!(target_arch = "x86") {
            "x86"
        } else if cfg!(target_arch = "aarch64") {
            "arm64"
        } else {
            "x86_64"
        };
        Self::new(os, arch)
    }

    /// Value substituted for `${arch}` in legacy native classifiers.
    pub fn bitness(&self) -> &'static str {
        if self.arch == "x86" {
            "32"
        } else {
            "64"
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

impl PlatformRule {
    /// Whether this rule's predicate holds on `platform`. Unset fields are
    /// wildcards. A version constraint is never satisfied, and neither is a
    /// feature switch that asks for an enabled feature.
    pub fn matches(&self, platform: &Platform) -> bool {
        if let Some(features) = &self.features {
            if features.values().any(|wanted| *wanted) {
                return false;
            }
        }

        let Some(os) = &self.os else {
            return true;
        };

        if os.name.as_deref().is_some_and(|name| name != platform.os) {
            return false;
        }
        if os.arch.as_deref().is_some_and(|arch| arch != platform.arch) {
            return false;
        }
        os.version.is_none()
    }
}

/// Evaluate a rule list. Empty means allowed; otherwise start denied and let
/// the last matching rule decide.
pub fn applies(rules: &[PlatformRule], platform: &Platform) -> bool {
    if rules.is_empty() {
        return true;
    }

    let mut include = false;
    for rule in rules {
        if rule.matches(platform) {
            include = rule.action == RuleAction::Allow;
        }
    }
    include
}
