// ─── Launch Identity ───
// Credentials come from an external sign-in flow or are synthesized offline.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};

/// Who the game is launched as.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Identity {
    /// A signed-in account; the tuple is passed through untouched.
    Online {
        username: String,
        uuid: String,
        access_token: String,
    },
    Offline { username: String },
}

/// Values substituted into the game's `${auth_*}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCredentials {
    pub username: String,
    pub uuid: String,
    pub access_token: String,
    pub user_type: &'static str,
    pub xuid: String,
}

impl Identity {
    pub fn offline(username: &str) -> Self {
        Identity::Offline {
            username: username.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Identity::Online { username, .. } | Identity::Offline { username } => username,
        }
    }

    pub fn credentials(&self) -> LauncherResult<LaunchCredentials> {
        let username = self.username().trim();
        if username.is_empty() || username.chars().any(char::is_whitespace) {
            return Err(LauncherError::InvalidArgument(format!(
                "'{}' is not a valid player name",
                self.username()
            )));
        }

        Ok(match self {
            Identity::Online {
                uuid, access_token, ..
            } => LaunchCredentials {
                username: username.to_string(),
                uuid: uuid.replace('-', ""),
                access_token: access_token.clone(),
                user_type: "msa",
                xuid: "0".into(),
            },
            Identity::Offline { .. } => LaunchCredentials {
                username: username.to_string(),
                uuid: offline_uuid(username).simple().to_string(),
                access_token: String::new(),
                user_type: "legacy",
                xuid: "0".into(),
            },
        })
    }
}

/// Name-based (version 3) UUID of `OfflinePlayer:<name>`, the identity the
/// game server itself assigns to unauthenticated players.
pub fn offline_uuid(username: &str) -> Uuid {
    let digest = Md5::digest(format!("OfflinePlayer:{}", username).as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    uuid::Builder::from_md5_bytes(bytes).into_uuid()
}
