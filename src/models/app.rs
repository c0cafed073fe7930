//! Third-party app ("mini-app") model
//!
//! An app authenticates against the external API with a key/secret pair and
//! acts on behalf of its owner within the permissions it declared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_APPS_PER_USER: i64 = 10;
pub const MAX_APP_NAME_LENGTH: usize = 100;
pub const MAX_APP_DESCRIPTION_LENGTH: usize = 500;
pub const DEFAULT_APP_RATE_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i64,
    pub api_key: String,
    /// SHA-256 of the secret; the secret itself is only shown once
    #[serde(skip_serializing)]
    pub api_secret_hash: String,
    pub permissions: Vec<AppPermission>,
    pub is_active: bool,
    pub rate_limit: i64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl App {
    pub fn has_permission(&self, permission: AppPermission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// Scopes an app may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppPermission {
    #[serde(rename = "read:profile")]
    ReadProfile,
    #[serde(rename = "write:profile")]
    WriteProfile,
    #[serde(rename = "read:messages")]
    ReadMessages,
    #[serde(rename = "write:messages")]
    WriteMessages,
    #[serde(rename = "read:friends")]
    ReadFriends,
    #[serde(rename = "write:friends")]
    WriteFriends,
    #[serde(rename = "read:notifications")]
    ReadNotifications,
    #[serde(rename = "write:notifications")]
    WriteNotifications,
    #[serde(rename = "read:groups")]
    ReadGroups,
    #[serde(rename = "write:groups")]
    WriteGroups,
}

impl AppPermission {
    pub const ALL: [AppPermission; 10] = [
        AppPermission::ReadProfile,
        AppPermission::WriteProfile,
        AppPermission::ReadMessages,
        AppPermission::WriteMessages,
        AppPermission::ReadFriends,
        AppPermission::WriteFriends,
        AppPermission::ReadNotifications,
        AppPermission::WriteNotifications,
        AppPermission::ReadGroups,
        AppPermission::WriteGroups,
    ];

    /// Granted when an app is created without an explicit list
    pub fn defaults() -> Vec<AppPermission> {
        vec![AppPermission::ReadProfile, AppPermission::ReadMessages]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppPermission::ReadProfile => "read:profile",
            AppPermission::WriteProfile => "write:profile",
            AppPermission::ReadMessages => "read:messages",
            AppPermission::WriteMessages => "write:messages",
            AppPermission::ReadFriends => "read:friends",
            AppPermission::WriteFriends => "write:friends",
            AppPermission::ReadNotifications => "read:notifications",
            AppPermission::WriteNotifications => "write:notifications",
            AppPermission::ReadGroups => "read:groups",
            AppPermission::WriteGroups => "write:groups",
        }
    }
}

impl fmt::Display for AppPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppPermission {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        AppPermission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == lowered)
            .ok_or_else(|| anyhow::anyhow!("Invalid permission: {}", s))
    }
}

/// A freshly minted key/secret pair; the secret is never stored in clear
#[derive(Debug, Clone, Serialize)]
pub struct AppCredentials {
    pub api_key: String,
    pub api_secret: String,
}
