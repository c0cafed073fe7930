//! User model
//!
//! A registered member of the network: identity, credentials, profile fields
//! and a free-form preferences blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a registered member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Email address (unique, stored lower-cased)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Whether other members may see the email address
    pub email_public: bool,
    pub bio: Option<String>,
    /// Uploaded avatar URL, if any
    pub avatar: Option<String>,
    pub role: UserRole,
    /// Inactive accounts cannot log in
    pub is_active: bool,
    pub preferences: UserPreferences,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// The password must already be hashed with `services::password::hash_password()`.
    pub fn new(
        first_name: String,
        last_name: String,
        email: String,
        password_hash: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            first_name,
            last_name,
            email,
            password_hash,
            email_public: false,
            bio: None,
            avatar: None,
            role,
            is_active: true,
            preferences: UserPreferences::default(),
            last_activity_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last"
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Check if the user is an administrator
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Moderators and admins
    pub fn is_moderator(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Moderator)
    }

    /// Avatar to display: the uploaded one, otherwise a Gravatar derived from the email
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(url) if !url.is_empty() => url.clone(),
            _ => gravatar_url(&self.email),
        }
    }

    /// Compact author/recipient view used inside messages and notifications
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar: self.avatar_url(),
        }
    }
}

/// Generate Gravatar URL from email
pub fn gravatar_url(email: &str) -> String {
    let email = email.trim();
    if email.is_empty() {
        return "https://www.gravatar.com/avatar/?d=mp&s=80".to_string();
    }
    let hash = format!("{:x}", md5::compute(email.to_lowercase()));
    format!("https://www.gravatar.com/avatar/{}?d=mp&s=80", hash)
}

/// The handful of user fields shown next to content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::User
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Moderator => write!(f, "moderator"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "moderator" => Ok(UserRole::Moderator),
            "admin" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Per-user settings stored as a JSON blob.
///
/// Unknown keys from older clients are ignored and missing keys take their
/// defaults, so the blob can grow without a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPreferences {
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub browser_notifications: bool,
    pub show_email: bool,
    pub theme: String,
    pub language: String,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            push_notifications: true,
            browser_notifications: true,
            show_email: false,
            theme: "light".to_string(),
            language: "en".to_string(),
        }
    }
}

impl UserPreferences {
    /// Parse the stored blob, falling back to defaults for anything unreadable
    pub fn from_json(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Overlay the keys present in `patch` onto these preferences
    pub fn merge(&self, patch: &serde_json::Value) -> anyhow::Result<Self> {
        let mut current = serde_json::to_value(self)?;
        if let (Some(target), Some(source)) = (current.as_object_mut(), patch.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(current)
            .map_err(|e| anyhow::anyhow!("Invalid preferences: {}", e))
    }
}

/// Input for updating a user's own profile
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub email_public: Option<bool>,
    pub preferences: Option<serde_json::Value>,
}

/// One row of the login audit trail
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub email: String,
    pub ip_address: Option<String>,
    pub success: bool,
    pub failure_reason: Option<String>,
}
