//! Message and like models
//!
//! A message is a wall post. It may reply to another message (`parent_id`) or
//! be addressed to a specific member (`addressee_id`). Deletion is soft.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UserSummary;

/// Maximum message length in characters
pub const MAX_MESSAGE_LENGTH: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    /// Author
    pub user_id: i64,
    pub addressee_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub content: String,
    pub deleted: bool,
    pub is_private: bool,
    /// `@name` tokens found in the content
    pub mentions: Vec<String>,
    /// `#tag` tokens found in the content
    pub hashtags: Vec<String>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Top-level posts have no parent
    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Who may see a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Friends,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Self::Public
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Friends => write!(f, "friends"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "friends" => Ok(Visibility::Friends),
            "private" => Ok(Visibility::Private),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

/// Input for posting a message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMessageInput {
    pub content: String,
    pub addressee_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub is_private: bool,
}

impl CreateMessageInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// A like or dislike left by one user on one message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub message_id: i64,
    pub like_type: LikeType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeType {
    Like,
    Dislike,
}

impl fmt::Display for LikeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LikeType::Like => write!(f, "like"),
            LikeType::Dislike => write!(f, "dislike"),
        }
    }
}

impl FromStr for LikeType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" => Ok(LikeType::Like),
            "dislike" => Ok(LikeType::Dislike),
            _ => Err(anyhow::anyhow!("Invalid like type: {}", s)),
        }
    }
}

/// Outcome of a like/dislike toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionOutcome {
    Added,
    Removed,
}

/// Message as shown to readers: author, addressee and reaction counts attached
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub content: String,
    pub author: UserSummary,
    pub addressee: Option<UserSummary>,
    pub parent_id: Option<i64>,
    pub visibility: Visibility,
    pub is_private: bool,
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
    pub likes: i64,
    pub dislikes: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<MessageView>,
}
