//! Group model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UserSummary;

pub const MAX_GROUPS_PER_USER: i64 = 50;
pub const MAX_MEMBERS_PER_GROUP: i64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Private groups cannot be joined without an invitation
    pub is_private: bool,
    pub owner_id: i64,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: i64,
    pub user_id: i64,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Owner,
    Admin,
    Member,
}

impl Default for GroupRole {
    fn default() -> Self {
        Self::Member
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRole::Owner => write!(f, "owner"),
            GroupRole::Admin => write!(f, "admin"),
            GroupRole::Member => write!(f, "member"),
        }
    }
}

impl FromStr for GroupRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(GroupRole::Owner),
            "admin" => Ok(GroupRole::Admin),
            "member" => Ok(GroupRole::Member),
            _ => Err(anyhow::anyhow!("Invalid group role: {}", s)),
        }
    }
}

/// Member entry with the user's display fields
#[derive(Debug, Clone, Serialize)]
pub struct GroupMemberView {
    pub user: UserSummary,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// Group together with its member list
#[derive(Debug, Clone, Serialize)]
pub struct GroupWithMembers {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<GroupMemberView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_role() {
        assert_eq!(GroupRole::from_str("Owner").unwrap(), GroupRole::Owner);
        assert_eq!(GroupRole::default(), GroupRole::Member);
        assert!(GroupRole::from_str("guest").is_err());
    }
}
