//! Friendship model
//!
//! Rows are directed (`user_id` asked `friend_id`) but read in both
//! directions: once accepted, either side sees the other as a friend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UserSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friendship {
    pub id: i64,
    /// Requester (or blocker)
    pub user_id: i64,
    /// Addressee of the request
    pub friend_id: i64,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Friendship {
    /// The member on the other side of this row from `user_id`
    pub fn other_party(&self, user_id: i64) -> i64 {
        if self.user_id == user_id {
            self.friend_id
        } else {
            self.user_id
        }
    }

    pub fn involves(&self, user_id: i64) -> bool {
        self.user_id == user_id || self.friend_id == user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

impl Default for FriendshipStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for FriendshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FriendshipStatus::Pending => write!(f, "pending"),
            FriendshipStatus::Accepted => write!(f, "accepted"),
            FriendshipStatus::Rejected => write!(f, "rejected"),
            FriendshipStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl FromStr for FriendshipStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FriendshipStatus::Pending),
            "accepted" => Ok(FriendshipStatus::Accepted),
            "rejected" => Ok(FriendshipStatus::Rejected),
            "blocked" => Ok(FriendshipStatus::Blocked),
            _ => Err(anyhow::anyhow!("Invalid friendship status: {}", s)),
        }
    }
}

/// A user's friends plus the requests waiting on them
#[derive(Debug, Clone, Serialize)]
pub struct FriendList {
    pub friends: Vec<UserSummary>,
    pub pending_requests: Vec<UserSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friendship(user_id: i64, friend_id: i64) -> Friendship {
        Friendship {
            id: 1,
            user_id,
            friend_id,
            status: FriendshipStatus::Accepted,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_other_party_is_symmetric() {
        let f = friendship(3, 7);
        assert_eq!(f.other_party(3), 7);
        assert_eq!(f.other_party(7), 3);
        assert!(f.involves(3));
        assert!(!f.involves(4));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(FriendshipStatus::from_str("BLOCKED").unwrap(), FriendshipStatus::Blocked);
        assert_eq!(FriendshipStatus::default(), FriendshipStatus::Pending);
        assert_eq!(FriendshipStatus::Rejected.to_string(), "rejected");
        assert!(FriendshipStatus::from_str("maybe").is_err());
    }
}
