//! Friendship service
//!
//! One row per pair of users, in either direction. The row's `user_id` is the
//! requester (or the blocker once blocked).

use crate::db::repositories::{FriendshipRepository, UserRepository};
use crate::models::{FriendList, Friendship, FriendshipStatus, NotificationKind, User, UserSummary};
use crate::services::notification::NotificationService;
use anyhow::Context;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FriendshipServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Friendship already exists")]
    AlreadyExists,

    #[error("This user cannot be added")]
    Blocked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct FriendshipService {
    friendships: Arc<dyn FriendshipRepository>,
    users: Arc<dyn UserRepository>,
    notifications: Arc<NotificationService>,
}

impl FriendshipService {
    pub fn new(
        friendships: Arc<dyn FriendshipRepository>,
        users: Arc<dyn UserRepository>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            friendships,
            users,
            notifications,
        }
    }

    /// Ask `friend_id` to become friends with `user`
    pub async fn send_request(&self, user: &User, friend_id: i64) -> Result<Friendship, FriendshipServiceError> {
        if user.id == friend_id {
            return Err(FriendshipServiceError::ValidationError(
                "You cannot send a friend request to yourself".to_string(),
            ));
        }
        self.users
            .get_by_id(friend_id)
            .await
            .context("Failed to get user")?
            .ok_or(FriendshipServiceError::NotFound("User"))?;

        if let Some(existing) = self.find_between(user.id, friend_id).await? {
            return Err(match existing.status {
                FriendshipStatus::Blocked => FriendshipServiceError::Blocked,
                _ => FriendshipServiceError::AlreadyExists,
            });
        }

        let friendship = self
            .friendships
            .create(user.id, friend_id, FriendshipStatus::Pending)
            .await
            .context("Failed to create friend request")?;

        let name = user.full_name();
        self.notifications
            .notify(
                friend_id,
                NotificationKind::FriendRequest,
                &format!("New friend request from {}", name),
                &format!("{} wants to be your friend", name),
                json!({ "fromUserId": user.id }),
            )
            .await;

        Ok(friendship)
    }

    pub async fn accept(&self, user: &User, requester_id: i64) -> Result<Friendship, FriendshipServiceError> {
        let mut friendship = self.pending_from(requester_id, user.id).await?;
        friendship.status = FriendshipStatus::Accepted;
        let friendship = self
            .friendships
            .update_status(&friendship)
            .await
            .context("Failed to accept friend request")?;

        self.notifications
            .notify(
                requester_id,
                NotificationKind::System,
                "Friend request accepted",
                &format!("{} accepted your friend request", user.full_name()),
                json!({ "fromUserId": user.id }),
            )
            .await;

        Ok(friendship)
    }

    pub async fn reject(&self, user_id: i64, requester_id: i64) -> Result<Friendship, FriendshipServiceError> {
        let mut friendship = self.pending_from(requester_id, user_id).await?;
        friendship.status = FriendshipStatus::Rejected;
        Ok(self
            .friendships
            .update_status(&friendship)
            .await
            .context("Failed to reject friend request")?)
    }

    /// Block `other_id`, turning any existing row around so the blocker owns it
    pub async fn block(&self, user_id: i64, other_id: i64) -> Result<Friendship, FriendshipServiceError> {
        if user_id == other_id {
            return Err(FriendshipServiceError::ValidationError(
                "You cannot block yourself".to_string(),
            ));
        }
        self.users
            .get_by_id(other_id)
            .await
            .context("Failed to get user")?
            .ok_or(FriendshipServiceError::NotFound("User"))?;

        let friendship = match self.find_between(user_id, other_id).await? {
            Some(existing) if existing.status == FriendshipStatus::Blocked => {
                // A blocked user cannot turn the block around
                if existing.user_id != user_id {
                    return Err(FriendshipServiceError::Blocked);
                }
                existing
            }
            Some(mut existing) => {
                existing.user_id = user_id;
                existing.friend_id = other_id;
                existing.status = FriendshipStatus::Blocked;
                self.friendships
                    .update_status(&existing)
                    .await
                    .context("Failed to block user")?
            }
            None => self
                .friendships
                .create(user_id, other_id, FriendshipStatus::Blocked)
                .await
                .context("Failed to block user")?,
        };
        Ok(friendship)
    }

    /// Delete the row between the two users.
    ///
    /// Friends and pending requests can be removed by either side. A rejection
    /// can only be cleared by the user who rejected, and a block only by the
    /// blocker, which unblocks.
    pub async fn remove(&self, user_id: i64, friend_id: i64) -> Result<(), FriendshipServiceError> {
        let friendship = self
            .find_between(user_id, friend_id)
            .await?
            .ok_or(FriendshipServiceError::NotFound("Friendship"))?;

        match friendship.status {
            FriendshipStatus::Accepted | FriendshipStatus::Pending => {}
            FriendshipStatus::Rejected if friendship.friend_id == user_id => {}
            FriendshipStatus::Blocked if friendship.user_id == user_id => {}
            FriendshipStatus::Rejected => {
                return Err(FriendshipServiceError::Forbidden(
                    "Only the user who rejected the request can clear it".to_string(),
                ))
            }
            FriendshipStatus::Blocked => return Err(FriendshipServiceError::Blocked),
        }

        self.friendships
            .delete(friendship.id)
            .await
            .context("Failed to remove friendship")?;
        Ok(())
    }

    pub async fn list(&self, user_id: i64) -> Result<FriendList, FriendshipServiceError> {
        let accepted = self
            .friendships
            .list_accepted(user_id)
            .await
            .context("Failed to list friends")?;
        let pending = self
            .friendships
            .list_incoming_pending(user_id)
            .await
            .context("Failed to list friend requests")?;

        let friend_ids: Vec<i64> = accepted.iter().map(|f| f.other_party(user_id)).collect();
        let requester_ids: Vec<i64> = pending.iter().map(|f| f.user_id).collect();

        Ok(FriendList {
            friends: self.summaries(&friend_ids).await?,
            pending_requests: self.summaries(&requester_ids).await?,
        })
    }

    pub async fn status_between(&self, a: i64, b: i64) -> Result<Option<FriendshipStatus>, FriendshipServiceError> {
        Ok(self.find_between(a, b).await?.map(|f| f.status))
    }

    async fn find_between(&self, a: i64, b: i64) -> Result<Option<Friendship>, FriendshipServiceError> {
        Ok(self
            .friendships
            .find_between(a, b)
            .await
            .context("Failed to look up friendship")?)
    }

    async fn pending_from(&self, requester_id: i64, user_id: i64) -> Result<Friendship, FriendshipServiceError> {
        self.find_between(requester_id, user_id)
            .await?
            .filter(|f| {
                f.status == FriendshipStatus::Pending && f.user_id == requester_id && f.friend_id == user_id
            })
            .ok_or(FriendshipServiceError::NotFound("Friend request"))
    }

    /// Summaries in the order of `ids`
    async fn summaries(&self, ids: &[i64]) -> Result<Vec<UserSummary>, FriendshipServiceError> {
        let users: HashMap<i64, User> = self
            .users
            .get_many(ids)
            .await
            .context("Failed to load users")?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        Ok(ids.iter().filter_map(|id| users.get(id)).map(User::summary).collect())
    }
}
