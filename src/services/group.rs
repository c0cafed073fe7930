//! Group service

use crate::db::repositories::{GroupRepository, UserRepository};
use crate::models::{
    Group, GroupMemberView, GroupRole, GroupWithMembers, User, MAX_GROUPS_PER_USER,
    MAX_MEMBERS_PER_GROUP,
};
use crate::services::text::length_between;
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// How many groups `suggested` returns
const SUGGESTED_GROUPS: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum GroupServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Group not found")]
    NotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateGroupInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

pub struct GroupService {
    groups: Arc<dyn GroupRepository>,
    users: Arc<dyn UserRepository>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { groups, users }
    }

    /// Create a group and enrol the owner
    pub async fn create(&self, owner_id: i64, input: CreateGroupInput) -> Result<GroupWithMembers, GroupServiceError> {
        if !length_between(&input.name, 1, 100) {
            return Err(GroupServiceError::ValidationError(
                "Group name must be between 1 and 100 characters".to_string(),
            ));
        }
        let owned = self
            .groups
            .count_owned(owner_id)
            .await
            .context("Failed to count owned groups")?;
        if owned >= MAX_GROUPS_PER_USER {
            return Err(GroupServiceError::ValidationError(format!(
                "You can own at most {} groups",
                MAX_GROUPS_PER_USER
            )));
        }

        let now = Utc::now();
        let draft = Group {
            id: 0,
            name: input.name.trim().to_string(),
            description: input
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            is_private: input.is_private,
            owner_id,
            avatar: None,
            created_at: now,
            updated_at: now,
        };
        let group = self.groups.create(&draft).await.context("Failed to create group")?;
        self.groups
            .add_member(group.id, owner_id, GroupRole::Owner)
            .await
            .context("Failed to add group owner")?;

        self.with_members(group).await
    }

    pub async fn join(&self, user_id: i64, group_id: i64) -> Result<(), GroupServiceError> {
        let group = self.find(group_id).await?;
        if group.is_private {
            return Err(GroupServiceError::Forbidden(
                "This group is private".to_string(),
            ));
        }
        if self.is_member(group_id, user_id).await? {
            return Err(GroupServiceError::Conflict(
                "You are already a member of this group".to_string(),
            ));
        }
        let members = self
            .groups
            .count_members(group_id)
            .await
            .context("Failed to count members")?;
        if members >= MAX_MEMBERS_PER_GROUP {
            return Err(GroupServiceError::Conflict("This group is full".to_string()));
        }

        self.groups
            .add_member(group_id, user_id, GroupRole::Member)
            .await
            .context("Failed to join group")?;
        Ok(())
    }

    pub async fn leave(&self, user_id: i64, group_id: i64) -> Result<(), GroupServiceError> {
        let group = self.find(group_id).await?;
        if group.owner_id == user_id {
            return Err(GroupServiceError::ValidationError(
                "The owner cannot leave the group".to_string(),
            ));
        }
        let removed = self
            .groups
            .remove_member(group_id, user_id)
            .await
            .context("Failed to leave group")?;
        if !removed {
            return Err(GroupServiceError::ValidationError(
                "You are not a member of this group".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<GroupWithMembers>, GroupServiceError> {
        let groups = self
            .groups
            .list_for_user(user_id)
            .await
            .context("Failed to list groups")?;
        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            out.push(self.with_members(group).await?);
        }
        Ok(out)
    }

    /// Latest public groups the user has not joined
    pub async fn suggested(&self, user_id: i64) -> Result<Vec<Group>, GroupServiceError> {
        Ok(self
            .groups
            .list_recent(SUGGESTED_GROUPS, Some(user_id))
            .await
            .context("Failed to list suggested groups")?)
    }

    pub async fn get(&self, group_id: i64) -> Result<GroupWithMembers, GroupServiceError> {
        let group = self.find(group_id).await?;
        self.with_members(group).await
    }

    async fn find(&self, group_id: i64) -> Result<Group, GroupServiceError> {
        self.groups
            .get_by_id(group_id)
            .await
            .context("Failed to get group")?
            .ok_or(GroupServiceError::NotFound)
    }

    async fn is_member(&self, group_id: i64, user_id: i64) -> Result<bool, GroupServiceError> {
        Ok(self
            .groups
            .is_member(group_id, user_id)
            .await
            .context("Failed to check membership")?)
    }

    async fn with_members(&self, group: Group) -> Result<GroupWithMembers, GroupServiceError> {
        let members = self
            .groups
            .list_members(group.id)
            .await
            .context("Failed to list members")?;
        let ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();
        let users: HashMap<i64, User> = self
            .users
            .get_many(&ids)
            .await
            .context("Failed to load members")?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let members = members
            .into_iter()
            .filter_map(|m| {
                users.get(&m.user_id).map(|u| GroupMemberView {
                    user: u.summary(),
                    role: m.role,
                    joined_at: m.joined_at,
                })
            })
            .collect();
        Ok(GroupWithMembers { group, members })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::test_user;
    use crate::db::repositories::Repositories;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (GroupService, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let repos = Repositories::new(pool);
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        (GroupService::new(repos.groups.clone(), repos.users.clone()), ada.id, bob.id)
    }

    fn input(name: &str, is_private: bool) -> CreateGroupInput {
        CreateGroupInput {
            name: name.to_string(),
            description: Some("  ".to_string()),
            is_private,
        }
    }

    #[tokio::test]
    async fn test_create_enrols_owner() {
        let (service, ada, _) = setup().await;
        let created = service.create(ada, input("Rustaceans", false)).await.unwrap();
        assert!(created.group.description.is_none());
        assert_eq!(created.members.len(), 1);
        assert_eq!(created.members[0].user.id, ada);
        assert_eq!(created.members[0].role, GroupRole::Owner);

        assert!(matches!(
            service.create(ada, input("  ", false)).await,
            Err(GroupServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_join_rules() {
        let (service, ada, bob) = setup().await;
        let open = service.create(ada, input("Open", false)).await.unwrap().group;
        let closed = service.create(ada, input("Closed", true)).await.unwrap().group;

        service.join(bob, open.id).await.unwrap();
        assert!(matches!(service.join(bob, open.id).await, Err(GroupServiceError::Conflict(_))));
        assert!(matches!(service.join(bob, closed.id).await, Err(GroupServiceError::Forbidden(_))));
        assert!(matches!(service.join(bob, 999).await, Err(GroupServiceError::NotFound)));

        let group = service.get(open.id).await.unwrap();
        assert_eq!(group.members.len(), 2);
        assert_eq!(service.list_for_user(bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_leave_rules() {
        let (service, ada, bob) = setup().await;
        let group = service.create(ada, input("Open", false)).await.unwrap().group;
        assert!(matches!(
            service.leave(ada, group.id).await,
            Err(GroupServiceError::ValidationError(_))
        ));
        service.join(bob, group.id).await.unwrap();
        service.leave(bob, group.id).await.unwrap();
        assert!(service.list_for_user(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suggested_excludes_joined_and_private() {
        let (service, ada, bob) = setup().await;
        let joined = service.create(ada, input("Joined", false)).await.unwrap().group;
        service.create(ada, input("Hidden", true)).await.unwrap();
        let other = service.create(ada, input("Other", false)).await.unwrap().group;
        service.join(bob, joined.id).await.unwrap();

        let suggested = service.suggested(bob).await.unwrap();
        let ids: Vec<_> = suggested.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![other.id]);
    }

    #[tokio::test]
    async fn test_owned_group_limit() {
        let (service, ada, _) = setup().await;
        for i in 0..MAX_GROUPS_PER_USER {
            service.create(ada, input(&format!("G{}", i), false)).await.unwrap();
        }
        assert!(matches!(
            service.create(ada, input("Overflow", false)).await,
            Err(GroupServiceError::ValidationError(_))
        ));
    }
}
