//! Group repository
//!
//! Groups live in `user_groups` (`groups` is reserved in MySQL) with
//! memberships in `group_members`.

use crate::db::{on_pool, DynDatabasePool, LastInsertId};
use crate::models::{Group, GroupMember, GroupRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Insert a group (id and timestamps are assigned here)
    async fn create(&self, group: &Group) -> Result<Group>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Group>>;

    async fn add_member(&self, group_id: i64, user_id: i64, role: GroupRole) -> Result<GroupMember>;

    /// Returns false when the user was not a member
    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<bool>;

    async fn is_member(&self, group_id: i64, user_id: i64) -> Result<bool>;

    /// Groups the user belongs to, most recently joined first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Group>>;

    /// Members in join order
    async fn list_members(&self, group_id: i64) -> Result<Vec<GroupMember>>;

    async fn count_members(&self, group_id: i64) -> Result<i64>;

    /// Groups owned by a user
    async fn count_owned(&self, user_id: i64) -> Result<i64>;

    /// Newest public groups, optionally skipping those `excluding_member` belongs to
    async fn list_recent(&self, limit: i64, excluding_member: Option<i64>) -> Result<Vec<Group>>;
}

pub struct SqlxGroupRepository {
    pool: DynDatabasePool,
}

impl SqlxGroupRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn GroupRepository> {
        Arc::new(Self::new(pool))
    }
}

const GROUP_COLUMNS: &str =
    "g.id, g.name, g.description, g.is_private, g.owner_id, g.avatar, g.created_at, g.updated_at";

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: i64,
    name: String,
    description: Option<String>,
    is_private: bool,
    owner_id: i64,
    avatar: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<GroupRow> for Group {
    fn from(row: GroupRow) -> Self {
        Group {
            id: row.id,
            name: row.name,
            description: row.description,
            is_private: row.is_private,
            owner_id: row.owner_id,
            avatar: row.avatar,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    group_id: i64,
    user_id: i64,
    role: String,
    joined_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for GroupMember {
    type Error = anyhow::Error;

    fn try_from(row: MemberRow) -> Result<Self> {
        Ok(GroupMember {
            group_id: row.group_id,
            user_id: row.user_id,
            role: GroupRole::from_str(&row.role)?,
            joined_at: row.joined_at,
        })
    }
}

#[async_trait]
impl GroupRepository for SqlxGroupRepository {
    async fn create(&self, group: &Group) -> Result<Group> {
        let now = Utc::now();
        let id = on_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO user_groups (name, description, is_private, owner_id, avatar, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&group.name)
            .bind(&group.description)
            .bind(group.is_private)
            .bind(group.owner_id)
            .bind(&group.avatar)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create group")?
            .insert_id()
        });
        Ok(Group {
            id,
            created_at: now,
            updated_at: now,
            ..group.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Group>> {
        let sql = format!("SELECT {} FROM user_groups g WHERE g.id = ?", GROUP_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, GroupRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get group")?
        });
        Ok(row.map(Group::from))
    }

    async fn add_member(&self, group_id: i64, user_id: i64, role: GroupRole) -> Result<GroupMember> {
        let now = Utc::now();
        on_pool!(self.pool, conn => {
            sqlx::query("INSERT INTO group_members (group_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)")
                .bind(group_id)
                .bind(user_id)
                .bind(role.to_string())
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to add group member")?;
        });
        Ok(GroupMember {
            group_id,
            user_id,
            role,
            joined_at: now,
        })
    }

    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        let removed = on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
                .bind(group_id)
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to remove group member")?
                .rows_affected()
        });
        Ok(removed > 0)
    }

    async fn is_member(&self, group_id: i64, user_id: i64) -> Result<bool> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM group_members WHERE group_id = ? AND user_id = ?")
                .bind(group_id)
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to check group membership")?
        });
        Ok(count > 0)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Group>> {
        let sql = format!(
            "SELECT {} FROM user_groups g JOIN group_members m ON m.group_id = g.id \
             WHERE m.user_id = ? ORDER BY m.joined_at DESC, g.id DESC",
            GROUP_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, GroupRow>(&sql)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to list user groups")?
        });
        Ok(rows.into_iter().map(Group::from).collect())
    }

    async fn list_members(&self, group_id: i64) -> Result<Vec<GroupMember>> {
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, MemberRow>(
                "SELECT group_id, user_id, role, joined_at FROM group_members \
                 WHERE group_id = ? ORDER BY joined_at ASC, user_id ASC",
            )
            .bind(group_id)
            .fetch_all(conn)
            .await
            .context("Failed to list group members")?
        });
        rows.into_iter().map(GroupMember::try_from).collect()
    }

    async fn count_members(&self, group_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM group_members WHERE group_id = ?")
                .bind(group_id)
                .fetch_one(conn)
                .await
                .context("Failed to count group members")?
        });
        Ok(count)
    }

    async fn count_owned(&self, user_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM user_groups WHERE owner_id = ?")
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to count owned groups")?
        });
        Ok(count)
    }

    async fn list_recent(&self, limit: i64, excluding_member: Option<i64>) -> Result<Vec<Group>> {
        let exclusion = if excluding_member.is_some() {
            "AND g.id NOT IN (SELECT group_id FROM group_members WHERE user_id = ?)"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM user_groups g WHERE g.is_private = ? {} \
             ORDER BY g.created_at DESC, g.id DESC LIMIT ?",
            GROUP_COLUMNS, exclusion
        );
        let rows = on_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, GroupRow>(&sql).bind(false);
            if let Some(user_id) = excluding_member {
                query = query.bind(user_id);
            }
            query
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to list recent groups")?
        });
        Ok(rows.into_iter().map(Group::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::{setup_test_repo, test_user};
    use crate::db::repositories::UserRepository;

    fn draft(owner_id: i64, name: &str, is_private: bool) -> Group {
        Group {
            id: 0,
            name: name.to_string(),
            description: None,
            is_private,
            owner_id,
            avatar: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn setup() -> (SqlxGroupRepository, i64, i64) {
        let (pool, users) = setup_test_repo().await;
        let a = users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let b = users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        (SqlxGroupRepository::new(pool), a.id, b.id)
    }

    #[tokio::test]
    async fn test_create_and_membership() {
        let (repo, ada, bob) = setup().await;
        let group = repo.create(&draft(ada, "Rustaceans", false)).await.expect("Failed to create group");
        repo.add_member(group.id, ada, GroupRole::Owner).await.unwrap();

        assert!(repo.is_member(group.id, ada).await.unwrap());
        assert!(!repo.is_member(group.id, bob).await.unwrap());

        repo.add_member(group.id, bob, GroupRole::Member).await.unwrap();
        let members = repo.list_members(group.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, GroupRole::Owner);
        assert_eq!(repo.count_members(group.id).await.unwrap(), 2);

        assert!(repo.add_member(group.id, bob, GroupRole::Member).await.is_err());

        assert!(repo.remove_member(group.id, bob).await.unwrap());
        assert!(!repo.remove_member(group.id, bob).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_for_user_and_owned() {
        let (repo, ada, bob) = setup().await;
        let g1 = repo.create(&draft(ada, "One", false)).await.unwrap();
        let g2 = repo.create(&draft(ada, "Two", false)).await.unwrap();
        repo.add_member(g1.id, ada, GroupRole::Owner).await.unwrap();
        repo.add_member(g2.id, ada, GroupRole::Owner).await.unwrap();
        repo.add_member(g2.id, bob, GroupRole::Member).await.unwrap();

        assert_eq!(repo.list_for_user(ada).await.unwrap().len(), 2);
        let bobs = repo.list_for_user(bob).await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].name, "Two");
        assert_eq!(repo.count_owned(ada).await.unwrap(), 2);
        assert_eq!(repo.count_owned(bob).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_recent_excludes_joined_and_private() {
        let (repo, ada, bob) = setup().await;
        let joined = repo.create(&draft(ada, "Joined", false)).await.unwrap();
        repo.create(&draft(ada, "Open", false)).await.unwrap();
        repo.create(&draft(ada, "Secret", true)).await.unwrap();
        repo.add_member(joined.id, bob, GroupRole::Member).await.unwrap();

        let all = repo.list_recent(10, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let suggested = repo.list_recent(10, Some(bob)).await.unwrap();
        assert_eq!(suggested.len(), 1);
        assert_eq!(suggested[0].name, "Open");
    }
}
