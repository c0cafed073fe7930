//! Friendship repository
//!
//! A friendship is a single directed row (`user_id` asked, `friend_id` was
//! asked). Lookups treat the pair as unordered.

use crate::db::{on_pool, DynDatabasePool, LastInsertId};
use crate::models::{Friendship, FriendshipStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait FriendshipRepository: Send + Sync {
    /// The row linking two users, whichever direction it was created in
    async fn find_between(&self, a: i64, b: i64) -> Result<Option<Friendship>>;

    async fn create(&self, user_id: i64, friend_id: i64, status: FriendshipStatus) -> Result<Friendship>;

    /// Persist the status (and orientation) of an existing row
    async fn update_status(&self, friendship: &Friendship) -> Result<Friendship>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Accepted friendships involving the user
    async fn list_accepted(&self, user_id: i64) -> Result<Vec<Friendship>>;

    /// Pending requests addressed to the user
    async fn list_incoming_pending(&self, user_id: i64) -> Result<Vec<Friendship>>;

    /// Ids of the user's accepted friends
    async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>>;

    async fn count_accepted(&self, user_id: i64) -> Result<i64>;
}

pub struct SqlxFriendshipRepository {
    pool: DynDatabasePool,
}

impl SqlxFriendshipRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FriendshipRepository> {
        Arc::new(Self::new(pool))
    }
}

const FRIENDSHIP_COLUMNS: &str = "id, user_id, friend_id, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct FriendshipRow {
    id: i64,
    user_id: i64,
    friend_id: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FriendshipRow> for Friendship {
    type Error = anyhow::Error;

    fn try_from(row: FriendshipRow) -> Result<Self> {
        Ok(Friendship {
            id: row.id,
            user_id: row.user_id,
            friend_id: row.friend_id,
            status: FriendshipStatus::from_str(&row.status)
                .with_context(|| format!("Invalid status on friendship {}", row.id))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_friendships(rows: Vec<FriendshipRow>) -> Result<Vec<Friendship>> {
    rows.into_iter().map(Friendship::try_from).collect()
}

#[async_trait]
impl FriendshipRepository for SqlxFriendshipRepository {
    async fn find_between(&self, a: i64, b: i64) -> Result<Option<Friendship>> {
        let sql = format!(
            "SELECT {} FROM friendships \
             WHERE (user_id = ? AND friend_id = ?) OR (user_id = ? AND friend_id = ?)",
            FRIENDSHIP_COLUMNS
        );
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, FriendshipRow>(&sql)
                .bind(a)
                .bind(b)
                .bind(b)
                .bind(a)
                .fetch_optional(conn)
                .await
                .context("Failed to look up friendship")?
        });
        row.map(Friendship::try_from).transpose()
    }

    async fn create(&self, user_id: i64, friend_id: i64, status: FriendshipStatus) -> Result<Friendship> {
        let now = Utc::now();
        let id = on_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO friendships (user_id, friend_id, status, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(friend_id)
            .bind(status.to_string())
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create friendship")?
            .insert_id()
        });
        Ok(Friendship {
            id,
            user_id,
            friend_id,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_status(&self, friendship: &Friendship) -> Result<Friendship> {
        let now = Utc::now();
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE friendships SET user_id = ?, friend_id = ?, status = ?, updated_at = ? WHERE id = ?")
                .bind(friendship.user_id)
                .bind(friendship.friend_id)
                .bind(friendship.status.to_string())
                .bind(now)
                .bind(friendship.id)
                .execute(conn)
                .await
                .context("Failed to update friendship")?;
        });
        Ok(Friendship {
            updated_at: now,
            ..friendship.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM friendships WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete friendship")?;
        });
        Ok(())
    }

    async fn list_accepted(&self, user_id: i64) -> Result<Vec<Friendship>> {
        let sql = format!(
            "SELECT {} FROM friendships WHERE (user_id = ? OR friend_id = ?) AND status = 'accepted' \
             ORDER BY updated_at DESC, id DESC",
            FRIENDSHIP_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, FriendshipRow>(&sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to list friends")?
        });
        into_friendships(rows)
    }

    async fn list_incoming_pending(&self, user_id: i64) -> Result<Vec<Friendship>> {
        let sql = format!(
            "SELECT {} FROM friendships WHERE friend_id = ? AND status = 'pending' \
             ORDER BY created_at DESC, id DESC",
            FRIENDSHIP_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, FriendshipRow>(&sql)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to list friend requests")?
        });
        into_friendships(rows)
    }

    async fn friend_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let ids = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT CASE WHEN user_id = ? THEN friend_id ELSE user_id END FROM friendships \
                 WHERE (user_id = ? OR friend_id = ?) AND status = 'accepted'",
            )
            .bind(user_id)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(conn)
            .await
            .context("Failed to list friend ids")?
        });
        Ok(ids)
    }

    async fn count_accepted(&self, user_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM friendships WHERE (user_id = ? OR friend_id = ?) AND status = 'accepted'",
            )
            .bind(user_id)
            .bind(user_id)
            .fetch_one(conn)
            .await
            .context("Failed to count friends")?
        });
        Ok(count)
    }
}
