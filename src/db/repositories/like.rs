//! Like repository
//!
//! One row per (user, message) pair; the `like_type` column says whether it
//! is a like or a dislike.

use crate::db::{on_pool, placeholders, DynDatabasePool, LastInsertId};
use crate::models::{Like, LikeType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// The reaction a user left on a message, if any
    async fn get(&self, user_id: i64, message_id: i64) -> Result<Option<Like>>;

    async fn create(&self, user_id: i64, message_id: i64, like_type: LikeType) -> Result<Like>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// `(likes, dislikes)` for one message
    async fn counts(&self, message_id: i64) -> Result<(i64, i64)>;

    /// `(likes, dislikes)` keyed by message id; messages without reactions are absent
    async fn counts_for(&self, message_ids: &[i64]) -> Result<HashMap<i64, (i64, i64)>>;
}

pub struct SqlxLikeRepository {
    pool: DynDatabasePool,
}

impl SqlxLikeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct LikeRow {
    id: i64,
    user_id: i64,
    message_id: i64,
    like_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LikeRow> for Like {
    type Error = anyhow::Error;

    fn try_from(row: LikeRow) -> Result<Self> {
        Ok(Like {
            id: row.id,
            user_id: row.user_id,
            message_id: row.message_id,
            like_type: LikeType::from_str(&row.like_type)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CountRow {
    message_id: i64,
    likes: i64,
    dislikes: i64,
}

const COUNT_COLUMNS: &str = "message_id, \
    COUNT(CASE WHEN like_type = 'like' THEN 1 END) AS likes, \
    COUNT(CASE WHEN like_type = 'dislike' THEN 1 END) AS dislikes";

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn get(&self, user_id: i64, message_id: i64) -> Result<Option<Like>> {
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, LikeRow>(
                "SELECT id, user_id, message_id, like_type, created_at FROM likes \
                 WHERE user_id = ? AND message_id = ?",
            )
            .bind(user_id)
            .bind(message_id)
            .fetch_optional(conn)
            .await
            .context("Failed to get like")?
        });
        row.map(Like::try_from).transpose()
    }

    async fn create(&self, user_id: i64, message_id: i64, like_type: LikeType) -> Result<Like> {
        let now = Utc::now();
        let id = on_pool!(self.pool, conn => {
            sqlx::query("INSERT INTO likes (user_id, message_id, like_type, created_at) VALUES (?, ?, ?, ?)")
                .bind(user_id)
                .bind(message_id)
                .bind(like_type.to_string())
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create like")?
                .insert_id()
        });
        Ok(Like {
            id,
            user_id,
            message_id,
            like_type,
            created_at: now,
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM likes WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete like")?;
        });
        Ok(())
    }

    async fn counts(&self, message_id: i64) -> Result<(i64, i64)> {
        let counts = self.counts_for(&[message_id]).await?;
        Ok(counts.get(&message_id).copied().unwrap_or((0, 0)))
    }

    async fn counts_for(&self, message_ids: &[i64]) -> Result<HashMap<i64, (i64, i64)>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT {} FROM likes WHERE message_id IN ({}) GROUP BY message_id",
            COUNT_COLUMNS,
            placeholders(message_ids.len())
        );
        let rows = on_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, CountRow>(&sql);
            for id in message_ids {
                query = query.bind(*id);
            }
            query.fetch_all(conn).await.context("Failed to count likes")?
        });
        Ok(rows
            .into_iter()
            .map(|r| (r.message_id, (r.likes, r.dislikes)))
            .collect())
    }
}
