//! Private message repository

use crate::db::{on_pool, DynDatabasePool, LastInsertId};
use crate::models::PrivateMessage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[async_trait]
pub trait PrivateMessageRepository: Send + Sync {
    async fn create(&self, sender_id: i64, receiver_id: i64, content: &str) -> Result<PrivateMessage>;

    /// Messages exchanged between two users in either direction, oldest first
    async fn conversation(&self, a: i64, b: i64) -> Result<Vec<PrivateMessage>>;

    /// Mark everything `from` sent to `to` as read; returns rows changed
    async fn mark_read(&self, from: i64, to: i64) -> Result<u64>;

    /// Latest message per conversation partner, newest conversation first
    async fn partners(&self, user_id: i64) -> Result<Vec<(i64, PrivateMessage)>>;

    /// Unread incoming messages grouped by sender
    async fn unread_by_sender(&self, user_id: i64) -> Result<HashMap<i64, i64>>;

    async fn count_unread(&self, user_id: i64) -> Result<i64>;
}

pub struct SqlxPrivateMessageRepository {
    pool: DynDatabasePool,
}

impl SqlxPrivateMessageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PrivateMessageRepository> {
        Arc::new(Self::new(pool))
    }
}

const PM_COLUMNS: &str = "id, sender_id, receiver_id, content, is_read, sent_at, read_at";

#[derive(sqlx::FromRow)]
struct PrivateMessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    content: String,
    is_read: bool,
    sent_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl From<PrivateMessageRow> for PrivateMessage {
    fn from(row: PrivateMessageRow) -> Self {
        PrivateMessage {
            id: row.id,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            is_read: row.is_read,
            sent_at: row.sent_at,
            read_at: row.read_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UnreadRow {
    sender_id: i64,
    unread: i64,
}

#[async_trait]
impl PrivateMessageRepository for SqlxPrivateMessageRepository {
    async fn create(&self, sender_id: i64, receiver_id: i64, content: &str) -> Result<PrivateMessage> {
        let now = Utc::now();
        let id = on_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO private_messages (sender_id, receiver_id, content, is_read, sent_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(sender_id)
            .bind(receiver_id)
            .bind(content)
            .bind(false)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to store private message")?
            .insert_id()
        });
        Ok(PrivateMessage {
            id,
            sender_id,
            receiver_id,
            content: content.to_string(),
            is_read: false,
            sent_at: now,
            read_at: None,
        })
    }

    async fn conversation(&self, a: i64, b: i64) -> Result<Vec<PrivateMessage>> {
        let sql = format!(
            "SELECT {} FROM private_messages \
             WHERE (sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?) \
             ORDER BY sent_at ASC, id ASC",
            PM_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, PrivateMessageRow>(&sql)
                .bind(a)
                .bind(b)
                .bind(b)
                .bind(a)
                .fetch_all(conn)
                .await
                .context("Failed to load conversation")?
        });
        Ok(rows.into_iter().map(PrivateMessage::from).collect())
    }

    async fn mark_read(&self, from: i64, to: i64) -> Result<u64> {
        let changed = on_pool!(self.pool, conn => {
            sqlx::query(
                "UPDATE private_messages SET is_read = ?, read_at = ? \
                 WHERE sender_id = ? AND receiver_id = ? AND is_read = ?",
            )
            .bind(true)
            .bind(Utc::now())
            .bind(from)
            .bind(to)
            .bind(false)
            .execute(conn)
            .await
            .context("Failed to mark private messages read")?
            .rows_affected()
        });
        Ok(changed)
    }

    async fn partners(&self, user_id: i64) -> Result<Vec<(i64, PrivateMessage)>> {
        let sql = format!(
            "SELECT {} FROM private_messages WHERE sender_id = ? OR receiver_id = ? \
             ORDER BY sent_at DESC, id DESC",
            PM_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, PrivateMessageRow>(&sql)
                .bind(user_id)
                .bind(user_id)
                .fetch_all(conn)
                .await
                .context("Failed to list conversations")?
        });

        let mut seen = HashSet::new();
        let latest = rows
            .into_iter()
            .map(PrivateMessage::from)
            .filter_map(|m| {
                let partner = if m.sender_id == user_id { m.receiver_id } else { m.sender_id };
                seen.insert(partner).then_some((partner, m))
            })
            .collect();
        Ok(latest)
    }

    async fn unread_by_sender(&self, user_id: i64) -> Result<HashMap<i64, i64>> {
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UnreadRow>(
                "SELECT sender_id, COUNT(*) AS unread FROM private_messages \
                 WHERE receiver_id = ? AND is_read = ? GROUP BY sender_id",
            )
            .bind(user_id)
            .bind(false)
            .fetch_all(conn)
            .await
            .context("Failed to count unread private messages")?
        });
        Ok(rows.into_iter().map(|r| (r.sender_id, r.unread)).collect())
    }

    async fn count_unread(&self, user_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM private_messages WHERE receiver_id = ? AND is_read = ?",
            )
            .bind(user_id)
            .bind(false)
            .fetch_one(conn)
            .await
            .context("Failed to count unread private messages")?
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::{setup_test_repo, test_user};
    use crate::db::repositories::UserRepository;

    async fn setup() -> (SqlxPrivateMessageRepository, i64, i64, i64) {
        let (pool, users) = setup_test_repo().await;
        let a = users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let b = users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        let c = users.create(&test_user("Cy", "Clone", "cy@example.com")).await.unwrap();
        (SqlxPrivateMessageRepository::new(pool), a.id, b.id, c.id)
    }

    #[tokio::test]
    async fn test_conversation_both_directions() {
        let (repo, a, b, c) = setup().await;
        repo.create(a, b, "hi bob").await.expect("Failed to send");
        repo.create(b, a, "hi ada").await.unwrap();
        repo.create(c, a, "unrelated").await.unwrap();

        let convo = repo.conversation(a, b).await.unwrap();
        assert_eq!(convo.len(), 2);
        assert_eq!(convo[0].content, "hi bob");
        assert_eq!(convo[1].content, "hi ada");
        assert_eq!(repo.conversation(b, a).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_and_unread_counts() {
        let (repo, a, b, c) = setup().await;
        repo.create(b, a, "one").await.unwrap();
        repo.create(b, a, "two").await.unwrap();
        repo.create(c, a, "three").await.unwrap();

        assert_eq!(repo.count_unread(a).await.unwrap(), 3);
        let by_sender = repo.unread_by_sender(a).await.unwrap();
        assert_eq!(by_sender.get(&b), Some(&2));

        assert_eq!(repo.mark_read(b, a).await.unwrap(), 2);
        assert_eq!(repo.count_unread(a).await.unwrap(), 1);
        let convo = repo.conversation(a, b).await.unwrap();
        assert!(convo.iter().all(|m| m.is_read && m.read_at.is_some()));
    }

    #[tokio::test]
    async fn test_partners_latest_first() {
        let (repo, a, b, c) = setup().await;
        repo.create(a, b, "old").await.unwrap();
        repo.create(c, a, "from cy").await.unwrap();
        repo.create(b, a, "newest").await.unwrap();

        let partners = repo.partners(a).await.unwrap();
        assert_eq!(partners.len(), 2);
        assert_eq!(partners[0].0, b);
        assert_eq!(partners[0].1.content, "newest");
        assert_eq!(partners[1].0, c);
    }
}
