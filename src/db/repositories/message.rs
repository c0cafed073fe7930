//! Message repository
//!
//! Database operations for feed messages and their replies.
//!
//! Deleted messages are kept as rows with `deleted = 1`; every read path
//! below filters them out.

use crate::db::{on_pool, page_offset, placeholders, DynDatabasePool, LastInsertId};
use crate::models::{Message, Visibility};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

/// Which top-level messages a feed query selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFilter {
    /// Public messages from anyone
    Public,
    /// Public and friends-only messages written by these authors
    Authors(Vec<i64>),
    /// Everything public, plus friends-only messages from `ids`
    Network { ids: Vec<i64> },
}

impl FeedFilter {
    /// SQL condition plus the ids it binds, in order
    fn condition(&self) -> (String, &[i64]) {
        match self {
            FeedFilter::Public => ("visibility = 'public'".to_string(), &[]),
            FeedFilter::Authors(ids) => (
                format!(
                    "user_id IN ({}) AND visibility <> 'private'",
                    placeholders(ids.len())
                ),
                ids.as_slice(),
            ),
            FeedFilter::Network { ids } => (
                format!(
                    "(visibility = 'public' OR (user_id IN ({}) AND visibility = 'friends'))",
                    placeholders(ids.len())
                ),
                ids.as_slice(),
            ),
        }
    }
}

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message (id and timestamps are assigned here)
    async fn create(&self, message: &Message) -> Result<Message>;

    /// Get a message by ID, including soft-deleted ones
    async fn get_by_id(&self, id: i64) -> Result<Option<Message>>;

    /// Mark a message deleted
    async fn soft_delete(&self, id: i64) -> Result<()>;

    /// Non-deleted replies to a message, oldest first
    async fn list_replies(&self, parent_id: i64) -> Result<Vec<Message>>;

    /// Top-level feed page, newest first
    async fn feed(&self, filter: &FeedFilter, page: i64, per_page: i64) -> Result<(Vec<Message>, i64)>;

    /// All non-deleted top-level messages regardless of visibility
    async fn list_top_level(&self, page: i64, per_page: i64) -> Result<(Vec<Message>, i64)>;

    /// Latest non-deleted messages written by a user
    async fn list_by_author(&self, user_id: i64, limit: i64) -> Result<Vec<Message>>;

    /// Count non-deleted messages written by a user
    async fn count_by_author(&self, user_id: i64) -> Result<i64>;

    /// Count all non-deleted messages
    async fn count(&self) -> Result<i64>;

    /// Latest non-deleted messages of any kind
    async fn list_recent(&self, limit: i64) -> Result<Vec<Message>>;

    /// Hashtag arrays of every non-deleted message
    async fn hashtag_sets(&self) -> Result<Vec<Vec<String>>>;
}

/// SQLx-based message repository implementation
pub struct SqlxMessageRepository {
    pool: DynDatabasePool,
}

impl SqlxMessageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MessageRepository> {
        Arc::new(Self::new(pool))
    }
}

const MESSAGE_COLUMNS: &str = "id, user_id, addressee_id, parent_id, content, deleted, is_private, \
    mentions, hashtags, visibility, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    user_id: i64,
    addressee_id: Option<i64>,
    parent_id: Option<i64>,
    content: String,
    deleted: bool,
    is_private: bool,
    mentions: String,
    hashtags: String,
    visibility: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id,
            user_id: row.user_id,
            addressee_id: row.addressee_id,
            parent_id: row.parent_id,
            content: row.content,
            deleted: row.deleted,
            is_private: row.is_private,
            mentions: parse_tags(&row.mentions)?,
            hashtags: parse_tags(&row.hashtags)?,
            visibility: Visibility::from_str(&row.visibility)
                .with_context(|| format!("Invalid visibility on message {}", row.id))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn parse_tags(raw: &str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).context("Failed to parse tag list")
}

fn into_messages(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

#[async_trait]
impl MessageRepository for SqlxMessageRepository {
    async fn create(&self, message: &Message) -> Result<Message> {
        let now = Utc::now();
        let mentions = serde_json::to_string(&message.mentions)?;
        let hashtags = serde_json::to_string(&message.hashtags)?;
        let sql = r#"
            INSERT INTO messages (user_id, addressee_id, parent_id, content, deleted, is_private,
                                  mentions, hashtags, visibility, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(message.user_id)
                .bind(message.addressee_id)
                .bind(message.parent_id)
                .bind(&message.content)
                .bind(false)
                .bind(message.is_private)
                .bind(&mentions)
                .bind(&hashtags)
                .bind(message.visibility.to_string())
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create message")?
                .insert_id()
        });

        Ok(Message {
            id,
            deleted: false,
            created_at: now,
            updated_at: now,
            ..message.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Message>> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get message")?
        });
        row.map(Message::try_from).transpose()
    }

    async fn soft_delete(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE messages SET deleted = ?, updated_at = ? WHERE id = ?")
                .bind(true)
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete message")?;
        });
        Ok(())
    }

    async fn list_replies(&self, parent_id: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE parent_id = ? AND deleted = 0 ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(parent_id)
                .fetch_all(conn)
                .await
                .context("Failed to list replies")?
        });
        into_messages(rows)
    }

    async fn feed(&self, filter: &FeedFilter, page: i64, per_page: i64) -> Result<(Vec<Message>, i64)> {
        let (condition, ids) = filter.condition();
        let base = format!("deleted = 0 AND is_private = 0 AND parent_id IS NULL AND {}", condition);
        let list_sql = format!(
            "SELECT {} FROM messages WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS, base
        );
        let count_sql = format!("SELECT COUNT(*) FROM messages WHERE {}", base);
        let offset = page_offset(page, per_page);

        let (rows, total) = on_pool!(self.pool, conn => {
            let mut list = sqlx::query_as::<_, MessageRow>(&list_sql);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            for id in ids {
                list = list.bind(*id);
                count = count.bind(*id);
            }
            let rows = list
                .bind(per_page)
                .bind(offset)
                .fetch_all(conn)
                .await
                .context("Failed to load feed")?;
            let total = count.fetch_one(conn).await.context("Failed to count feed")?;
            (rows, total)
        });

        Ok((into_messages(rows)?, total))
    }

    async fn list_top_level(&self, page: i64, per_page: i64) -> Result<(Vec<Message>, i64)> {
        let list_sql = format!(
            "SELECT {} FROM messages WHERE deleted = 0 AND parent_id IS NULL \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        );
        let count_sql = "SELECT COUNT(*) FROM messages WHERE deleted = 0 AND parent_id IS NULL";
        let offset = page_offset(page, per_page);

        let (rows, total) = on_pool!(self.pool, conn => {
            let rows = sqlx::query_as::<_, MessageRow>(&list_sql)
                .bind(per_page)
                .bind(offset)
                .fetch_all(conn)
                .await
                .context("Failed to list messages")?;
            let total = sqlx::query_scalar::<_, i64>(count_sql)
                .fetch_one(conn)
                .await
                .context("Failed to count messages")?;
            (rows, total)
        });

        Ok((into_messages(rows)?, total))
    }

    async fn list_by_author(&self, user_id: i64, limit: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE user_id = ? AND deleted = 0 \
             ORDER BY created_at DESC, id DESC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(user_id)
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to list messages by author")?
        });
        into_messages(rows)
    }

    async fn count_by_author(&self, user_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE user_id = ? AND deleted = 0")
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to count messages by author")?
        });
        Ok(count)
    }

    async fn count(&self) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE deleted = 0")
                .fetch_one(conn)
                .await
                .context("Failed to count messages")?
        });
        Ok(count)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE deleted = 0 ORDER BY created_at DESC, id DESC LIMIT ?",
            MESSAGE_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, MessageRow>(&sql)
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to list recent messages")?
        });
        into_messages(rows)
    }

    async fn hashtag_sets(&self) -> Result<Vec<Vec<String>>> {
        let raw = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, String>("SELECT hashtags FROM messages WHERE deleted = 0")
                .fetch_all(conn)
                .await
                .context("Failed to load hashtags")?
        });
        raw.iter().map(|r| parse_tags(r)).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::user::tests::{setup_test_repo, test_user};
    use crate::db::repositories::UserRepository;

    pub(crate) fn draft(user_id: i64, content: &str, visibility: Visibility) -> Message {
        let now = Utc::now();
        Message {
            id: 0,
            user_id,
            addressee_id: None,
            parent_id: None,
            content: content.to_string(),
            deleted: false,
            is_private: false,
            mentions: Vec::new(),
            hashtags: Vec::new(),
            visibility,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (SqlxMessageRepository, i64, i64) {
        let (pool, users) = setup_test_repo().await;
        let a = users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let b = users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        (SqlxMessageRepository::new(pool), a.id, b.id)
    }

    #[tokio::test]
    async fn test_create_and_get_message() {
        let (repo, ada, _) = setup().await;
        let mut msg = draft(ada, "hello #rust @bob", Visibility::Public);
        msg.hashtags = vec!["rust".to_string()];
        msg.mentions = vec!["bob".to_string()];

        let created = repo.create(&msg).await.expect("Failed to create message");
        let found = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get message")
            .expect("Message not found");

        assert_eq!(found.content, "hello #rust @bob");
        assert_eq!(found.hashtags, vec!["rust"]);
        assert_eq!(found.mentions, vec!["bob"]);
        assert!(found.is_top_level());
        assert!(!found.deleted);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_listings() {
        let (repo, ada, _) = setup().await;
        let kept = repo.create(&draft(ada, "kept", Visibility::Public)).await.unwrap();
        let gone = repo.create(&draft(ada, "gone", Visibility::Public)).await.unwrap();

        repo.soft_delete(gone.id).await.unwrap();

        let found = repo.get_by_id(gone.id).await.unwrap().unwrap();
        assert!(found.deleted);
        let (items, total) = repo.list_top_level(1, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, kept.id);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.count_by_author(ada).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replies_are_ordered_and_excluded_from_feed() {
        let (repo, ada, bob) = setup().await;
        let parent = repo.create(&draft(ada, "parent", Visibility::Public)).await.unwrap();
        for text in ["first", "second"] {
            let mut reply = draft(bob, text, Visibility::Public);
            reply.parent_id = Some(parent.id);
            repo.create(&reply).await.unwrap();
        }

        let replies = repo.list_replies(parent.id).await.unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].content, "first");

        let (items, total) = repo.feed(&FeedFilter::Public, 1, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, parent.id);
    }

    #[tokio::test]
    async fn test_feed_filters() {
        let (repo, ada, bob) = setup().await;
        repo.create(&draft(ada, "ada public", Visibility::Public)).await.unwrap();
        repo.create(&draft(ada, "ada friends", Visibility::Friends)).await.unwrap();
        repo.create(&draft(ada, "ada private", Visibility::Private)).await.unwrap();
        repo.create(&draft(bob, "bob public", Visibility::Public)).await.unwrap();
        repo.create(&draft(bob, "bob friends", Visibility::Friends)).await.unwrap();

        let (public, _) = repo.feed(&FeedFilter::Public, 1, 20).await.unwrap();
        let texts: Vec<_> = public.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["bob public", "ada public"]);

        let (by_ada, total) = repo.feed(&FeedFilter::Authors(vec![ada]), 1, 20).await.unwrap();
        assert_eq!(total, 2);
        assert!(by_ada.iter().all(|m| m.user_id == ada));

        let (network, total) = repo
            .feed(&FeedFilter::Network { ids: vec![ada] }, 1, 20)
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert!(network.iter().any(|m| m.content == "ada friends"));
        assert!(!network.iter().any(|m| m.content == "bob friends"));

        let (none, total) = repo.feed(&FeedFilter::Authors(vec![]), 1, 20).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_feed_pagination() {
        let (repo, ada, _) = setup().await;
        for i in 0..5 {
            repo.create(&draft(ada, &format!("m{}", i), Visibility::Public)).await.unwrap();
        }
        let (page2, total) = repo.feed(&FeedFilter::Public, 2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page2.len(), 2);
        assert_eq!(page2[0].content, "m2");
    }

    #[tokio::test]
    async fn test_hashtag_sets_and_recent() {
        let (repo, ada, _) = setup().await;
        let mut tagged = draft(ada, "#a #b", Visibility::Public);
        tagged.hashtags = vec!["a".to_string(), "b".to_string()];
        repo.create(&tagged).await.unwrap();
        let deleted = repo.create(&tagged).await.unwrap();
        repo.soft_delete(deleted.id).await.unwrap();
        repo.create(&draft(ada, "plain", Visibility::Public)).await.unwrap();

        let sets = repo.hashtag_sets().await.unwrap();
        assert_eq!(sets.len(), 2);
        assert!(sets.contains(&vec!["a".to_string(), "b".to_string()]));

        assert_eq!(repo.list_recent(1).await.unwrap()[0].content, "plain");
        assert_eq!(repo.list_by_author(ada, 10).await.unwrap().len(), 2);
    }
}
