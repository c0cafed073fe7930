//! Notification repository

use crate::db::{on_pool, page_offset, DynDatabasePool, LastInsertId};
use crate::models::{Notification, NotificationKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

/// Notification repository trait
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a notification (id and `created_at` are assigned here)
    async fn create(&self, notification: &Notification) -> Result<Notification>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Notification>>;

    /// A user's notifications, newest first, optionally of one kind
    async fn list(
        &self,
        user_id: i64,
        kind: Option<NotificationKind>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Notification>, i64)>;

    async fn count_unread(&self, user_id: i64) -> Result<i64>;

    /// Mark one notification read; false when it is not the user's
    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool>;

    /// Mark every unread notification read, returning how many changed
    async fn mark_all_read(&self, user_id: i64) -> Result<u64>;

    /// Delete one notification; false when it is not the user's
    async fn delete(&self, id: i64, user_id: i64) -> Result<bool>;

    /// Purge read notifications created before `cutoff`
    async fn delete_read_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Purge notifications whose `expires_at` has passed
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, kind, title, message, is_read, data, created_at, expires_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    user_id: i64,
    kind: String,
    title: String,
    message: String,
    is_read: bool,
    data: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            kind: NotificationKind::from_str(&row.kind)
                .with_context(|| format!("Invalid kind on notification {}", row.id))?,
            title: row.title,
            message: row.message,
            is_read: row.is_read,
            data: serde_json::from_str(&row.data).unwrap_or(serde_json::Value::Null),
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, notification: &Notification) -> Result<Notification> {
        let now = Utc::now();
        let data = serde_json::to_string(&notification.data)?;
        let sql = r#"
            INSERT INTO notifications (user_id, kind, title, message, is_read, data, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(notification.user_id)
                .bind(notification.kind.to_string())
                .bind(&notification.title)
                .bind(&notification.message)
                .bind(notification.is_read)
                .bind(&data)
                .bind(now)
                .bind(notification.expires_at)
                .execute(conn)
                .await
                .context("Failed to create notification")?
                .insert_id()
        });

        Ok(Notification {
            id,
            created_at: now,
            ..notification.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let sql = format!("SELECT {} FROM notifications WHERE id = ?", NOTIFICATION_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, NotificationRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get notification")?
        });
        row.map(Notification::try_from).transpose()
    }

    async fn list(
        &self,
        user_id: i64,
        kind: Option<NotificationKind>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Notification>, i64)> {
        let filter = if kind.is_some() {
            "WHERE user_id = ? AND kind = ?"
        } else {
            "WHERE user_id = ?"
        };
        let list_sql = format!(
            "SELECT {} FROM notifications {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            NOTIFICATION_COLUMNS, filter
        );
        let count_sql = format!("SELECT COUNT(*) FROM notifications {}", filter);
        let kind = kind.map(|k| k.to_string());
        let offset = page_offset(page, per_page);

        let (rows, total) = on_pool!(self.pool, conn => {
            let mut list = sqlx::query_as::<_, NotificationRow>(&list_sql).bind(user_id);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
            if let Some(kind) = &kind {
                list = list.bind(kind.clone());
                count = count.bind(kind.clone());
            }
            let rows = list
                .bind(per_page)
                .bind(offset)
                .fetch_all(conn)
                .await
                .context("Failed to list notifications")?;
            let total = count
                .fetch_one(conn)
                .await
                .context("Failed to count notifications")?;
            (rows, total)
        });

        let items = rows
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((items, total))
    }

    async fn count_unread(&self, user_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = ?")
                .bind(user_id)
                .bind(false)
                .fetch_one(conn)
                .await
                .context("Failed to count unread notifications")?
        });
        Ok(count)
    }

    async fn mark_read(&self, id: i64, user_id: i64) -> Result<bool> {
        let found = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .fetch_one(conn)
                .await
                .context("Failed to look up notification")?
        });
        if found == 0 {
            return Ok(false);
        }
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE notifications SET is_read = ? WHERE id = ? AND user_id = ?")
                .bind(true)
                .bind(id)
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to mark notification read")?;
        });
        Ok(true)
    }

    async fn mark_all_read(&self, user_id: i64) -> Result<u64> {
        let changed = on_pool!(self.pool, conn => {
            sqlx::query("UPDATE notifications SET is_read = ? WHERE user_id = ? AND is_read = ?")
                .bind(true)
                .bind(user_id)
                .bind(false)
                .execute(conn)
                .await
                .context("Failed to mark notifications read")?
                .rows_affected()
        });
        Ok(changed)
    }

    async fn delete(&self, id: i64, user_id: i64) -> Result<bool> {
        let removed = on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM notifications WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to delete notification")?
                .rows_affected()
        });
        Ok(removed > 0)
    }

    async fn delete_read_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let removed = on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM notifications WHERE is_read = ? AND created_at < ?")
                .bind(true)
                .bind(cutoff)
                .execute(conn)
                .await
                .context("Failed to purge old notifications")?
                .rows_affected()
        });
        Ok(removed)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at < ?")
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to purge expired notifications")?
                .rows_affected()
        });
        Ok(removed)
    }

    async fn count(&self) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM notifications")
                .fetch_one(conn)
                .await
                .context("Failed to count notifications")?
        });
        Ok(count)
    }
}
