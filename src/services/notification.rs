//! Notification service
//!
//! Notifications are written inline by the service that caused them. Callers
//! that treat a notification as a side effect use [`NotificationService::notify`],
//! which logs failures instead of returning them.

use crate::db::repositories::{NotificationRepository, UserRepository};
use crate::models::{
    Notification, NotificationKind, NotificationPreferences, PageRequest, Paginated,
};
use crate::services::text::truncate_text;
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Longest notification body kept before truncation
pub const MAX_NOTIFICATION_MESSAGE: usize = 100;

/// Read notifications older than this are purged
const READ_RETENTION_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum NotificationServiceError {
    #[error("Notification not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A page of notifications plus the caller's unread total
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    #[serde(flatten)]
    pub page: Paginated<Notification>,
    pub unread_count: i64,
}

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { notifications, users }
    }

    /// Store a notification for `user_id`
    pub async fn create(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<Notification, NotificationServiceError> {
        let draft = Notification {
            id: 0,
            user_id,
            kind,
            title: title.to_string(),
            message: truncate_text(message, MAX_NOTIFICATION_MESSAGE),
            is_read: false,
            data,
            created_at: Utc::now(),
            expires_at: None,
        };
        let created = self
            .notifications
            .create(&draft)
            .await
            .context("Failed to create notification")?;
        Ok(created)
    }

    /// Like [`create`](Self::create) but never fails the caller
    pub async fn notify(&self, user_id: i64, kind: NotificationKind, title: &str, message: &str, data: Value) {
        if let Err(e) = self.create(user_id, kind, title, message, data).await {
            tracing::warn!("Failed to write {} notification for user {}: {}", kind, user_id, e);
        }
    }

    pub async fn list(
        &self,
        user_id: i64,
        kind: Option<NotificationKind>,
        request: PageRequest,
    ) -> Result<NotificationPage, NotificationServiceError> {
        let (items, total) = self
            .notifications
            .list(user_id, kind, request.page, request.limit)
            .await
            .context("Failed to list notifications")?;
        let unread_count = self.unread_count(user_id).await?;
        Ok(NotificationPage {
            page: Paginated::new(items, total, request),
            unread_count,
        })
    }

    /// Fetch one notification and mark it read
    pub async fn get(&self, user_id: i64, id: i64) -> Result<Notification, NotificationServiceError> {
        let mut notification = self
            .notifications
            .get_by_id(id)
            .await
            .context("Failed to get notification")?
            .filter(|n| n.user_id == user_id)
            .ok_or(NotificationServiceError::NotFound)?;

        if !notification.is_read {
            self.notifications
                .mark_read(id, user_id)
                .await
                .context("Failed to mark notification read")?;
            notification.is_read = true;
        }
        Ok(notification)
    }

    pub async fn mark_read(&self, user_id: i64, id: i64) -> Result<(), NotificationServiceError> {
        let found = self
            .notifications
            .mark_read(id, user_id)
            .await
            .context("Failed to mark notification read")?;
        if found {
            Ok(())
        } else {
            Err(NotificationServiceError::NotFound)
        }
    }

    pub async fn mark_all_read(&self, user_id: i64) -> Result<u64, NotificationServiceError> {
        Ok(self
            .notifications
            .mark_all_read(user_id)
            .await
            .context("Failed to mark notifications read")?)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), NotificationServiceError> {
        let removed = self
            .notifications
            .delete(id, user_id)
            .await
            .context("Failed to delete notification")?;
        if removed {
            Ok(())
        } else {
            Err(NotificationServiceError::NotFound)
        }
    }

    pub async fn unread_count(&self, user_id: i64) -> Result<i64, NotificationServiceError> {
        Ok(self
            .notifications
            .count_unread(user_id)
            .await
            .context("Failed to count unread notifications")?)
    }

    /// Channel switches stored in the user's preferences blob
    pub async fn preferences(&self, user_id: i64) -> Result<NotificationPreferences, NotificationServiceError> {
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(NotificationServiceError::UserNotFound)?;
        Ok(NotificationPreferences {
            email_notifications: user.preferences.email_notifications,
            push_notifications: user.preferences.push_notifications,
            browser_notifications: user.preferences.browser_notifications,
        })
    }

    /// Change any of the three channel switches; `None` leaves one as is
    pub async fn update_preferences(
        &self,
        user_id: i64,
        email: Option<bool>,
        push: Option<bool>,
        browser: Option<bool>,
    ) -> Result<NotificationPreferences, NotificationServiceError> {
        let mut user = self
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(NotificationServiceError::UserNotFound)?;

        if let Some(v) = email {
            user.preferences.email_notifications = v;
        }
        if let Some(v) = push {
            user.preferences.push_notifications = v;
        }
        if let Some(v) = browser {
            user.preferences.browser_notifications = v;
        }
        let updated = self
            .users
            .update(&user)
            .await
            .context("Failed to save notification preferences")?;

        Ok(NotificationPreferences {
            email_notifications: updated.preferences.email_notifications,
            push_notifications: updated.preferences.push_notifications,
            browser_notifications: updated.preferences.browser_notifications,
        })
    }

    pub async fn send_test(&self, user_id: i64) -> Result<Notification, NotificationServiceError> {
        self.create(
            user_id,
            NotificationKind::System,
            "Test Notification",
            "This is a test notification to verify your settings.",
            json!({ "test": true }),
        )
        .await
    }

    /// Purge stale notifications, returning how many rows were removed
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, NotificationServiceError> {
        let old = self
            .notifications
            .delete_read_older_than(now - Duration::days(READ_RETENTION_DAYS))
            .await
            .context("Failed to purge old notifications")?;
        let expired = self
            .notifications
            .delete_expired(now)
            .await
            .context("Failed to purge expired notifications")?;
        Ok(old + expired)
    }
}
