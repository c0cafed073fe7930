//! Admin dashboard, user management and moderation of messages and apps

use crate::db::repositories::Repositories;
use crate::models::{App, MessageView, PageRequest, Paginated, User, UserRole};
use crate::services::app::AppServiceError;
use crate::services::message::{MessageService, MessageServiceError};
use crate::services::user::UserServiceError;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::process;
use std::sync::Arc;
use sysinfo::{Pid, System};

/// How many recent users/messages the dashboard lists
const DASHBOARD_RECENT: i64 = 10;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_users: i64,
    pub total_messages: i64,
    pub total_apps: i64,
    pub total_notifications: i64,
    pub recent_users: Vec<User>,
    pub recent_messages: Vec<MessageView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDetails {
    pub user: User,
    pub message_count: i64,
    pub friend_count: i64,
    pub app_count: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUpdateUserInput {
    pub is_active: Option<bool>,
    pub role: Option<UserRole>,
}

/// Request counters gathered by the HTTP layer
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestMetrics {
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub version: String,
    /// Process memory usage in bytes
    pub memory_bytes: u64,
    pub memory_formatted: String,
    pub system_total_memory: u64,
    pub system_used_memory: u64,
    pub os_name: String,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub total_requests: u64,
    pub avg_response_time_ms: f64,
}

pub struct AdminService {
    repos: Repositories,
    messages: Arc<MessageService>,
}

impl AdminService {
    pub fn new(repos: Repositories, messages: Arc<MessageService>) -> Self {
        Self { repos, messages }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, UserServiceError> {
        let total_users = self.repos.users.count().await.context("Failed to count users")?;
        let active_users = self
            .repos
            .users
            .count_active()
            .await
            .context("Failed to count active users")?;
        let total_messages = self.repos.messages.count().await.context("Failed to count messages")?;
        let total_apps = self.repos.apps.count().await.context("Failed to count apps")?;
        let total_notifications = self
            .repos
            .notifications
            .count()
            .await
            .context("Failed to count notifications")?;

        let recent_users = self
            .repos
            .users
            .list_recent(DASHBOARD_RECENT)
            .await
            .context("Failed to list recent users")?;
        let recent = self
            .repos
            .messages
            .list_recent(DASHBOARD_RECENT)
            .await
            .context("Failed to list recent messages")?;
        let recent_messages = self
            .messages
            .to_views(recent)
            .await
            .map_err(|e| UserServiceError::InternalError(e.into()))?;

        Ok(DashboardStats {
            total_users,
            active_users,
            total_messages,
            total_apps,
            total_notifications,
            recent_users,
            recent_messages,
        })
    }

    pub async fn list_users(&self, search: Option<&str>, request: PageRequest) -> Result<Paginated<User>, UserServiceError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        let (users, total) = self
            .repos
            .users
            .search(search, request.page, request.limit)
            .await
            .context("Failed to search users")?;
        Ok(Paginated::new(users, total, request))
    }

    pub async fn user_details(&self, user_id: i64) -> Result<UserDetails, UserServiceError> {
        let user = self.require(user_id).await?;
        let message_count = self
            .repos
            .messages
            .count_by_author(user_id)
            .await
            .context("Failed to count messages")?;
        let friend_count = self
            .repos
            .friendships
            .count_accepted(user_id)
            .await
            .context("Failed to count friends")?;
        let app_count = self
            .repos
            .apps
            .count_by_owner(user_id)
            .await
            .context("Failed to count apps")?;
        Ok(UserDetails {
            user,
            message_count,
            friend_count,
            app_count,
        })
    }

    /// Toggle activation or change role. Deactivation ends every session of the user.
    pub async fn update_user(
        &self,
        actor_id: i64,
        user_id: i64,
        input: AdminUpdateUserInput,
    ) -> Result<User, UserServiceError> {
        if actor_id == user_id && (input.is_active == Some(false) || input.role.is_some_and(|r| r != UserRole::Admin)) {
            return Err(UserServiceError::ValidationError(
                "You cannot deactivate or demote your own account".to_string(),
            ));
        }

        let mut user = self.require(user_id).await?;
        let deactivating = user.is_active && input.is_active == Some(false);
        if let Some(active) = input.is_active {
            user.is_active = active;
        }
        if let Some(role) = input.role {
            user.role = role;
        }
        let user = self.repos.users.update(&user).await.context("Failed to update user")?;

        if deactivating {
            self.repos
                .sessions
                .delete_by_user(user_id)
                .await
                .context("Failed to end sessions")?;
            tracing::info!("User {} deactivated by admin {}", user_id, actor_id);
        }
        Ok(user)
    }

    /// Remove an account together with everything it owns
    pub async fn delete_user(&self, actor_id: i64, user_id: i64) -> Result<(), UserServiceError> {
        if actor_id == user_id {
            return Err(UserServiceError::ValidationError(
                "You cannot delete your own account".to_string(),
            ));
        }
        self.require(user_id).await?;
        self.repos
            .sessions
            .delete_by_user(user_id)
            .await
            .context("Failed to end sessions")?;
        self.repos.users.delete(user_id).await.context("Failed to delete user")?;
        tracing::info!("User {} deleted by admin {}", user_id, actor_id);
        Ok(())
    }

    /// All live top-level messages, private and friends-only included
    pub async fn list_messages(&self, request: PageRequest) -> Result<Paginated<MessageView>, MessageServiceError> {
        self.messages.list_all(request).await
    }

    pub async fn delete_message(&self, actor_id: i64, message_id: i64) -> Result<(), MessageServiceError> {
        let message = self
            .repos
            .messages
            .get_by_id(message_id)
            .await
            .context("Failed to get message")?
            .filter(|m| !m.deleted)
            .ok_or(MessageServiceError::NotFound("Message"))?;
        self.repos
            .messages
            .soft_delete(message.id)
            .await
            .context("Failed to delete message")?;
        tracing::info!("Message {} removed by admin {}", message.id, actor_id);
        Ok(())
    }

    pub async fn list_apps(&self, request: PageRequest) -> Result<Paginated<App>, AppServiceError> {
        let (apps, total) = self
            .repos
            .apps
            .list(request.page, request.limit)
            .await
            .context("Failed to list apps")?;
        Ok(Paginated::new(apps, total, request))
    }

    /// Flip the active flag. A disabled app fails authentication.
    pub async fn toggle_app(&self, app_id: i64) -> Result<App, AppServiceError> {
        let mut app = self.require_app(app_id).await?;
        app.is_active = !app.is_active;
        let app = self.repos.apps.update(&app).await.context("Failed to update app")?;
        tracing::info!(
            "App {} {} by admin",
            app.id,
            if app.is_active { "enabled" } else { "disabled" }
        );
        Ok(app)
    }

    pub async fn delete_app(&self, app_id: i64) -> Result<(), AppServiceError> {
        let app = self.require_app(app_id).await?;
        self.repos.apps.delete(app.id).await.context("Failed to delete app")?;
        Ok(())
    }

    /// Process and host figures plus the request counters passed in
    pub fn system_stats(&self, metrics: RequestMetrics) -> SystemStats {
        let mut sys = System::new_all();
        sys.refresh_all();

        let memory_bytes = sys
            .process(Pid::from_u32(process::id()))
            .map(|p| p.memory())
            .unwrap_or(0);

        SystemStats {
            version: APP_VERSION.to_string(),
            memory_bytes,
            memory_formatted: format_bytes(memory_bytes),
            system_total_memory: sys.total_memory(),
            system_used_memory: sys.used_memory(),
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            uptime_seconds: metrics.uptime_seconds,
            uptime_formatted: format_uptime(metrics.uptime_seconds),
            total_requests: metrics.total_requests,
            avg_response_time_ms: metrics.avg_response_time_ms,
        }
    }

    async fn require_app(&self, app_id: i64) -> Result<App, AppServiceError> {
        self.repos
            .apps
            .get_by_id(app_id)
            .await
            .context("Failed to get app")?
            .ok_or(AppServiceError::NotFound)
    }

    async fn require(&self, user_id: i64) -> Result<User, UserServiceError> {
        self.repos
            .users
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound)
    }
}

/// Format uptime to human readable string
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateMessageInput, FriendshipStatus, Session, Visibility};
    use crate::services::app::{AppService, CreateAppInput};
    use crate::services::message::tests::setup as setup_messages;
    use crate::db::repositories::user::tests::test_user;

    async fn setup() -> (Repositories, Arc<MessageService>, AdminService) {
        let (repos, _, messages) = setup_messages().await;
        let messages = Arc::new(messages);
        let admin = AdminService::new(repos.clone(), messages.clone());
        (repos, messages, admin)
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(3 * 3600 + 120), "3h 2m");
        assert_eq!(format_uptime(2 * 86400 + 3600), "2d 1h 0m");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(45 * 1024 * 1024), "45.0 MB");
    }

    #[tokio::test]
    async fn test_dashboard_counts() {
        let (repos, messages, admin) = setup().await;
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let mut bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        bob.is_active = false;
        repos.users.update(&bob).await.unwrap();

        let first = messages.create(&ada, CreateMessageInput::new("one")).await.unwrap();
        messages.create(&ada, CreateMessageInput::new("two")).await.unwrap();
        messages.delete(&ada, first.id).await.unwrap();

        let stats = admin.dashboard().await.unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.recent_users.len(), 2);
        assert_eq!(stats.recent_messages.len(), 1);
        assert_eq!(stats.recent_messages[0].content, "two");
    }

    #[tokio::test]
    async fn test_user_details_and_search() {
        let (repos, messages, admin) = setup().await;
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        repos.friendships.create(ada.id, bob.id, FriendshipStatus::Accepted).await.unwrap();
        messages.create(&ada, CreateMessageInput::new("hello")).await.unwrap();

        let details = admin.user_details(ada.id).await.unwrap();
        assert_eq!(details.message_count, 1);
        assert_eq!(details.friend_count, 1);
        assert_eq!(details.app_count, 0);
        assert!(matches!(admin.user_details(999).await, Err(UserServiceError::NotFound)));

        let found = admin.list_users(Some("build"), PageRequest::default()).await.unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].id, bob.id);
        let all = admin.list_users(Some("  "), PageRequest::default()).await.unwrap();
        assert_eq!(all.total, 2);
    }

    #[tokio::test]
    async fn test_deactivation_ends_sessions() {
        let (repos, _, admin) = setup().await;
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        let session = repos.sessions.create(&Session::issue(bob.id, 7)).await.unwrap();

        let updated = admin
            .update_user(
                ada.id,
                bob.id,
                AdminUpdateUserInput {
                    is_active: Some(false),
                    role: Some(UserRole::Moderator),
                },
            )
            .await
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.role, UserRole::Moderator);
        assert!(repos.sessions.get_by_id(&session.id).await.unwrap().is_none());

        assert!(matches!(
            admin
                .update_user(ada.id, ada.id, AdminUpdateUserInput { is_active: Some(false), role: None })
                .await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_user_refuses_self_and_cascades() {
        let (repos, messages, admin) = setup().await;
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        let session = repos.sessions.create(&Session::issue(bob.id, 7)).await.unwrap();
        messages.create(&bob, CreateMessageInput::new("bye")).await.unwrap();

        assert!(matches!(
            admin.delete_user(ada.id, ada.id).await,
            Err(UserServiceError::ValidationError(_))
        ));
        assert!(matches!(admin.delete_user(ada.id, 999).await, Err(UserServiceError::NotFound)));

        admin.delete_user(ada.id, bob.id).await.unwrap();
        assert!(repos.users.get_by_id(bob.id).await.unwrap().is_none());
        assert!(repos.sessions.get_by_id(&session.id).await.unwrap().is_none());
        assert_eq!(repos.messages.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_message_moderation() {
        let (repos, messages, admin) = setup().await;
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        messages.create(&bob, CreateMessageInput::new("hello")).await.unwrap();
        let hidden = messages
            .create(&bob, CreateMessageInput::new("friends only").with_visibility(Visibility::Friends))
            .await
            .unwrap();

        let listed = admin.list_messages(PageRequest::default()).await.unwrap();
        assert_eq!(listed.total, 2);

        admin.delete_message(ada.id, hidden.id).await.unwrap();
        let stored = repos.messages.get_by_id(hidden.id).await.unwrap().unwrap();
        assert!(stored.deleted);
        assert_eq!(admin.list_messages(PageRequest::default()).await.unwrap().total, 1);

        assert!(matches!(
            admin.delete_message(ada.id, hidden.id).await,
            Err(MessageServiceError::NotFound(_))
        ));
        assert!(matches!(
            admin.delete_message(ada.id, 999).await,
            Err(MessageServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_app_moderation() {
        let (repos, _, admin) = setup().await;
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        let apps = AppService::new(repos.apps.clone());
        let input = |name: &str| CreateAppInput {
            name: name.to_string(),
            ..Default::default()
        };
        let (bot, credentials) = apps.create(ada.id, input("Bot")).await.unwrap();
        apps.create(bob.id, input("Other")).await.unwrap();

        let listed = admin.list_apps(PageRequest::default()).await.unwrap();
        assert_eq!(listed.total, 2);

        let disabled = admin.toggle_app(bot.id).await.unwrap();
        assert!(!disabled.is_active);
        assert!(apps
            .authenticate(&credentials.api_key, &credentials.api_secret)
            .await
            .is_err());
        assert!(admin.toggle_app(bot.id).await.unwrap().is_active);
        assert!(apps
            .authenticate(&credentials.api_key, &credentials.api_secret)
            .await
            .is_ok());

        admin.delete_app(bot.id).await.unwrap();
        assert!(repos.apps.get_by_id(bot.id).await.unwrap().is_none());
        assert!(matches!(admin.delete_app(bot.id).await, Err(AppServiceError::NotFound)));
        assert!(matches!(admin.toggle_app(999).await, Err(AppServiceError::NotFound)));
    }

    #[tokio::test]
    async fn test_system_stats_reports_metrics() {
        let (_, _, admin) = setup().await;
        let stats = admin.system_stats(RequestMetrics {
            total_requests: 12,
            avg_response_time_ms: 1.5,
            uptime_seconds: 61,
        });
        assert_eq!(stats.total_requests, 12);
        assert_eq!(stats.uptime_formatted, "1m");
        assert_eq!(stats.version, APP_VERSION);
        assert!(!stats.os_name.is_empty());
    }
}
