//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity and hides the
//! SQLite/MySQL split behind a trait object.

pub mod app;
pub mod friendship;
pub mod group;
pub mod like;
pub mod login_log;
pub mod message;
pub mod notification;
pub mod private_message;
pub mod session;
pub mod user;

pub use app::{AppRepository, SqlxAppRepository};
pub use friendship::{FriendshipRepository, SqlxFriendshipRepository};
pub use group::{GroupRepository, SqlxGroupRepository};
pub use like::{LikeRepository, SqlxLikeRepository};
pub use login_log::{LoginLogRepository, SqlxLoginLogRepository};
pub use message::{FeedFilter, MessageRepository, SqlxMessageRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use private_message::{PrivateMessageRepository, SqlxPrivateMessageRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};

use crate::db::DynDatabasePool;
use std::sync::Arc;

/// Every repository, built over one pool
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub likes: Arc<dyn LikeRepository>,
    pub friendships: Arc<dyn FriendshipRepository>,
    pub private_messages: Arc<dyn PrivateMessageRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub apps: Arc<dyn AppRepository>,
    pub groups: Arc<dyn GroupRepository>,
    pub login_logs: Arc<dyn LoginLogRepository>,
}

impl Repositories {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            users: SqlxUserRepository::boxed(pool.clone()),
            sessions: SqlxSessionRepository::boxed(pool.clone()),
            messages: SqlxMessageRepository::boxed(pool.clone()),
            likes: SqlxLikeRepository::boxed(pool.clone()),
            friendships: SqlxFriendshipRepository::boxed(pool.clone()),
            private_messages: SqlxPrivateMessageRepository::boxed(pool.clone()),
            notifications: SqlxNotificationRepository::boxed(pool.clone()),
            apps: SqlxAppRepository::boxed(pool.clone()),
            groups: SqlxGroupRepository::boxed(pool.clone()),
            login_logs: SqlxLoginLogRepository::boxed(pool),
        }
    }
}
