//! Data models
//!
//! Database entities (User, Session, Message, Like, Friendship,
//! PrivateMessage, Notification, App, Group) together with the view and
//! input types the services hand to the HTTP layer.

mod app;
mod friendship;
mod group;
mod message;
mod notification;
mod pagination;
mod private_message;
mod session;
mod user;

pub use app::{
    App, AppCredentials, AppPermission, DEFAULT_APP_RATE_LIMIT, MAX_APPS_PER_USER,
    MAX_APP_DESCRIPTION_LENGTH, MAX_APP_NAME_LENGTH,
};
pub use friendship::{FriendList, Friendship, FriendshipStatus};
pub use group::{
    Group, GroupMember, GroupMemberView, GroupRole, GroupWithMembers, MAX_GROUPS_PER_USER,
    MAX_MEMBERS_PER_GROUP,
};
pub use message::{
    CreateMessageInput, Like, LikeType, Message, MessageView, ReactionOutcome, Visibility,
    MAX_MESSAGE_LENGTH,
};
pub use notification::{Notification, NotificationKind, NotificationPreferences};
pub use pagination::{PageRequest, Paginated};
pub use private_message::{Conversation, PrivateMessage};
pub use session::Session;
pub use user::{
    gravatar_url, LoginAttempt, UpdateProfileInput, User, UserPreferences, UserRole, UserSummary,
};
