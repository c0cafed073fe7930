//! Services layer - Business logic
//!
//! Services validate input, enforce the social rules (friendship states,
//! visibility, ownership) and coordinate repositories. Side-effect
//! notifications are written inline through [`NotificationService`].

pub mod admin;
pub mod app;
pub mod avatar;
pub mod feed;
pub mod friendship;
pub mod group;
pub mod message;
pub mod notification;
pub mod password;
pub mod private_message;
pub mod rate_limiter;
pub mod text;
pub mod user;

pub use admin::{AdminService, AdminUpdateUserInput, DashboardStats, RequestMetrics, SystemStats, UserDetails};
pub use app::{AppService, AppServiceError, CreateAppInput, UpdateAppInput};
pub use avatar::AvatarService;
pub use feed::{FeedService, FeedType, TrendingHashtag};
pub use friendship::{FriendshipService, FriendshipServiceError};
pub use group::{CreateGroupInput, GroupService, GroupServiceError};
pub use message::{MessageService, MessageServiceError};
pub use notification::{NotificationPage, NotificationService, NotificationServiceError};
pub use password::{hash_password, verify_password};
pub use private_message::PrivateMessageService;
pub use rate_limiter::{RateLimiter, RateLimiters};
pub use user::{
    ChangePasswordInput, LoginInput, ProfileView, PublicProfile, RegisterInput, UserService,
    UserServiceError,
};
