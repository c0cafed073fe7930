//! User service
//!
//! Registration, login and sessions, plus the profile operations a member
//! performs on their own account:
//! - the first account registered becomes the administrator
//! - inactive accounts cannot log in
//! - every login attempt is written to the audit log

use crate::db::repositories::{
    FriendshipRepository, LoginLogRepository, MessageRepository, SessionRepository, UserRepository,
};
use crate::models::{
    FriendshipStatus, LoginAttempt, Session, UpdateProfileInput, User, UserRole,
};
use crate::services::password::{hash_password, verify_password};
use crate::services::text::{is_strong_password, is_valid_email, length_between};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_BIO_LENGTH: usize = 1000;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    /// Credentials were right but the account is switched off
    #[error("Account is deactivated")]
    UserInactive,

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing accounts and authentication
pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    friendships: Arc<dyn FriendshipRepository>,
    messages: Arc<dyn MessageRepository>,
    login_logs: Arc<dyn LoginLogRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        friendships: Arc<dyn FriendshipRepository>,
        messages: Arc<dyn MessageRepository>,
        login_logs: Arc<dyn LoginLogRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            users,
            sessions,
            friendships,
            messages,
            login_logs,
            session_expiration_days,
        }
    }

    /// Register a new member.
    ///
    /// # Errors
    ///
    /// - `ValidationError` for bad names, email, or a weak or mismatched password
    /// - `UserExists` if the email is taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        validate_register_input(&input)?;

        if self
            .users
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email.trim()
            )));
        }

        let role = if self.users.count().await.context("Failed to count users")? == 0 {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(
            input.first_name.trim().to_string(),
            input.last_name.trim().to_string(),
            input.email.trim().to_lowercase(),
            password_hash,
            role,
        );

        let created = self.users.create(&user).await.context("Failed to create user")?;
        tracing::info!("Registered user {} ({})", created.id, created.role);
        Ok(created)
    }

    /// Check credentials and open a session.
    ///
    /// `ip_address` is only used for the audit log.
    pub async fn login(
        &self,
        input: LoginInput,
        ip_address: Option<String>,
    ) -> Result<(Session, User), UserServiceError> {
        let result = self.authenticate(&input).await;

        let failure_reason = match &result {
            Ok(_) => None,
            Err(UserServiceError::AuthenticationError(_)) => Some("invalid_credentials"),
            Err(UserServiceError::UserInactive) => Some("account_inactive"),
            Err(_) => Some("error"),
        };
        self.record_attempt(LoginAttempt {
            email: input.email.trim().to_lowercase(),
            ip_address,
            success: failure_reason.is_none(),
            failure_reason: failure_reason.map(str::to_string),
        })
        .await;

        let user = result?;
        let session = Session::issue(user.id, self.session_expiration_days);
        let session = self
            .sessions
            .create(&session)
            .await
            .context("Failed to create session")?;
        self.users
            .touch_activity(user.id, Utc::now())
            .await
            .context("Failed to record activity")?;

        Ok((session, user))
    }

    async fn authenticate(&self, input: &LoginInput) -> Result<User, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".to_string());

        let user = self
            .users
            .get_by_email(&input.email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        if !verify_password(&input.password, &user.password_hash).context("Failed to verify password")? {
            return Err(invalid());
        }
        if !user.is_active {
            return Err(UserServiceError::UserInactive);
        }
        Ok(user)
    }

    async fn record_attempt(&self, attempt: LoginAttempt) {
        if let Err(e) = self.login_logs.record(&attempt).await {
            tracing::warn!("Failed to write login log for {}: {}", attempt.email, e);
        }
    }

    /// Invalidate a session token
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.sessions
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are deleted on sight. Sessions of deactivated accounts
    /// resolve to `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self.sessions.get_by_id(token).await.context("Failed to get session")? {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.sessions.delete(token).await {
                tracing::warn!("Failed to delete expired session: {}", e);
            }
            return Ok(None);
        }

        let user = self
            .users
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user.filter(|u| u.is_active))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.users.get_by_id(id).await.context("Failed to get user by ID")?)
    }

    async fn require(&self, id: i64) -> Result<User, UserServiceError> {
        self.get_by_id(id).await?.ok_or(UserServiceError::NotFound)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .sessions
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    /// Apply the fields present in `input`; preferences merge key by key
    pub async fn update_profile(&self, user_id: i64, input: UpdateProfileInput) -> Result<User, UserServiceError> {
        let mut user = self.require(user_id).await?;

        if let Some(first) = input.first_name {
            validate_name("First name", &first)?;
            user.first_name = first.trim().to_string();
        }
        if let Some(last) = input.last_name {
            validate_name("Last name", &last)?;
            user.last_name = last.trim().to_string();
        }
        if let Some(bio) = input.bio {
            if bio.chars().count() > MAX_BIO_LENGTH {
                return Err(UserServiceError::ValidationError(format!(
                    "Bio must be at most {} characters",
                    MAX_BIO_LENGTH
                )));
            }
            let bio = bio.trim().to_string();
            user.bio = if bio.is_empty() { None } else { Some(bio) };
        }
        if let Some(email_public) = input.email_public {
            user.email_public = email_public;
        }
        if let Some(patch) = input.preferences {
            user.preferences = user
                .preferences
                .merge(&patch)
                .map_err(|e| UserServiceError::ValidationError(e.to_string()))?;
        }

        Ok(self.users.update(&user).await.context("Failed to update profile")?)
    }

    pub async fn change_password(&self, user_id: i64, input: ChangePasswordInput) -> Result<(), UserServiceError> {
        let mut user = self.require(user_id).await?;

        if !verify_password(&input.current_password, &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_new_password(&input.new_password, &input.confirm_password)?;

        user.password_hash = hash_password(&input.new_password).context("Failed to hash password")?;
        self.users.update(&user).await.context("Failed to update password")?;
        Ok(())
    }

    /// Point the user's avatar at `url`, returning the previous value
    pub async fn set_avatar(&self, user_id: i64, url: &str) -> Result<Option<String>, UserServiceError> {
        let mut user = self.require(user_id).await?;
        let previous = user.avatar.replace(url.to_string());
        self.users.update(&user).await.context("Failed to update avatar")?;
        Ok(previous)
    }

    /// Another member's profile as `viewer_id` sees it
    pub async fn public_profile(
        &self,
        viewer_id: Option<i64>,
        user_id: i64,
    ) -> Result<PublicProfile, UserServiceError> {
        let user = self.require(user_id).await?;

        let friendship_status = match viewer_id {
            Some(viewer) if viewer != user_id => self
                .friendships
                .find_between(viewer, user_id)
                .await
                .context("Failed to get friendship")?
                .map(|f| f.status),
            _ => None,
        };
        let message_count = self
            .messages
            .count_by_author(user_id)
            .await
            .context("Failed to count messages")?;
        let friend_count = self
            .friendships
            .count_accepted(user_id)
            .await
            .context("Failed to count friends")?;

        let is_self = viewer_id == Some(user_id);
        Ok(PublicProfile {
            user: ProfileView::from_user(&user, is_self),
            friendship_status,
            message_count,
            friend_count,
        })
    }
}

fn validate_name(label: &str, value: &str) -> Result<(), UserServiceError> {
    if length_between(value, 2, 100) {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError(format!(
            "{} must be between 2 and 100 characters",
            label
        )))
    }
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), UserServiceError> {
    if !is_strong_password(password) {
        return Err(UserServiceError::ValidationError(
            "Password must be at least 8 characters and contain a lowercase letter, an uppercase letter and a digit"
                .to_string(),
        ));
    }
    if password != confirm {
        return Err(UserServiceError::ValidationError(
            "Passwords do not match".to_string(),
        ));
    }
    Ok(())
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    validate_name("First name", &input.first_name)?;
    validate_name("Last name", &input.last_name)?;
    if !is_valid_email(&input.email) {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }
    validate_new_password(&input.password, &input.confirm_password)
}

/// Input for user registration
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterInput {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            confirm_password: password.clone(),
            password,
        }
    }
}

/// Input for user login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Profile fields safe to show to other members
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Present only when the owner made it public (or is looking at themselves)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: String,
    pub role: UserRole,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ProfileView {
    pub fn from_user(user: &User, reveal_email: bool) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: (reveal_email || user.email_public).then(|| user.email.clone()),
            bio: user.bio.clone(),
            avatar: user.avatar_url(),
            role: user.role,
            last_activity_at: user.last_activity_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub user: ProfileView,
    pub friendship_status: Option<FriendshipStatus>,
    pub message_count: i64,
    pub friend_count: i64,
}
