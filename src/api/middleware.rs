//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type every handler returns
//! - Session authentication (cookie or bearer token) and admin authorization
//! - API key/secret authentication for the external mini-app API
//! - Request statistics

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::config::{Config, UploadConfig};
use crate::db::repositories::Repositories;
use crate::db::DynDatabasePool;
use crate::models::{App, AppPermission, User};
use crate::services::{
    AdminService, AppService, AppServiceError, AvatarService, FeedService, FriendshipService,
    FriendshipServiceError, GroupService, GroupServiceError, MessageService, MessageServiceError,
    NotificationService, NotificationServiceError, PrivateMessageService, RateLimiters,
    RequestMetrics, UserService, UserServiceError,
};
use crate::theme::ThemeEngine;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_SECRET_HEADER: &str = "x-api-secret";

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Total response time in microseconds (for calculating average)
    total_response_time_us: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a request with its response time
    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        let total_time = self.total_response_time_us.load(Ordering::Relaxed);
        total_time as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Snapshot for the admin statistics page
    pub fn metrics(&self) -> RequestMetrics {
        RequestMetrics {
            total_requests: self.total_requests(),
            avg_response_time_ms: self.avg_response_time_us() / 1000.0,
            uptime_seconds: self.uptime_seconds(),
        }
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub message_service: Arc<MessageService>,
    pub private_message_service: Arc<PrivateMessageService>,
    pub feed_service: Arc<FeedService>,
    pub friendship_service: Arc<FriendshipService>,
    pub notification_service: Arc<NotificationService>,
    pub app_service: Arc<AppService>,
    pub group_service: Arc<GroupService>,
    pub admin_service: Arc<AdminService>,
    pub avatar_service: Arc<AvatarService>,
    pub rate_limiters: Arc<RateLimiters>,
    pub theme_engine: Arc<RwLock<ThemeEngine>>,
    pub upload_config: Arc<UploadConfig>,
    pub session_expiration_days: i64,
    pub request_stats: Arc<RequestStats>,
}

impl AppState {
    /// Wire every service onto `pool`. Migrations must already have run.
    pub fn new(pool: DynDatabasePool, config: &Config) -> anyhow::Result<Self> {
        let repos = Repositories::new(pool.clone());

        let notification_service = Arc::new(NotificationService::new(
            repos.notifications.clone(),
            repos.users.clone(),
        ));
        let user_service = Arc::new(UserService::new(
            repos.users.clone(),
            repos.sessions.clone(),
            repos.friendships.clone(),
            repos.messages.clone(),
            repos.login_logs.clone(),
            config.session.expiration_days,
        ));
        let message_service = Arc::new(MessageService::new(
            repos.messages.clone(),
            repos.likes.clone(),
            repos.users.clone(),
            notification_service.clone(),
        ));
        let private_message_service = Arc::new(PrivateMessageService::new(
            repos.private_messages.clone(),
            repos.users.clone(),
            notification_service.clone(),
        ));
        let feed_service = Arc::new(FeedService::new(
            repos.messages.clone(),
            repos.friendships.clone(),
            message_service.clone(),
            config.feed.clone(),
        ));
        let friendship_service = Arc::new(FriendshipService::new(
            repos.friendships.clone(),
            repos.users.clone(),
            notification_service.clone(),
        ));
        let app_service = Arc::new(AppService::new(repos.apps.clone()));
        let group_service = Arc::new(GroupService::new(repos.groups.clone(), repos.users.clone()));
        let upload_config = Arc::new(config.upload.clone());
        let avatar_service = Arc::new(AvatarService::new(user_service.clone(), upload_config.clone()));
        let admin_service = Arc::new(AdminService::new(repos, message_service.clone()));

        let theme_engine = Arc::new(RwLock::new(ThemeEngine::new(&config.theme.path, &config.theme.active)?));

        Ok(Self {
            pool,
            user_service,
            message_service,
            private_message_service,
            feed_service,
            friendship_service,
            notification_service,
            app_service,
            group_service,
            admin_service,
            avatar_service,
            rate_limiters: Arc::new(RateLimiters::from_config(&config.rate_limit)),
            theme_engine,
            upload_config,
            session_expiration_days: config.session.expiration_days,
            request_stats: Arc::new(RequestStats::new()),
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new("RATE_LIMITED", message)
    }

    /// Log the cause and hide it from the client
    pub fn internal_error(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_INACTIVE" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal_error(e)
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::UserExists(msg) => Self::conflict(msg),
            UserServiceError::UserInactive => Self::new("USER_INACTIVE", "Account is deactivated"),
            UserServiceError::NotFound => Self::not_found("User not found"),
            UserServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<MessageServiceError> for ApiError {
    fn from(e: MessageServiceError) -> Self {
        match e {
            MessageServiceError::ValidationError(msg) => Self::validation_error(msg),
            MessageServiceError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            MessageServiceError::Forbidden(msg) => Self::forbidden(msg),
            MessageServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<FriendshipServiceError> for ApiError {
    fn from(e: FriendshipServiceError) -> Self {
        match e {
            FriendshipServiceError::ValidationError(msg) => Self::validation_error(msg),
            FriendshipServiceError::NotFound(what) => Self::not_found(format!("{} not found", what)),
            FriendshipServiceError::AlreadyExists => Self::conflict("Friendship already exists"),
            FriendshipServiceError::Blocked => Self::forbidden("This user cannot be added"),
            FriendshipServiceError::Forbidden(msg) => Self::forbidden(msg),
            FriendshipServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<AppServiceError> for ApiError {
    fn from(e: AppServiceError) -> Self {
        match e {
            AppServiceError::ValidationError(msg) => Self::validation_error(msg),
            AppServiceError::NotFound => Self::not_found("App not found"),
            AppServiceError::InvalidCredentials => Self::unauthorized("Invalid API credentials"),
            AppServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<GroupServiceError> for ApiError {
    fn from(e: GroupServiceError) -> Self {
        match e {
            GroupServiceError::ValidationError(msg) => Self::validation_error(msg),
            GroupServiceError::NotFound => Self::not_found("Group not found"),
            GroupServiceError::Forbidden(msg) => Self::forbidden(msg),
            GroupServiceError::Conflict(msg) => Self::conflict(msg),
            GroupServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

impl From<NotificationServiceError> for ApiError {
    fn from(e: NotificationServiceError) -> Self {
        match e {
            NotificationServiceError::NotFound => Self::not_found("Notification not found"),
            NotificationServiceError::UserNotFound => Self::not_found("User not found"),
            NotificationServiceError::InternalError(e) => Self::internal_error(e),
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// The signed-in user when there is one (set by [`optional_auth`])
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

/// A mini-app authenticated by key and secret, acting for its owner
#[derive(Debug, Clone)]
pub struct ApiClient {
    pub app: App,
    pub owner: User,
}

impl ApiClient {
    pub fn require(&self, permission: AppPermission) -> Result<(), ApiError> {
        if self.app.has_permission(permission) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!("Missing permission: {}", permission)))
        }
    }
}

impl<S> FromRequestParts<S> for ApiClient
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ApiClient>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("API key and secret required"))
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Session token from `Authorization: Bearer` or the `session` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Client address as reported by a fronting proxy
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
            return Some(ip.to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

/// Admin authorization middleware, layered inside [`require_auth`]
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Trimmed, non-empty header value
fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Per-client limit in front of every `/api` route, keyed by IP
pub async fn api_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let key = format!(
        "ip:{}",
        extract_ip_address(request.headers()).unwrap_or_else(|| "unknown".to_string())
    );
    if !state.rate_limiters.api.check_and_record(&key).await {
        tracing::warn!("API rate limit hit for {}", key);
        return Err(ApiError::rate_limited("Too many requests, please try again later"));
    }
    Ok(next.run(request).await)
}

/// Mini-app authentication: `X-API-Key` plus `X-API-Secret`.
///
/// Only authenticated requests count against the app's own limit, so a
/// wrong secret cannot use up someone else's key.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let credentials = {
        let headers = request.headers();
        (
            header_string(headers, API_KEY_HEADER),
            header_string(headers, API_SECRET_HEADER),
        )
    };
    let (api_key, api_secret) = match credentials {
        (Some(key), Some(secret)) => (key, secret),
        _ => return Err(ApiError::unauthorized("API key and secret required")),
    };

    let app = state.app_service.authenticate(&api_key, &api_secret).await?;

    if !state.rate_limiters.api.check_and_record(&format!("key:{}", app.api_key)).await {
        return Err(ApiError::rate_limited("Too many requests, please try again later"));
    }

    let owner = state
        .user_service
        .get_by_id(app.owner_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("Invalid API credentials"))?;

    tracing::debug!("API request from app {} for user {}", app.id, owner.id);
    request.extensions_mut().insert(ApiClient { app, owner });
    Ok(next.run(request).await)
}

/// Request statistics middleware
///
/// Records request count and response time for the admin statistics page.
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[("authorization", "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[("cookie", "theme=dark; session=test-token-456")]);
        assert_eq!(extract_session_token(&map), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            ("authorization", "Bearer bearer-token"),
            ("cookie", "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        assert!(extract_session_token(&headers(&[("authorization", "Basic abc")])).is_none());
        assert!(extract_session_token(&headers(&[("cookie", "session=")])).is_none());
    }

    #[test]
    fn test_extract_ip_address() {
        let map = headers(&[("x-forwarded-for", "10.0.0.1, 10.0.0.2")]);
        assert_eq!(extract_ip_address(&map), Some("10.0.0.1".to_string()));
        let map = headers(&[("x-real-ip", "192.168.1.5")]);
        assert_eq!(extract_ip_address(&map), Some("192.168.1.5".to_string()));
        assert!(extract_ip_address(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_api_error_status_mapping() {
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new("SOMETHING", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_errors_map_to_codes() {
        assert_eq!(ApiError::from(UserServiceError::UserInactive).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(UserServiceError::UserExists("taken".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(MessageServiceError::NotFound("Message")).error.message,
            "Message not found"
        );
        assert_eq!(
            ApiError::from(AppServiceError::InvalidCredentials).error.message,
            "Invalid API credentials"
        );
        let internal = ApiError::from(GroupServiceError::InternalError(anyhow::anyhow!("db gone")));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!internal.error.message.contains("db gone"));
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({"field": "email"});
        let error = ApiError::with_details("VALIDATION_ERROR", "Invalid", details.clone());
        assert_eq!(error.error.details, Some(details));
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(1000);
        stats.record(3000);
        let metrics = stats.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.avg_response_time_ms, 2.0);
    }
}
