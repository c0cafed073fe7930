//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an account and sign in
//! - POST /api/v1/auth/login - Sign in
//! - POST /api/v1/auth/logout - Sign out
//! - GET /api/v1/auth/me - Current user

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{clear_session_cookie_headers, session_cookie_headers};
use crate::api::middleware::{
    extract_ip_address, extract_session_token, ApiError, AppState, AuthenticatedUser,
};
use crate::models::{Session, User};
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

fn ip_key(headers: &HeaderMap) -> String {
    format!("ip:{}", extract_ip_address(headers).unwrap_or_else(|| "unknown".to_string()))
}

fn email_key(email: &str) -> String {
    format!("email:{}", email.trim().to_lowercase())
}

fn too_many_attempts() -> ApiError {
    ApiError::rate_limited("Too many attempts, please try again later")
}

/// Register, then open a session for the new account.
///
/// Registration attempts count against the per-IP auth limit.
pub(crate) async fn register_and_sign_in(
    state: &AppState,
    headers: &HeaderMap,
    input: RegisterInput,
) -> Result<(Session, User), ApiError> {
    if !state.rate_limiters.auth.check_and_record(&ip_key(headers)).await {
        return Err(too_many_attempts());
    }

    let password = input.password.clone();
    let user = state.user_service.register(input).await?;
    let (session, user) = state
        .user_service
        .login(LoginInput::new(user.email, password), extract_ip_address(headers))
        .await?;
    Ok((session, user))
}

/// Log in under the auth rate limit.
///
/// Every attempt counts against the caller's IP. Failures also count against
/// the email address, which is cleared again on success.
pub(crate) async fn sign_in(
    state: &AppState,
    headers: &HeaderMap,
    input: LoginInput,
) -> Result<(Session, User), ApiError> {
    let limiter = &state.rate_limiters.auth;
    let email_key = email_key(&input.email);

    if limiter.is_limited(&email_key).await || !limiter.check_and_record(&ip_key(headers)).await {
        tracing::warn!("Login rate limit hit for {}", email_key);
        return Err(too_many_attempts());
    }

    match state.user_service.login(input, extract_ip_address(headers)).await {
        Ok(result) => {
            limiter.clear(&email_key).await;
            Ok(result)
        }
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                limiter.record(&email_key).await;
            }
            Err(e.into())
        }
    }
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, user) = register_and_sign_in(&state, &headers, body).await?;
    let cookie = session_cookie_headers(&session.id, state.session_expiration_days)?;

    Ok((
        StatusCode::CREATED,
        cookie,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, user) = sign_in(&state, &headers, body).await?;
    let cookie = session_cookie_headers(&session.id, state.session_expiration_days)?;

    Ok((
        cookie,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    Ok((StatusCode::NO_CONTENT, clear_session_cookie_headers()))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}
