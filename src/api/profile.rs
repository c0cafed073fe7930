//! Profile API endpoints
//!
//! - GET/PUT /api/v1/profile - Own profile
//! - PUT /api/v1/profile/password - Change password
//! - POST /api/v1/profile/avatar - Upload avatar (multipart field `avatar`)
//! - GET /api/v1/profile/{id} - Someone else's profile

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{UpdateProfileInput, User};
use crate::services::{ChangePasswordInput, PublicProfile};

const AVATAR_FIELD: &str = "avatar";

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: String,
}

/// Routes for the signed-in user. `upload_limit` caps the avatar request body.
pub fn protected_router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(get_own_profile).put(update_profile))
        .route("/password", put(change_password))
        .route(
            "/avatar",
            post(upload_avatar).layer(DefaultBodyLimit::max(upload_limit)),
        )
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_profile))
}

/// GET /api/v1/profile
async fn get_own_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PublicProfile>, ApiError> {
    let profile = state
        .user_service
        .public_profile(Some(user.0.id), user.0.id)
        .await?;
    Ok(Json(profile))
}

/// PUT /api/v1/profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<User>, ApiError> {
    let updated = state.user_service.update_profile(user.0.id, body).await?;
    Ok(Json(updated))
}

/// PUT /api/v1/profile/password
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordInput>,
) -> Result<StatusCode, ApiError> {
    state.user_service.change_password(user.0.id, body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/profile/avatar
async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let avatar = state
            .avatar_service
            .store_avatar(user.0.id, &content_type, &data)
            .await?;
        return Ok(Json(AvatarResponse { avatar }));
    }

    Err(ApiError::validation_error("No file provided"))
}

/// GET /api/v1/profile/{id}
async fn get_profile(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<PublicProfile>, ApiError> {
    let profile = state
        .user_service
        .public_profile(viewer.0.map(|u| u.id), id)
        .await?;
    Ok(Json(profile))
}
