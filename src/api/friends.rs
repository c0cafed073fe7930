//! Friendship API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{FriendList, Friendship};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_friends))
        .route("/{id}", post(send_request).delete(remove_friend))
        .route("/{id}/accept", post(accept_request))
        .route("/{id}/reject", post(reject_request))
        .route("/{id}/block", post(block_user))
}

/// GET /api/v1/friends
async fn list_friends(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<FriendList>, ApiError> {
    Ok(Json(state.friendship_service.list(user.0.id).await?))
}

/// POST /api/v1/friends/{id}
async fn send_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(friend_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let friendship = state.friendship_service.send_request(&user.0, friend_id).await?;
    Ok((StatusCode::CREATED, Json(friendship)))
}

/// POST /api/v1/friends/{id}/accept
async fn accept_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(requester_id): Path<i64>,
) -> Result<Json<Friendship>, ApiError> {
    Ok(Json(state.friendship_service.accept(&user.0, requester_id).await?))
}

/// POST /api/v1/friends/{id}/reject
async fn reject_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(requester_id): Path<i64>,
) -> Result<Json<Friendship>, ApiError> {
    Ok(Json(state.friendship_service.reject(user.0.id, requester_id).await?))
}

/// POST /api/v1/friends/{id}/block
async fn block_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(other_id): Path<i64>,
) -> Result<Json<Friendship>, ApiError> {
    Ok(Json(state.friendship_service.block(user.0.id, other_id).await?))
}

/// DELETE /api/v1/friends/{id}
async fn remove_friend(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(friend_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.friendship_service.remove(user.0.id, friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
