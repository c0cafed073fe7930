//! Group API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Group, GroupWithMembers};
use crate::services::CreateGroupInput;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/suggested", get(suggested_groups))
        .route("/{id}", get(get_group))
        .route("/{id}/join", post(join_group))
        .route("/{id}/leave", post(leave_group))
}

/// GET /api/v1/groups - groups the caller belongs to
async fn list_groups(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<GroupWithMembers>>, ApiError> {
    Ok(Json(state.group_service.list_for_user(user.0.id).await?))
}

/// POST /api/v1/groups
async fn create_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateGroupInput>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state.group_service.create(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /api/v1/groups/suggested
async fn suggested_groups(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Group>>, ApiError> {
    Ok(Json(state.group_service.suggested(user.0.id).await?))
}

/// GET /api/v1/groups/{id}
async fn get_group(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<GroupWithMembers>, ApiError> {
    Ok(Json(state.group_service.get(id).await?))
}

/// POST /api/v1/groups/{id}/join
async fn join_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.group_service.join(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/groups/{id}/leave
async fn leave_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.group_service.leave(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
