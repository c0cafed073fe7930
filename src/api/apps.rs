//! Mini-app management endpoints
//!
//! The secret is returned only when an app is created or its credentials are
//! regenerated; afterwards only its hash is stored.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{App, AppCredentials};
use crate::services::{CreateAppInput, UpdateAppInput};

#[derive(Debug, Serialize)]
pub struct CreatedAppResponse {
    pub app: App,
    pub credentials: AppCredentials,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_apps).post(create_app))
        .route("/{id}", get(get_app).put(update_app).delete(delete_app))
        .route("/{id}/regenerate", post(regenerate_credentials))
}

/// GET /api/v1/apps
async fn list_apps(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<App>>, ApiError> {
    Ok(Json(state.app_service.list(user.0.id).await?))
}

/// POST /api/v1/apps
async fn create_app(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateAppInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (app, credentials) = state.app_service.create(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(CreatedAppResponse { app, credentials })))
}

/// GET /api/v1/apps/{id}
async fn get_app(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<App>, ApiError> {
    Ok(Json(state.app_service.get(user.0.id, id).await?))
}

/// PUT /api/v1/apps/{id}
async fn update_app(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAppInput>,
) -> Result<Json<App>, ApiError> {
    Ok(Json(state.app_service.update(user.0.id, id, body).await?))
}

/// DELETE /api/v1/apps/{id}
async fn delete_app(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.app_service.delete(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/apps/{id}/regenerate
async fn regenerate_credentials(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<AppCredentials>, ApiError> {
    Ok(Json(
        state
            .app_service
            .regenerate_credentials(user.0.id, id)
            .await?,
    ))
}
