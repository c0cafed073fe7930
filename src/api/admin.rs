//! Admin API endpoints
//!
//! All routes sit behind `require_auth` and `require_admin`:
//! - GET /api/v1/admin/dashboard - Counts and recent activity
//! - GET /api/v1/admin/users - Search users
//! - GET/PUT/DELETE /api/v1/admin/users/{id} - Inspect, (de)activate, re-role or remove a user
//! - GET /api/v1/admin/messages, DELETE /api/v1/admin/messages/{id} - Moderate messages
//! - GET /api/v1/admin/apps, POST /api/v1/admin/apps/{id}/toggle, DELETE /api/v1/admin/apps/{id}
//! - GET /api/v1/admin/stats - Process and request statistics
//! - POST /api/v1/admin/theme/reload - Re-read the active theme's templates from disk

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{App, MessageView, Paginated, User};
use crate::services::{AdminUpdateUserInput, DashboardStats, SystemStats, UserDetails};

#[derive(Debug, Deserialize)]
pub struct UserSearchQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ThemeReloadResponse {
    pub theme: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/users", get(list_users))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/messages", get(list_messages))
        .route("/messages/{id}", delete(delete_message))
        .route("/apps", get(list_apps))
        .route("/apps/{id}/toggle", post(toggle_app))
        .route("/apps/{id}", delete(delete_app))
        .route("/stats", get(get_system_stats))
        .route("/theme/reload", post(reload_theme))
}

/// GET /api/v1/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.admin_service.dashboard().await?))
}

/// GET /api/v1/admin/users?search=&page=&limit=
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<Paginated<User>>, ApiError> {
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(
        state
            .admin_service
            .list_users(query.search.as_deref(), request)
            .await?,
    ))
}

/// GET /api/v1/admin/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserDetails>, ApiError> {
    Ok(Json(state.admin_service.user_details(id).await?))
}

/// PUT /api/v1/admin/users/{id}
async fn update_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<AdminUpdateUserInput>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.admin_service.update_user(admin.0.id, id, body).await?))
}

/// DELETE /api/v1/admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.admin_service.delete_user(admin.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/messages?page=&limit=
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Paginated<MessageView>>, ApiError> {
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(state.admin_service.list_messages(request).await?))
}

/// DELETE /api/v1/admin/messages/{id}
async fn delete_message(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.admin_service.delete_message(admin.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/apps?page=&limit=
async fn list_apps(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Paginated<App>>, ApiError> {
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(state.admin_service.list_apps(request).await?))
}

/// POST /api/v1/admin/apps/{id}/toggle
async fn toggle_app(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<App>, ApiError> {
    Ok(Json(state.admin_service.toggle_app(id).await?))
}

/// DELETE /api/v1/admin/apps/{id}
async fn delete_app(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.admin_service.delete_app(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/stats
async fn get_system_stats(State(state): State<AppState>) -> Json<SystemStats> {
    Json(state.admin_service.system_stats(state.request_stats.metrics()))
}

/// POST /api/v1/admin/theme/reload
///
/// A theme that fails to parse is reported and the previous templates keep serving.
async fn reload_theme(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
) -> Result<Json<ThemeReloadResponse>, ApiError> {
    let mut engine = state
        .theme_engine
        .write()
        .map_err(|e| ApiError::internal_error(format!("Theme lock error: {}", e)))?;
    engine
        .reload_templates()
        .map_err(|e| ApiError::validation_error(format!("Failed to reload theme: {:#}", e)))?;
    tracing::info!("Theme {} reloaded by admin {}", engine.current_theme(), admin.0.id);
    Ok(Json(ThemeReloadResponse {
        theme: engine.current_theme().to_string(),
    }))
}
