//! Notification API endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{Notification, NotificationKind, NotificationPreferences};
use crate::services::NotificationPage;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

/// Partial preference update; absent switches stay as they are
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub browser_notifications: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", put(mark_all_read))
        .route("/preferences", get(get_preferences).put(update_preferences))
        .route("/test", post(send_test))
        .route("/{id}", get(get_notification).delete(delete_notification))
        .route("/{id}/read", put(mark_read))
}

/// Parse the optional `type` filter
pub(crate) fn parse_kind(raw: Option<&str>) -> Result<Option<NotificationKind>, ApiError> {
    raw.filter(|s| !s.is_empty())
        .map(NotificationKind::from_str)
        .transpose()
        .map_err(|e| ApiError::validation_error(e.to_string()))
}

/// GET /api/v1/notifications
async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationPage>, ApiError> {
    let kind = parse_kind(query.kind.as_deref())?;
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(
        state
            .notification_service
            .list(user.0.id, kind, request)
            .await?,
    ))
}

/// GET /api/v1/notifications/unread-count
async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.notification_service.unread_count(user.0.id).await?;
    Ok(Json(CountResponse { count }))
}

/// GET /api/v1/notifications/{id}
async fn get_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Notification>, ApiError> {
    Ok(Json(state.notification_service.get(user.0.id, id).await?))
}

/// PUT /api/v1/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.notification_service.mark_read(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let updated = state.notification_service.mark_all_read(user.0.id).await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// DELETE /api/v1/notifications/{id}
async fn delete_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.notification_service.delete(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/notifications/preferences
async fn get_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<NotificationPreferences>, ApiError> {
    Ok(Json(state.notification_service.preferences(user.0.id).await?))
}

/// PUT /api/v1/notifications/preferences
async fn update_preferences(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PreferencesPatch>,
) -> Result<Json<NotificationPreferences>, ApiError> {
    let prefs = state
        .notification_service
        .update_preferences(
            user.0.id,
            body.email_notifications,
            body.push_notifications,
            body.browser_notifications,
        )
        .await?;
    Ok(Json(prefs))
}

/// POST /api/v1/notifications/test
async fn send_test(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let notification = state.notification_service.send_test(user.0.id).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
