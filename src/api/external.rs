//! External API for mini-apps, mounted at `/api`
//!
//! `status`, `users/{id}` and `messages/public` are open. Everything else
//! needs `X-API-Key` and `X-API-Secret`, runs as the app's owner and checks
//! the matching permission.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

use crate::api::common::{PaginationInfo, PaginationQuery};
use crate::api::messages::post_message;
use crate::api::middleware::{ApiClient, ApiError, AppState};
use crate::api::notifications::{parse_kind, NotificationQuery};
use crate::models::{
    AppPermission, CreateMessageInput, FriendList, GroupWithMembers, MessageView, Paginated,
    UpdateProfileInput,
};
use crate::services::admin::APP_VERSION;
use crate::services::{FeedType, NotificationPage, ProfileView};

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageView>,
    pub pagination: PaginationInfo,
}

impl From<Paginated<MessageView>> for MessageListResponse {
    fn from(page: Paginated<MessageView>) -> Self {
        let pagination = PaginationInfo::from(&page);
        Self {
            messages: page.items,
            pagination,
        }
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status))
        .route("/users/{id}", get(get_user))
        .route("/messages/public", get(public_messages))
}

/// Routes behind `require_api_key`
pub fn app_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me).put(update_me))
        .route("/messages", get(list_messages).post(create_message))
        .route("/messages/{id}", delete(delete_message))
        .route("/friends", get(list_friends))
        .route("/friends/{id}", post(add_friend).delete(remove_friend))
        .route("/notifications", get(list_notifications))
        .route("/notifications/{id}/read", put(mark_notification_read))
        .route("/groups", get(list_groups))
        .route("/groups/{id}/join", post(join_group))
}

/// GET /api/status
async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let database = match state.pool.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!("Database ping failed: {}", e);
            "disconnected"
        }
    };
    Json(StatusResponse {
        status: "ok",
        timestamp: Utc::now().to_rfc3339(),
        version: APP_VERSION,
        database,
    })
}

/// GET /api/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ProfileView>, ApiError> {
    let user = state
        .user_service
        .get_by_id(id)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ProfileView::from_user(&user, false)))
}

/// GET /api/messages/public
async fn public_messages(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    let request = state.feed_service.page_request(query.page, query.limit);
    let page = state.feed_service.public_feed(request).await?;
    Ok(Json(page.into()))
}

/// GET /api/me
async fn get_me(client: ApiClient) -> Result<Json<ProfileView>, ApiError> {
    client.require(AppPermission::ReadProfile)?;
    Ok(Json(ProfileView::from_user(&client.owner, true)))
}

/// PUT /api/me
async fn update_me(
    State(state): State<AppState>,
    client: ApiClient,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<ProfileView>, ApiError> {
    client.require(AppPermission::WriteProfile)?;
    let user = state.user_service.update_profile(client.owner.id, body).await?;
    Ok(Json(ProfileView::from_user(&user, true)))
}

/// GET /api/messages - the owner's feed
async fn list_messages(
    State(state): State<AppState>,
    client: ApiClient,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<MessageListResponse>, ApiError> {
    client.require(AppPermission::ReadMessages)?;
    let request = state.feed_service.page_request(query.page, query.limit);
    let page = state
        .feed_service
        .user_feed(client.owner.id, FeedType::All, request)
        .await?;
    Ok(Json(page.into()))
}

/// POST /api/messages
async fn create_message(
    State(state): State<AppState>,
    client: ApiClient,
    Json(body): Json<CreateMessageInput>,
) -> Result<impl IntoResponse, ApiError> {
    client.require(AppPermission::WriteMessages)?;
    let message = post_message(&state, &client.owner, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// DELETE /api/messages/{id}
async fn delete_message(
    State(state): State<AppState>,
    client: ApiClient,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    client.require(AppPermission::WriteMessages)?;
    state.message_service.delete(&client.owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/friends
async fn list_friends(
    State(state): State<AppState>,
    client: ApiClient,
) -> Result<Json<FriendList>, ApiError> {
    client.require(AppPermission::ReadFriends)?;
    Ok(Json(state.friendship_service.list(client.owner.id).await?))
}

/// POST /api/friends/{id}
async fn add_friend(
    State(state): State<AppState>,
    client: ApiClient,
    Path(friend_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    client.require(AppPermission::WriteFriends)?;
    let friendship = state
        .friendship_service
        .send_request(&client.owner, friend_id)
        .await?;
    Ok((StatusCode::CREATED, Json(friendship)))
}

/// DELETE /api/friends/{id}
async fn remove_friend(
    State(state): State<AppState>,
    client: ApiClient,
    Path(friend_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    client.require(AppPermission::WriteFriends)?;
    state.friendship_service.remove(client.owner.id, friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/notifications
async fn list_notifications(
    State(state): State<AppState>,
    client: ApiClient,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationPage>, ApiError> {
    client.require(AppPermission::ReadNotifications)?;
    let kind = parse_kind(query.kind.as_deref())?;
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(
        state
            .notification_service
            .list(client.owner.id, kind, request)
            .await?,
    ))
}

/// PUT /api/notifications/{id}/read
async fn mark_notification_read(
    State(state): State<AppState>,
    client: ApiClient,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    client.require(AppPermission::WriteNotifications)?;
    state.notification_service.mark_read(client.owner.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/groups
async fn list_groups(
    State(state): State<AppState>,
    client: ApiClient,
) -> Result<Json<Vec<GroupWithMembers>>, ApiError> {
    client.require(AppPermission::ReadGroups)?;
    Ok(Json(state.group_service.list_for_user(client.owner.id).await?))
}

/// POST /api/groups/{id}/join
async fn join_group(
    State(state): State<AppState>,
    client: ApiClient,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    client.require(AppPermission::WriteGroups)?;
    state.group_service.join(client.owner.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
