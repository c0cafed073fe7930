//! Message API endpoints
//!
//! Public posts, replies and reactions, plus private messages under
//! `/api/v1/messages/private`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{ContentRequest, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    Conversation, CreateMessageInput, MessageView, Paginated, PrivateMessage, ReactionOutcome, User,
};

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub result: ReactionOutcome,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_messages))
        .route("/{id}", get(get_message))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_message))
        .route("/{id}", axum::routing::delete(delete_message))
        .route("/{id}/reply", post(reply_to_message))
        .route("/{id}/like", post(like_message))
        .route("/{id}/dislike", post(dislike_message))
        .route("/private", get(list_conversations))
        .route(
            "/private/{user_id}",
            get(get_conversation).post(send_private_message),
        )
}

/// Post under the per-user message rate limit
pub(crate) async fn post_message(
    state: &AppState,
    author: &User,
    input: CreateMessageInput,
) -> Result<MessageView, ApiError> {
    let key = format!("user:{}", author.id);
    if !state.rate_limiters.message.check_and_record(&key).await {
        return Err(ApiError::rate_limited("You are posting too fast, please slow down"));
    }

    let message = state.message_service.create(author, input).await?;
    if !message.hashtags.is_empty() {
        state.feed_service.invalidate_trending().await;
    }
    Ok(message)
}

/// GET /api/v1/messages
async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<Paginated<MessageView>>, ApiError> {
    let request = state.feed_service.page_request(query.page, query.limit);
    Ok(Json(state.message_service.list(request).await?))
}

/// POST /api/v1/messages
async fn create_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateMessageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let message = post_message(&state, &user.0, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/v1/messages/{id}
async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageView>, ApiError> {
    Ok(Json(state.message_service.get_with_replies(id).await?))
}

/// DELETE /api/v1/messages/{id}
async fn delete_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.message_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/messages/{id}/reply
async fn reply_to_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<ContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = state.message_service.reply(&user.0, id, &body.content).await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

/// POST /api/v1/messages/{id}/like
async fn like_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let result = state.message_service.like(&user.0, id).await?;
    Ok(Json(ReactionResponse { result }))
}

/// POST /api/v1/messages/{id}/dislike
async fn dislike_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let result = state.message_service.dislike(&user.0, id).await?;
    Ok(Json(ReactionResponse { result }))
}

/// GET /api/v1/messages/private
async fn list_conversations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(
        state.private_message_service.conversations(user.0.id).await?,
    ))
}

/// GET /api/v1/messages/private/{user_id}
async fn get_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(partner_id): Path<i64>,
) -> Result<Json<Vec<PrivateMessage>>, ApiError> {
    Ok(Json(
        state
            .private_message_service
            .conversation(user.0.id, partner_id)
            .await?,
    ))
}

/// POST /api/v1/messages/private/{user_id}
async fn send_private_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(receiver_id): Path<i64>,
    Json(body): Json<ContentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .private_message_service
        .send(&user.0, receiver_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
